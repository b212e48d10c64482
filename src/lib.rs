use spin_sdk::http::{Request, Response};
#[cfg(target_arch = "wasm32")]
use spin_sdk::{http::IntoResponse, http_component};

pub mod config;
pub mod models;
pub mod core;
pub mod auth;
pub mod users;
pub mod posts;
pub mod follow;
pub mod notifications;
pub mod activity;

/// Shared route table; the Spin component and the native adapter both
/// dispatch through here.
pub fn route(req: Request) -> anyhow::Result<Response> {
    let method = req.method().to_string();
    let path = req.path().to_string();

    match (method.as_str(), path.as_str()) {
        ("POST", "/users") => users::create_user(req),
        ("POST", "/login") => auth::login_user(req),
        ("POST", "/logout") => auth::logout_user(req),
        ("GET", "/profile") => users::get_profile(req),
        ("PUT", "/profile") => users::update_profile(req),
        ("POST", "/posts") => posts::create_post(req),
        ("GET", "/posts") => posts::list_posts(req),
        ("GET", "/feed") => posts::get_feed(req),
        ("POST", "/follow") => follow::handle_follow(req),
        ("POST", "/unfollow") => follow::handle_unfollow(req),
        ("GET", "/notifications") => notifications::list_notifications(req),
        ("GET", "/notifications/unread") => notifications::get_unread_count(req),
        ("POST", "/notifications/seen") => notifications::mark_seen(req),
        ("GET", "/activity") => activity::list_activity(req),
        ("POST", "/admin/reset") => core::db::handle_reset(req),
        ("PUT", p) if p.starts_with("/posts/") && p.ends_with("/like") => posts::handle_like(req),
        ("POST", p) if p.starts_with("/posts/") && p.ends_with("/comment") => {
            posts::handle_comment(req)
        }
        ("DELETE", p) if p.starts_with("/posts/") && p.contains("/comments/") => {
            posts::handle_delete_comment(req)
        }
        ("PUT", p) if p.starts_with("/posts/") => posts::edit_post(req),
        ("DELETE", p) if p.starts_with("/posts/") => posts::delete_post(req),
        ("GET", p) if p.starts_with("/followings/") => follow::get_followings_list(p),
        ("GET", p) if p.starts_with("/followers/") => follow::get_followers_list(p),
        ("GET", p) if p.starts_with("/users/") && p.len() > 7 => users::get_user_details(p),
        _ => Ok(Response::builder().status(404).body("Not found").build()),
    }
}

// === Component entrypoint ===
#[cfg(target_arch = "wasm32")]
#[http_component]
fn handle(req: Request) -> anyhow::Result<impl IntoResponse> {
    // Seed demo data on first request
    let store = core::helpers::store();
    if let Err(err) = core::db::init_test_data(&store) {
        tracing::warn!("demo data init failed: {}", err);
    }

    route(req)
}
