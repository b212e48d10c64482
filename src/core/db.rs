use spin_sdk::http::{Request, Response};
use uuid::Uuid;
use tracing::info;
use crate::models::models::{Post, User};
use crate::core::helpers::{store, hash_password, now_iso};
use crate::core::store::DocumentStore;
use crate::config::*;
use crate::{follow, posts};

fn seed_user<S: DocumentStore>(
    store: &S,
    users: &mut Vec<String>,
    username: &str,
    bio: &str,
) -> anyhow::Result<String> {
    let user_id = Uuid::new_v4().to_string();
    let user = User {
        id: user_id.clone(),
        username: username.to_string(),
        email: format!("{}@example.com", username),
        password: hash_password(username)?,
        bio: Some(bio.to_string()),
        image: None,
        followers: Vec::new(),
        following: Vec::new(),
        created_at: now_iso(),
    };
    store.put_doc(&user_key(&user_id), &user)?;
    users.push(user_id.clone());
    Ok(user_id)
}

fn seed_post<S: DocumentStore>(
    store: &S,
    feed: &mut Vec<String>,
    author_id: &str,
    title: &str,
    content: &str,
) -> anyhow::Result<String> {
    let post_id = Uuid::new_v4().to_string();
    let post = Post {
        id: post_id.clone(),
        user_id: author_id.to_string(),
        title: title.to_string(),
        content: content.to_string(),
        image: None,
        likes: Vec::new(),
        comments: Vec::new(),
        created_at: now_iso(),
        updated_at: None,
    };
    store.put_doc(&post_key(&post_id), &post)?;
    feed.insert(0, post_id.clone());
    Ok(post_id)
}

/// Seed deterministic demo fixtures. Likes, comments, and follows go
/// through the real operations so the ledger and membership sets come
/// out consistent with the content.
pub fn init_test_data<S: DocumentStore>(store: &S) -> anyhow::Result<()> {
    let users: Vec<String> = store.get_doc(USERS_LIST_KEY)?.unwrap_or_default();
    for id in &users {
        if let Some(u) = store.get_doc::<User>(&user_key(id))? {
            if u.username == "maya" {
                return Ok(()); // Already initialized
            }
        }
    }

    let mut users = users;
    let mut feed: Vec<String> = store.get_doc(FEED_KEY)?.unwrap_or_default();

    let maya = seed_user(store, &mut users, "maya", "Writing about small software")?;
    let leo = seed_user(store, &mut users, "leo", "Photos, mostly")?;
    let sam = seed_user(store, &mut users, "sam", "Here for the comments")?;

    let hello = seed_post(
        store,
        &mut feed,
        &maya,
        "Hello",
        "First post on my new blog.",
    )?;
    seed_post(
        store,
        &mut feed,
        &leo,
        "Morning light",
        "Took the camera out before work today.",
    )?;

    store.put_doc(USERS_LIST_KEY, &users)?;
    store.put_doc(FEED_KEY, &feed)?;

    // Cross-user activity so the notification views have something to
    // show out of the box.
    let _ = follow::set_follow(store, &sam, &maya, true);
    let _ = posts::like_post(store, &hello, &leo);
    let _ = posts::add_comment(store, &hello, &leo, "Welcome!");

    info!("seeded demo data");

    Ok(())
}

pub fn reset_db_data<S: DocumentStore>(store: &S) -> anyhow::Result<()> {
    let users: Vec<String> = store.get_doc(USERS_LIST_KEY)?.unwrap_or_default();

    // Delete all users along with their ledgers and watermarks
    for id in &users {
        store.delete_doc(&user_key(id))?;
        store.delete_doc(&notifications_key(id))?;
        store.delete_doc(&notifications_seen_key(id))?;
    }

    // Delete all posts
    let posts: Vec<String> = store.get_doc(FEED_KEY)?.unwrap_or_default();
    for id in posts {
        store.delete_doc(&post_key(&id))?;
    }

    // Delete all tokens
    let tokens: Vec<String> = store.get_doc(TOKENS_LIST_KEY)?.unwrap_or_default();
    for token in tokens {
        store.delete_doc(&token_key(&token))?;
    }

    // Delete metadata
    store.delete_doc(USERS_LIST_KEY)?;
    store.delete_doc(FEED_KEY)?;
    store.delete_doc(TOKENS_LIST_KEY)?;

    info!("store reset");

    Ok(())
}

// === HTTP Handler ===

/// Wipe and re-seed. Local development plumbing for the HTTP tests.
pub fn handle_reset(_req: Request) -> anyhow::Result<Response> {
    let store = store();
    reset_db_data(&store)?;
    init_test_data(&store)?;

    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&serde_json::json!({"status": "reset"}))?)
        .build())
}
