use spin_sdk::http::{Request, Response};
use tracing::warn;
use crate::models::models::{NotificationKind, User};
use crate::core::helpers::{store, validate_uuid};
use crate::core::errors::ApiError;
use crate::core::store::DocumentStore;
use crate::auth::validate_token;
use crate::notifications;
use crate::config::*;

/// Drive the (actor, target) pair to the desired follow state. The two
/// membership sets are kept mutual inverses: actor appears in
/// target.followers exactly when target appears in actor.following.
/// Re-applying the current state is a no-op. Only the not-following →
/// following edge notifies the target; the notification is best-effort
/// and never rolls back the membership change.
pub fn set_follow<S: DocumentStore>(
    store: &S,
    actor_id: &str,
    target_id: &str,
    desired: bool,
) -> Result<(), ApiError> {
    if actor_id == target_id {
        return Err(ApiError::InvalidState("Cannot follow yourself".to_string()));
    }

    let target_key = user_key(target_id);
    let actor_key = user_key(actor_id);

    let mut target = store
        .get_doc::<User>(&target_key)?
        .ok_or_else(|| ApiError::NotFound("Target user not found".to_string()))?;
    let mut actor = store
        .get_doc::<User>(&actor_key)?
        .ok_or_else(|| ApiError::NotFound("Acting user not found".to_string()))?;

    let following = target.followers.iter().any(|id| id == actor_id);

    if desired && !following {
        target.followers.push(actor_id.to_string());
        actor.following.push(target_id.to_string());
        store.put_doc(&target_key, &target)?;
        store.put_doc(&actor_key, &actor)?;

        if let Err(err) = notifications::record(
            store,
            target_id,
            actor_id,
            NotificationKind::Follow,
            "started following you",
        ) {
            warn!(user = target_id, "follow notification append failed: {}", err);
        }
    } else if !desired && following {
        target.followers.retain(|id| id != actor_id);
        actor.following.retain(|id| id != target_id);
        store.put_doc(&target_key, &target)?;
        store.put_doc(&actor_key, &actor)?;
        // No notification for unfollow.
    }

    Ok(())
}

pub fn get_followings<S: DocumentStore>(store: &S, user_id: &str) -> anyhow::Result<Vec<String>> {
    let user: Option<User> = store.get_doc(&user_key(user_id))?;
    Ok(user.map(|u| u.following).unwrap_or_default())
}

pub fn get_followers<S: DocumentStore>(store: &S, user_id: &str) -> anyhow::Result<Vec<String>> {
    let user: Option<User> = store.get_doc(&user_key(user_id))?;
    Ok(user.map(|u| u.followers).unwrap_or_default())
}

// === HTTP Handlers ===

fn handle_set_follow(req: Request, desired: bool) -> anyhow::Result<Response> {
    let user_id = match validate_token(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let store = store();
    let body = req.body();
    let value: serde_json::Value = serde_json::from_slice(body)?;
    let target_user_id = value["target_user_id"].as_str().unwrap_or_default();

    if target_user_id.is_empty() || !validate_uuid(target_user_id) {
        return Ok(ApiError::BadRequest("Invalid target user".to_string()).into());
    }

    if let Err(err) = set_follow(&store, &user_id, target_user_id, desired) {
        return Ok(err.into());
    }

    let status = if desired { "followed" } else { "unfollowed" };
    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&serde_json::json!({"status": status}))?)
        .build())
}

pub fn handle_follow(req: Request) -> anyhow::Result<Response> {
    handle_set_follow(req, true)
}

pub fn handle_unfollow(req: Request) -> anyhow::Result<Response> {
    handle_set_follow(req, false)
}

pub fn get_followings_list(path: &str) -> anyhow::Result<Response> {
    let user_id = path.trim_start_matches("/followings/");

    if user_id.is_empty() || !validate_uuid(user_id) {
        return Ok(ApiError::BadRequest("User ID required".to_string()).into());
    }

    let store = store();
    let followings = get_followings(&store, user_id)?;

    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&followings)?)
        .build())
}

pub fn get_followers_list(path: &str) -> anyhow::Result<Response> {
    let user_id = path.trim_start_matches("/followers/");

    if user_id.is_empty() || !validate_uuid(user_id) {
        return Ok(ApiError::BadRequest("User ID required".to_string()).into());
    }

    let store = store();
    let followers = get_followers(&store, user_id)?;

    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&followers)?)
        .build())
}
