use serde::Serialize;
use spin_sdk::http::{Request, Response};
use std::collections::HashMap;
use crate::models::models::{NotificationKind, Post, User};
use crate::core::helpers::store;
use crate::core::errors::ApiError;
use crate::core::store::DocumentStore;
use crate::auth::validate_token;
use crate::config::*;

/// Notification synthesized from content at read time instead of read
/// from the ledger. The id is a deterministic composite of the event
/// kind and the documents involved, so a client can remember which
/// events it has already shown.
#[derive(Serialize)]
pub struct ActivityEvent {
    pub id: String,
    pub kind: NotificationKind,
    pub actor_id: String,
    pub actor_username: String,
    pub text: String,
    pub time: String,
}

/// Legacy fallback: derive the activity feed for `user_id` without the
/// ledger. Scans every post, keeps those authored by the user, emits
/// one event per like and per comment, plus one per follower. Likes
/// carry no timestamp of their own, so they fall back to the post's
/// update time; follow edges fall back to the follower's registration
/// time. Self-actions are skipped, matching the ledger's invariant.
pub fn derive_activity<S: DocumentStore>(
    store: &S,
    user_id: &str,
) -> anyhow::Result<Vec<ActivityEvent>> {
    let mut names: HashMap<String, String> = HashMap::new();
    let mut resolve = |store: &S, id: &str| -> anyhow::Result<String> {
        if let Some(name) = names.get(id) {
            return Ok(name.clone());
        }
        let name = store
            .get_doc::<User>(&user_key(id))?
            .map(|u| u.username)
            .unwrap_or_else(|| "unknown".to_string());
        names.insert(id.to_string(), name.clone());
        Ok(name)
    };

    let feed: Vec<String> = store.get_doc(FEED_KEY)?.unwrap_or_default();
    let mut events = Vec::new();

    for post_id in feed.iter() {
        let post = match store.get_doc::<Post>(&post_key(post_id))? {
            Some(p) if p.user_id == user_id => p,
            _ => continue,
        };

        let like_time = post.updated_at.clone().unwrap_or_else(|| post.created_at.clone());
        for liker in post.likes.iter().filter(|l| l.as_str() != user_id) {
            let username = resolve(store, liker)?;
            events.push(ActivityEvent {
                id: format!("like:{}:{}", post.id, liker),
                kind: NotificationKind::Like,
                actor_id: liker.clone(),
                actor_username: username.clone(),
                text: format!("{} liked your post \"{}\"", username, post.title),
                time: like_time.clone(),
            });
        }

        for comment in post.comments.iter().filter(|c| c.user_id != user_id) {
            let username = resolve(store, &comment.user_id)?;
            events.push(ActivityEvent {
                id: format!("comment:{}:{}", post.id, comment.id),
                kind: NotificationKind::Comment,
                actor_id: comment.user_id.clone(),
                actor_username: username.clone(),
                text: format!("{} commented on your post \"{}\"", username, post.title),
                time: comment.created_at.clone(),
            });
        }
    }

    if let Some(user) = store.get_doc::<User>(&user_key(user_id))? {
        for follower in user.followers.iter().filter(|f| f.as_str() != user_id) {
            let username = resolve(store, follower)?;
            let time = store
                .get_doc::<User>(&user_key(follower))?
                .map(|u| u.created_at)
                .unwrap_or_default();
            events.push(ActivityEvent {
                id: format!("follow:{}:{}", user_id, follower),
                kind: NotificationKind::Follow,
                actor_id: follower.clone(),
                actor_username: username.clone(),
                text: format!("{} started following you", username),
                time,
            });
        }
    }

    events.sort_by(|a, b| b.time.cmp(&a.time));

    Ok(events)
}

// === HTTP Handler ===

pub fn list_activity(req: Request) -> anyhow::Result<Response> {
    let user_id = match validate_token(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let store = store();
    let events = derive_activity(&store, &user_id)?;

    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&events)?)
        .build())
}
