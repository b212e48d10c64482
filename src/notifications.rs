use serde::Serialize;
use spin_sdk::http::{Request, Response};
use uuid::Uuid;
use std::collections::HashMap;
use crate::models::models::{Notification, NotificationKind, User};
use crate::core::helpers::{store, now_iso};
use crate::core::errors::ApiError;
use crate::core::store::DocumentStore;
use crate::core::query_params::{parse_query_params, get_page};
use crate::auth::validate_token;
use crate::config::*;

/// Append one immutable record to the recipient's ledger. Callers guard
/// against self-actions already; the ledger refuses them again so a
/// slipped guard can never store a self-notification. The write is a
/// single document save, so a record either lands whole or not at all.
pub fn record<S: DocumentStore>(
    store: &S,
    recipient: &str,
    sender: &str,
    kind: NotificationKind,
    text: &str,
) -> anyhow::Result<()> {
    if recipient == sender {
        return Ok(());
    }

    let key = notifications_key(recipient);
    let mut ledger: Vec<Notification> = store.get_doc(&key)?.unwrap_or_default();
    ledger.push(Notification {
        id: Uuid::new_v4().to_string(),
        recipient: recipient.to_string(),
        sender: sender.to_string(),
        kind,
        text: text.to_string(),
        created_at: now_iso(),
    });
    store.put_doc(&key, &ledger)?;

    Ok(())
}

/// Ledger record with the sender's display name resolved.
#[derive(Serialize)]
pub struct NotificationView {
    pub id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub kind: NotificationKind,
    pub text: String,
    pub created_at: String,
}

/// Notifications for `recipient`, newest first, one page at a time.
pub fn list_for<S: DocumentStore>(
    store: &S,
    recipient: &str,
    page: usize,
) -> anyhow::Result<Vec<NotificationView>> {
    let ledger: Vec<Notification> = store
        .get_doc(&notifications_key(recipient))?
        .unwrap_or_default();

    let start = (page.max(1) - 1) * NOTIFICATIONS_PER_PAGE;
    let mut names: HashMap<String, String> = HashMap::new();
    let mut views = Vec::new();

    // Records are appended in time order, so reverse iteration is
    // newest-first.
    for n in ledger.iter().rev().skip(start).take(NOTIFICATIONS_PER_PAGE) {
        let username = match names.get(&n.sender) {
            Some(name) => name.clone(),
            None => {
                let name = store
                    .get_doc::<User>(&user_key(&n.sender))?
                    .map(|u| u.username)
                    .unwrap_or_else(|| "unknown".to_string());
                names.insert(n.sender.clone(), name.clone());
                name
            }
        };
        views.push(NotificationView {
            id: n.id.clone(),
            sender_id: n.sender.clone(),
            sender_username: username,
            kind: n.kind,
            text: n.text.clone(),
            created_at: n.created_at.clone(),
        });
    }

    Ok(views)
}

/// Count of records newer than the user's last-seen watermark. A user
/// who has never marked their notifications seen counts everything.
pub fn unread_for<S: DocumentStore>(store: &S, recipient: &str) -> anyhow::Result<usize> {
    let ledger: Vec<Notification> = store
        .get_doc(&notifications_key(recipient))?
        .unwrap_or_default();
    let seen: Option<String> = store.get_doc(&notifications_seen_key(recipient))?;

    let count = match seen {
        Some(mark) => ledger
            .iter()
            .filter(|n| n.created_at.as_str() > mark.as_str())
            .count(),
        None => ledger.len(),
    };

    Ok(count)
}

/// Advance the last-seen watermark to now and return it.
pub fn touch_seen<S: DocumentStore>(store: &S, recipient: &str) -> anyhow::Result<String> {
    let mark = now_iso();
    store.put_doc(&notifications_seen_key(recipient), &mark)?;
    Ok(mark)
}

// === HTTP Handlers ===

pub fn list_notifications(req: Request) -> anyhow::Result<Response> {
    let user_id = match validate_token(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let store = store();
    let params = parse_query_params(req.uri());
    let views = list_for(&store, &user_id, get_page(&params))?;

    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&views)?)
        .build())
}

pub fn get_unread_count(req: Request) -> anyhow::Result<Response> {
    let user_id = match validate_token(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let store = store();
    let count = unread_for(&store, &user_id)?;

    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&serde_json::json!({"unread": count}))?)
        .build())
}

pub fn mark_seen(req: Request) -> anyhow::Result<Response> {
    let user_id = match validate_token(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let store = store();
    let mark = touch_seen(&store, &user_id)?;

    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&serde_json::json!({"seen_at": mark}))?)
        .build())
}
