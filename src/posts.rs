use serde::Serialize;
use spin_sdk::http::{Request, Response};
use uuid::Uuid;
use regex::Regex;
use html_escape::encode_double_quoted_attribute;
use ammonia::Builder;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::warn;
use crate::models::models::{Comment, NotificationKind, Post, PostImage, User};
use crate::core::helpers::{store, now_iso, sanitize_text, validate_uuid};
use crate::core::errors::ApiError;
use crate::core::store::DocumentStore;
use crate::core::query_params::{parse_query_params, get_bool_flag, get_page, get_string};
use crate::auth::validate_token;
use crate::notifications;
use crate::config::*;

/// Post with its author's display name resolved for list responses.
#[derive(Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub author_username: String,
}

fn resolve_author<S: DocumentStore>(
    store: &S,
    names: &mut HashMap<String, String>,
    user_id: &str,
) -> anyhow::Result<String> {
    if let Some(name) = names.get(user_id) {
        return Ok(name.clone());
    }
    let name = store
        .get_doc::<User>(&user_key(user_id))?
        .map(|u| u.username)
        .unwrap_or_else(|| "unknown".to_string());
    names.insert(user_id.to_string(), name.clone());
    Ok(name)
}

fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"https?://[^\s]+").expect("Regex should compile")
    })
}

fn filter_post_content(content: &str) -> String {
    // Sanitize HTML to remove dangerous scripts and event handlers
    let clean = Builder::default()
        .link_rel(Some("noopener noreferrer"))
        .clean(content)
        .to_string();

    // Convert HTTP/HTTPS URLs into clickable links with proper escaping
    url_regex().replace_all(&clean, |caps: &regex::Captures| {
        let url = &caps[0];
        let escaped_url = encode_double_quoted_attribute(url);
        format!(r#"<a href="{}" target="_blank">{}</a>"#, escaped_url, url)
    }).to_string()
}

/// First path segment after `/posts/`.
fn post_id_from(path: &str) -> &str {
    path.trim_start_matches("/posts/")
        .split('/')
        .next()
        .unwrap_or("")
}

// === Core operations ===

/// Add the actor to the post's like set if absent. A repeat like is a
/// no-op: membership is checked against the freshly loaded document
/// before the insert, and nothing is written. A newly landed like by
/// someone other than the author appends one ledger record,
/// best-effort.
pub fn like_post<S: DocumentStore>(
    store: &S,
    post_id: &str,
    actor_id: &str,
) -> Result<Post, ApiError> {
    let key = post_key(post_id);
    let mut post = store
        .get_doc::<Post>(&key)?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;

    if !post.likes.iter().any(|id| id == actor_id) {
        post.likes.push(actor_id.to_string());
        store.put_doc(&key, &post)?;

        if post.user_id != actor_id {
            if let Err(err) = notifications::record(
                store,
                &post.user_id,
                actor_id,
                NotificationKind::Like,
                "liked your post",
            ) {
                warn!(post = post_id, "like notification append failed: {}", err);
            }
        }
    }

    Ok(post)
}

/// Append a comment. Empty text is an illegal transition, not a parse
/// error. Comments by anyone but the author append one ledger record,
/// best-effort.
pub fn add_comment<S: DocumentStore>(
    store: &S,
    post_id: &str,
    actor_id: &str,
    text: &str,
) -> Result<Post, ApiError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ApiError::InvalidState("Comment text must not be empty".to_string()));
    }
    if text.len() > MAX_COMMENT_LENGTH {
        return Err(ApiError::BadRequest("Comment too long".to_string()));
    }

    let key = post_key(post_id);
    let mut post = store
        .get_doc::<Post>(&key)?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;

    post.comments.push(Comment {
        id: Uuid::new_v4().to_string(),
        user_id: actor_id.to_string(),
        text: sanitize_text(text),
        created_at: now_iso(),
    });
    store.put_doc(&key, &post)?;

    if post.user_id != actor_id {
        if let Err(err) = notifications::record(
            store,
            &post.user_id,
            actor_id,
            NotificationKind::Comment,
            "commented on your post",
        ) {
            warn!(post = post_id, "comment notification append failed: {}", err);
        }
    }

    Ok(post)
}

/// Remove a comment. Allowed for the comment's author and for the
/// post's author; everyone else is refused.
pub fn remove_comment<S: DocumentStore>(
    store: &S,
    post_id: &str,
    comment_id: &str,
    actor_id: &str,
) -> Result<Post, ApiError> {
    let key = post_key(post_id);
    let mut post = store
        .get_doc::<Post>(&key)?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;

    let idx = post
        .comments
        .iter()
        .position(|c| c.id == comment_id)
        .ok_or_else(|| ApiError::NotFound("Comment not found".to_string()))?;

    if post.comments[idx].user_id != actor_id && post.user_id != actor_id {
        return Err(ApiError::Forbidden);
    }

    post.comments.remove(idx);
    store.put_doc(&key, &post)?;

    Ok(post)
}

// === HTTP Handlers ===

pub fn create_post(req: Request) -> anyhow::Result<Response> {
    let user_id = match validate_token(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let store = store();
    let body = req.body();

    let value: serde_json::Value = serde_json::from_slice(body)?;
    let title = value["title"].as_str().unwrap_or_default().trim();
    let content = value["content"].as_str().unwrap_or_default();

    if title.is_empty() || title.len() > MAX_TITLE_LENGTH {
        return Ok(ApiError::BadRequest("Invalid title".to_string()).into());
    }
    if content.is_empty() || content.len() > MAX_POST_LENGTH {
        return Ok(ApiError::BadRequest("Invalid content".to_string()).into());
    }

    // Image reference from the upload collaborator, if any.
    let image = match value.get("image") {
        Some(serde_json::Value::Object(img)) => {
            let url = img.get("url").and_then(|v| v.as_str()).unwrap_or_default();
            let filename = img.get("filename").and_then(|v| v.as_str()).unwrap_or_default();
            if url.is_empty() || url.len() > MAX_IMAGE_URL_LENGTH {
                return Ok(ApiError::BadRequest("Invalid image reference".to_string()).into());
            }
            Some(PostImage {
                url: url.to_string(),
                filename: filename.to_string(),
            })
        }
        Some(serde_json::Value::Null) | None => None,
        Some(_) => {
            return Ok(ApiError::BadRequest("Invalid image reference".to_string()).into());
        }
    };

    let id = Uuid::new_v4().to_string();
    let post = Post {
        id: id.clone(),
        user_id: user_id.to_string(),
        title: sanitize_text(title),
        content: filter_post_content(content),
        image,
        likes: Vec::new(),
        comments: Vec::new(),
        created_at: now_iso(),
        updated_at: None,
    };

    // Save post object
    store.set_json(&post_key(&id), &post)?;

    // Append to global feed (store IDs in a JSON list)
    let mut feed: Vec<String> = store.get_json(FEED_KEY)?.unwrap_or_default();
    feed.insert(0, id.clone()); // prepend newest
    store.set_json(FEED_KEY, &feed)?;

    Ok(Response::builder()
        .status(201)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&post)?)
        .build())
}

pub fn edit_post(req: Request) -> anyhow::Result<Response> {
    let user_id = match validate_token(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let post_id = post_id_from(req.path());
    if post_id.is_empty() || !validate_uuid(post_id) {
        return Ok(ApiError::BadRequest("Post ID required".to_string()).into());
    }

    let store = store();
    let key = post_key(post_id);

    // Check if post exists and belongs to user
    if let Some(mut post) = store.get_json::<Post>(&key)? {
        if post.user_id != user_id {
            return Ok(ApiError::Forbidden.into());
        }

        let value: serde_json::Value = serde_json::from_slice(req.body())?;
        let mut changed = false;

        if let Some(title) = value["title"].as_str() {
            let title = title.trim();
            if title.is_empty() || title.len() > MAX_TITLE_LENGTH {
                return Ok(ApiError::BadRequest("Invalid title".to_string()).into());
            }
            let sanitized = sanitize_text(title);
            if post.title != sanitized {
                post.title = sanitized;
                changed = true;
            }
        }

        if let Some(content) = value["content"].as_str() {
            if content.is_empty() || content.len() > MAX_POST_LENGTH {
                return Ok(ApiError::BadRequest("Invalid content".to_string()).into());
            }
            let filtered = filter_post_content(content);
            if post.content != filtered {
                post.content = filtered;
                changed = true;
            }
        }

        // Skip the save if nothing actually changed
        if changed {
            post.updated_at = Some(now_iso());
            store.set_json(&key, &post)?;
        }

        Ok(Response::builder()
            .status(200)
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(&post)?)
            .build())
    } else {
        Ok(ApiError::NotFound("Post not found".to_string()).into())
    }
}

pub fn delete_post(req: Request) -> anyhow::Result<Response> {
    let user_id = match validate_token(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let post_id = post_id_from(req.path());
    if post_id.is_empty() || !validate_uuid(post_id) {
        return Ok(ApiError::BadRequest("Post ID required".to_string()).into());
    }

    let store = store();
    let key = post_key(post_id);

    // Check if post exists and belongs to user. Embedded comments go
    // down with the document.
    if let Some(p) = store.get_json::<Post>(&key)? {
        if p.user_id != user_id {
            return Ok(ApiError::Forbidden.into());
        }

        store.delete(&key)?;

        // Remove from feed
        let mut feed: Vec<String> = store.get_json(FEED_KEY)?.unwrap_or_default();
        feed.retain(|id| id != post_id);
        store.set_json(FEED_KEY, &feed)?;

        Ok(Response::builder().status(204).build())
    } else {
        Ok(ApiError::NotFound("Post not found".to_string()).into())
    }
}

pub fn handle_like(req: Request) -> anyhow::Result<Response> {
    let user_id = match validate_token(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let post_id = post_id_from(req.path());
    if post_id.is_empty() || !validate_uuid(post_id) {
        return Ok(ApiError::BadRequest("Post ID required".to_string()).into());
    }

    let store = store();
    match like_post(&store, post_id, &user_id) {
        Ok(post) => Ok(Response::builder()
            .status(200)
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(&post)?)
            .build()),
        Err(err) => Ok(err.into()),
    }
}

pub fn handle_comment(req: Request) -> anyhow::Result<Response> {
    let user_id = match validate_token(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let post_id = post_id_from(req.path()).to_string();
    if post_id.is_empty() || !validate_uuid(&post_id) {
        return Ok(ApiError::BadRequest("Post ID required".to_string()).into());
    }

    let value: serde_json::Value = serde_json::from_slice(req.body())?;
    let text = value["text"].as_str().unwrap_or_default();

    let store = store();
    match add_comment(&store, &post_id, &user_id, text) {
        Ok(post) => Ok(Response::builder()
            .status(201)
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(&post)?)
            .build()),
        Err(err) => Ok(err.into()),
    }
}

pub fn handle_delete_comment(req: Request) -> anyhow::Result<Response> {
    let user_id = match validate_token(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let path = req.path();
    let post_id = post_id_from(path);
    let comment_id = path.split('/').last().unwrap_or("");

    if post_id.is_empty() || !validate_uuid(post_id) || comment_id.is_empty() {
        return Ok(ApiError::BadRequest("Post and comment IDs required".to_string()).into());
    }

    let store = store();
    match remove_comment(&store, post_id, comment_id, &user_id) {
        Ok(post) => Ok(Response::builder()
            .status(200)
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(&post)?)
            .build()),
        Err(err) => Ok(err.into()),
    }
}

pub fn list_posts(req: Request) -> anyhow::Result<Response> {
    let store = store();
    let params = parse_query_params(req.uri());
    let filter_username = get_string(&params, "user");
    let show_all = get_bool_flag(&params, "all");
    let page = get_page(&params);

    // Filtered and all-posts queries are public; the bare listing is
    // the caller's own posts and needs a token.
    let user_id = if filter_username.is_none() && !show_all {
        match validate_token(&req) {
            Some(uid) => uid,
            None => return Ok(ApiError::Unauthorized.into()),
        }
    } else {
        String::new()
    };

    let feed: Vec<String> = store.get_json(FEED_KEY)?.unwrap_or_default();
    let start_idx = (page - 1) * POSTS_PER_PAGE;

    let target_user_id = if let Some(username) = filter_username {
        let users: Vec<String> = store.get_json(USERS_LIST_KEY)?.unwrap_or_default();
        let mut found = None;
        for id in users {
            if let Some(u) = store.get_json::<User>(&user_key(&id))? {
                if u.username == username {
                    found = Some(u.id);
                    break;
                }
            }
        }
        match found {
            Some(id) => Some(id),
            // Unknown username filters to nothing.
            None => Some(String::new()),
        }
    } else if show_all {
        None
    } else {
        Some(user_id)
    };

    let mut matched = Vec::new();
    for id in feed.iter() {
        if let Some(p) = store.get_json::<Post>(&post_key(id))? {
            match &target_user_id {
                Some(uid) if &p.user_id != uid => continue,
                _ => matched.push(p),
            }
        }
    }

    let mut names = HashMap::new();
    let mut views = Vec::new();
    for post in matched.into_iter().skip(start_idx).take(POSTS_PER_PAGE) {
        let author_username = resolve_author(&store, &mut names, &post.user_id)?;
        views.push(PostView { post, author_username });
    }

    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&views)?)
        .build())
}

pub fn get_feed(req: Request) -> anyhow::Result<Response> {
    let user_id = match validate_token(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let store = store();

    let followings: Vec<String> = store
        .get_json::<User>(&user_key(&user_id))?
        .map(|u| u.following)
        .unwrap_or_default();

    let feed: Vec<String> = store.get_json(FEED_KEY)?.unwrap_or_default();

    let mut posts: Vec<Post> = Vec::new();
    for post_id in feed.iter() {
        if let Some(p) = store.get_json::<Post>(&post_key(post_id))? {
            if followings.contains(&p.user_id) {
                posts.push(p);
            }
        }
    }

    // Sort by created_at in descending order (newest first)
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut names = HashMap::new();
    let mut views = Vec::new();
    for post in posts {
        let author_username = resolve_author(&store, &mut names, &post.user_id)?;
        views.push(PostView { post, author_username });
    }

    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&views)?)
        .build())
}
