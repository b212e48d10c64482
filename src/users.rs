use spin_sdk::http::{Request, Response};
use uuid::Uuid;
use crate::models::models::{User, TokenData};
use crate::core::helpers::{store, hash_password, verify_password, sanitize_text, validate_uuid, now_iso};
use crate::core::errors::ApiError;
use crate::auth::validate_token;
use crate::config::*;

/// Public profile shape. The password hash never leaves the store;
/// email only appears on the owner's own profile.
fn build_user_json(user: &User) -> serde_json::Value {
    serde_json::json!({
        "id": user.id,
        "username": user.username,
        "bio": user.bio.as_ref().unwrap_or(&String::new()),
        "image": user.image,
        "followers": user.followers,
        "following": user.following,
        "created_at": user.created_at,
    })
}

fn get_user_by_id(user_id: &str, include_email: bool) -> anyhow::Result<Response> {
    let store = store();

    if let Some(user) = store.get_json::<User>(&user_key(user_id))? {
        let mut json = build_user_json(&user);
        if include_email {
            json["email"] = serde_json::Value::String(user.email.clone());
        }
        Ok(Response::builder()
            .status(200)
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(&json)?)
            .build())
    } else {
        Ok(ApiError::NotFound("User not found".to_string()).into())
    }
}

pub fn create_user(req: Request) -> anyhow::Result<Response> {
    let store = store();
    let body = req.body();

    let new_user: serde_json::Value = serde_json::from_slice(body)?;
    let username = new_user["username"].as_str().unwrap_or("");
    let email = new_user["email"].as_str().unwrap_or("");
    let password = new_user["password"].as_str().unwrap_or("");

    if username.is_empty() {
        return Ok(ApiError::BadRequest("Username is required".to_string()).into());
    }
    if username.len() < MIN_USERNAME_LENGTH || username.len() > MAX_USERNAME_LENGTH {
        return Ok(ApiError::BadRequest("Username must be 3-50 characters".to_string()).into());
    }
    if email.is_empty() || !email.contains('@') || email.len() > MAX_EMAIL_LENGTH {
        return Ok(ApiError::BadRequest("Valid email is required".to_string()).into());
    }
    if password.is_empty() {
        return Ok(ApiError::BadRequest("Password is required".to_string()).into());
    }
    if password.len() < MIN_PASSWORD_LENGTH {
        return Ok(ApiError::BadRequest("Password must be at least 3 characters".to_string()).into());
    }

    // Sanitize username at input time
    let sanitized_username = sanitize_text(username);

    // Check duplicate username
    let existing_users: Vec<String> = store.get_json(USERS_LIST_KEY)?.unwrap_or_default();
    for id in &existing_users {
        if let Some(u) = store.get_json::<User>(&user_key(id))? {
            if u.username == sanitized_username {
                return Ok(ApiError::Conflict("Username exists".to_string()).into());
            }
        }
    }
    let id = Uuid::new_v4().to_string();

    let user = User {
        id: id.clone(),
        username: sanitized_username,
        email: email.to_string(),
        password: hash_password(password)?,
        bio: None,
        image: None,
        followers: Vec::new(),
        following: Vec::new(),
        created_at: now_iso(),
    };

    store.set_json(&user_key(&id), &user)?;

    // Add to users_list
    let mut users = existing_users;
    users.push(id.clone());
    store.set_json(USERS_LIST_KEY, &users)?;

    let mut json = build_user_json(&user);
    json["email"] = serde_json::Value::String(user.email.clone());

    Ok(Response::builder()
        .status(201)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&json)?)
        .build())
}

pub fn get_profile(req: Request) -> anyhow::Result<Response> {
    let user_id = match validate_token(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    get_user_by_id(&user_id, true)
}

pub fn get_user_details(path: &str) -> anyhow::Result<Response> {
    let user_id = path.trim_start_matches("/users/");

    if user_id.is_empty() || !validate_uuid(user_id) {
        return Ok(ApiError::BadRequest("User ID required".to_string()).into());
    }

    get_user_by_id(user_id, false)
}

pub fn update_profile(req: Request) -> anyhow::Result<Response> {
    let user_id = match validate_token(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let store = store();
    let key = user_key(&user_id);

    if let Some(mut user) = store.get_json::<User>(&key)? {
        let value: serde_json::Value = serde_json::from_slice(req.body())?;
        let mut password_changed = false;

        // Update bio if provided
        if let Some(bio) = value["bio"].as_str() {
            if bio.len() > MAX_BIO_LENGTH {
                return Ok(ApiError::BadRequest("Bio too long (max 500 chars)".to_string()).into());
            }
            // Sanitize bio at input time
            let sanitized_bio = sanitize_text(bio);
            user.bio = if sanitized_bio.is_empty() { None } else { Some(sanitized_bio) };
        }

        // Profile image URL from the image-hosting collaborator
        if let Some(image) = value["image"].as_str() {
            if image.len() > MAX_IMAGE_URL_LENGTH {
                return Ok(ApiError::BadRequest("Image URL too long".to_string()).into());
            }
            user.image = if image.is_empty() { None } else { Some(image.to_string()) };
        }

        // Update password if provided
        if let Some(new_password) = value["new_password"].as_str() {
            if new_password.is_empty() || new_password.len() < MIN_PASSWORD_LENGTH {
                return Ok(ApiError::BadRequest("Password must be 3+ characters".to_string()).into());
            }

            let old_password = value["old_password"].as_str()
                .ok_or_else(|| ApiError::BadRequest("Current password required".to_string()))?;

            if !verify_password(old_password, &user.password) {
                return Ok(ApiError::Unauthorized.into());
            }

            user.password = hash_password(new_password)?;
            password_changed = true;
        }

        store.set_json(&key, &user)?;

        // If password changed, invalidate all tokens for this user and issue a new one
        let mut response_data = build_user_json(&user);
        if password_changed {
            let all_tokens: Vec<String> = store.get_json(TOKENS_LIST_KEY)?.unwrap_or_default();

            // Filter out tokens for this user and delete them
            let filtered_tokens: Vec<String> = all_tokens
                .into_iter()
                .filter(|token| {
                    let tk = token_key(token);
                    if let Ok(Some(token_data)) = store.get_json::<TokenData>(&tk) {
                        if token_data.user_id == user_id {
                            // Delete token from store
                            let _ = store.delete(&tk);
                            false // Exclude from filtered list
                        } else {
                            true // Keep token from other users
                        }
                    } else {
                        true // Keep if we can't read it
                    }
                })
                .collect();

            // Generate new token
            let new_token = Uuid::new_v4().to_string();
            let token_data = TokenData {
                user_id: user_id.clone(),
                created_at: now_iso(),
            };
            store.set_json(&token_key(&new_token), &token_data)?;

            let mut updated_tokens = filtered_tokens;
            updated_tokens.push(new_token.clone());
            store.set_json(TOKENS_LIST_KEY, &updated_tokens)?;

            // Include new token in response
            response_data["token"] = serde_json::Value::String(new_token);
        }

        Ok(Response::builder()
            .status(200)
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(&response_data)?)
            .build())
    } else {
        Ok(ApiError::NotFound("User not found".to_string()).into())
    }
}
