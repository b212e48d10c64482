pub const USERS_LIST_KEY: &str = "users_list";
pub const TOKENS_LIST_KEY: &str = "tokens_list";
pub const FEED_KEY: &str = "feed";

pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MIN_PASSWORD_LENGTH: usize = 3;
pub const MAX_EMAIL_LENGTH: usize = 254;
pub const MAX_BIO_LENGTH: usize = 500;
pub const MAX_IMAGE_URL_LENGTH: usize = 2048;
pub const MAX_TITLE_LENGTH: usize = 200;
pub const MAX_POST_LENGTH: usize = 5000;
pub const MAX_COMMENT_LENGTH: usize = 1000;

pub const POSTS_PER_PAGE: usize = 10;
pub const NOTIFICATIONS_PER_PAGE: usize = 20;

pub fn user_key(id: &str) -> String {
    format!("user:{}", id)
}

pub fn post_key(id: &str) -> String {
    format!("post:{}", id)
}

pub fn token_key(token: &str) -> String {
    format!("token:{}", token)
}

/// Per-recipient append-only notification ledger.
pub fn notifications_key(recipient_id: &str) -> String {
    format!("notifications:{}", recipient_id)
}

/// Last-seen watermark for a user's notifications.
pub fn notifications_seen_key(recipient_id: &str) -> String {
    format!("notifications_seen:{}", recipient_id)
}

pub fn token_expiration_hours() -> i64 {
    std::env::var("MICROBLOG_TOKEN_EXPIRATION_HOURS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(24)
}
