use serde::{Serialize, Deserialize};

#[derive(Serialize, Deserialize, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub bio: Option<String>,
    /// Profile image URL from the image-hosting collaborator.
    pub image: Option<String>,
    #[serde(default)]
    pub followers: Vec<String>,
    #[serde(default)]
    pub following: Vec<String>,
    pub created_at: String,
}

/// Stable URL plus hosting-side filename, produced by the external
/// image host. The upload itself happens outside this crate.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PostImage {
    pub url: String,
    pub filename: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Comment {
    pub id: String,
    pub user_id: String,
    pub text: String,
    pub created_at: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub image: Option<PostImage>,
    /// User ids in like order; membership is checked before every insert.
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
    Comment,
    Follow,
}

/// One cross-user event. Never mutated after creation; recipient and
/// sender are always distinct.
#[derive(Serialize, Deserialize, Clone)]
pub struct Notification {
    pub id: String,
    pub recipient: String,
    pub sender: String,
    pub kind: NotificationKind,
    pub text: String,
    pub created_at: String,
}

#[derive(Serialize, Deserialize)]
pub struct TokenData {
    pub user_id: String,
    pub created_at: String,
}
