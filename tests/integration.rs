use serde_json::json;
use std::sync::Mutex;

const BASE_URL: &str = "http://127.0.0.1:3000";
static TEST_LOCK: Mutex<()> = Mutex::new(());

fn lock_test() -> std::sync::MutexGuard<'static, ()> {
    TEST_LOCK.lock().unwrap()
}

async fn register_and_login(client: &reqwest::Client, prefix: &str) -> (String, String, String) {
    let username = format!("{}_{}", prefix, uuid::Uuid::new_v4());
    let create_body = json!({
        "username": username,
        "email": format!("{}@example.com", username),
        "password": "test"
    });

    let user_resp = client
        .post(&format!("{}/users", BASE_URL))
        .json(&create_body)
        .send()
        .await
        .expect("Failed to create user");

    assert_eq!(user_resp.status(), 201);
    let user = user_resp.json::<serde_json::Value>().await.unwrap();
    assert!(user.get("id").is_some(), "User ID missing in create response: {:?}", user);
    assert!(user.get("password").is_none(), "Password hash must not be exposed: {:?}", user);
    let user_id = user["id"].as_str().unwrap().to_string();

    let login_body = json!({
        "username": &username,
        "password": "test"
    });

    let login_resp = client
        .post(&format!("{}/login", BASE_URL))
        .json(&login_body)
        .send()
        .await
        .expect("Failed to login");

    assert_eq!(login_resp.status(), 200);
    let token_data = login_resp.json::<serde_json::Value>().await.unwrap();
    assert!(token_data.get("token").is_some(), "Token field missing in response: {:?}", token_data);
    let token = token_data["token"].as_str().unwrap().to_string();

    (user_id, username, token)
}

async fn create_post(
    client: &reqwest::Client,
    token: &str,
    title: &str,
    content: &str,
) -> serde_json::Value {
    let resp = client
        .post(&format!("{}/posts", BASE_URL))
        .header("Authorization", format!("Bearer {}", token))
        .json(&json!({"title": title, "content": content}))
        .send()
        .await
        .expect("Failed to create post");

    assert_eq!(resp.status(), 201);
    resp.json::<serde_json::Value>().await.unwrap()
}

#[tokio::test]
async fn test_full_user_flow() {
    let _lock = lock_test();
    let client = reqwest::Client::new();

    let (user_id, _username, token) = register_and_login(&client, "flow_test").await;

    let post = create_post(&client, &token, "Hello", "Test post from integration test!").await;
    assert_eq!(post["title"], "Hello");
    assert_eq!(post["content"], "Test post from integration test!");
    assert_eq!(post["user_id"], user_id);
    let post_id = post["id"].as_str().unwrap().to_string();

    // Edit post
    let edit_body = json!({
        "content": "Updated content from integration test!"
    });

    let edit_resp = client
        .put(&format!("{}/posts/{}", BASE_URL, post_id))
        .header("Authorization", format!("Bearer {}", token))
        .json(&edit_body)
        .send()
        .await
        .expect("Failed to edit post");

    assert_eq!(edit_resp.status(), 200);
    let edited_post = edit_resp.json::<serde_json::Value>().await.unwrap();
    assert_eq!(edited_post["content"], "Updated content from integration test!");
    assert!(edited_post["updated_at"].is_string(), "updated_at should be set after edit");

    // Delete post
    let delete_resp = client
        .delete(&format!("{}/posts/{}", BASE_URL, post_id))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Failed to delete post");

    assert_eq!(delete_resp.status(), 204);
}

#[tokio::test]
async fn test_post_content_validation() {
    let _lock = lock_test();
    let client = reqwest::Client::new();

    let (_user_id, _username, token) = register_and_login(&client, "validation_test").await;

    // Missing title
    let no_title = json!({"content": "body"});
    let response = client
        .post(&format!("{}/posts", BASE_URL))
        .header("Authorization", format!("Bearer {}", token))
        .json(&no_title)
        .send()
        .await
        .expect("Failed to make request");
    assert_eq!(response.status(), 400);

    // Empty content
    let empty_body = json!({"title": "t", "content": ""});
    let response = client
        .post(&format!("{}/posts", BASE_URL))
        .header("Authorization", format!("Bearer {}", token))
        .json(&empty_body)
        .send()
        .await
        .expect("Failed to make request");
    assert_eq!(response.status(), 400);

    // Content > 5000 chars
    let long_content = "a".repeat(5001);
    let long_body = json!({"title": "t", "content": long_content});
    let response = client
        .post(&format!("{}/posts", BASE_URL))
        .header("Authorization", format!("Bearer {}", token))
        .json(&long_body)
        .send()
        .await
        .expect("Failed to make request");
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_login_invalid_credentials() {
    let _lock = lock_test();
    let client = reqwest::Client::new();

    let login_body = json!({
        "username": "nonexistent_user",
        "password": "wrongpass"
    });

    let response = client
        .post(&format!("{}/login", BASE_URL))
        .json(&login_body)
        .send()
        .await
        .expect("Failed to make request");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_create_post_requires_auth() {
    let _lock = lock_test();
    let client = reqwest::Client::new();

    let body = json!({
        "title": "t",
        "content": "Test post without auth"
    });

    let response = client
        .post(&format!("{}/posts", BASE_URL))
        .json(&body)
        .send()
        .await
        .expect("Failed to make request");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_like_and_comment_notify_the_author() {
    let _lock = lock_test();
    let client = reqwest::Client::new();

    let (author_id, _author_name, author_token) = register_and_login(&client, "notif_author").await;
    let (fan_id, fan_name, fan_token) = register_and_login(&client, "notif_fan").await;

    let post = create_post(&client, &author_token, "Hello", "World").await;
    let post_id = post["id"].as_str().unwrap().to_string();

    // Fan likes the post twice; the like set must stay at one.
    for _ in 0..2 {
        let like_resp = client
            .put(&format!("{}/posts/{}/like", BASE_URL, post_id))
            .header("Authorization", format!("Bearer {}", fan_token))
            .send()
            .await
            .expect("Failed to like post");
        assert_eq!(like_resp.status(), 200);
    }

    let liked = client
        .put(&format!("{}/posts/{}/like", BASE_URL, post_id))
        .header("Authorization", format!("Bearer {}", fan_token))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let likes = liked["likes"].as_array().unwrap();
    assert_eq!(likes.len(), 1);
    assert_eq!(likes[0], fan_id.as_str());

    // Fan comments.
    let comment_resp = client
        .post(&format!("{}/posts/{}/comment", BASE_URL, post_id))
        .header("Authorization", format!("Bearer {}", fan_token))
        .json(&json!({"text": "great post"}))
        .send()
        .await
        .expect("Failed to comment");
    assert_eq!(comment_resp.status(), 201);

    // Author comments on their own post: no notification for that.
    let self_comment = client
        .post(&format!("{}/posts/{}/comment", BASE_URL, post_id))
        .header("Authorization", format!("Bearer {}", author_token))
        .json(&json!({"text": "thanks everyone"}))
        .send()
        .await
        .expect("Failed to self-comment");
    assert_eq!(self_comment.status(), 201);

    // Author sees exactly one like and one comment record, newest first,
    // with the fan's name resolved.
    let notif_resp = client
        .get(&format!("{}/notifications", BASE_URL))
        .header("Authorization", format!("Bearer {}", author_token))
        .send()
        .await
        .expect("Failed to fetch notifications");
    assert_eq!(notif_resp.status(), 200);
    let notifications = notif_resp.json::<Vec<serde_json::Value>>().await.unwrap();

    let mine: Vec<&serde_json::Value> = notifications
        .iter()
        .filter(|n| n["sender_id"] == fan_id.as_str())
        .collect();
    assert_eq!(mine.len(), 2);
    assert_eq!(mine[0]["kind"], "comment");
    assert_eq!(mine[1]["kind"], "like");
    assert_eq!(mine[0]["sender_username"], fan_name);
    for pair in mine.windows(2) {
        assert!(pair[0]["created_at"].as_str().unwrap() >= pair[1]["created_at"].as_str().unwrap());
    }

    // Nothing in this flow notified the fan.
    let empty = client
        .get(&format!("{}/notifications", BASE_URL))
        .header("Authorization", format!("Bearer {}", fan_token))
        .send()
        .await
        .unwrap()
        .json::<Vec<serde_json::Value>>()
        .await
        .unwrap();
    assert!(empty.iter().all(|n| n["sender_id"] != author_id.as_str()));
}

#[tokio::test]
async fn test_unread_watermark() {
    let _lock = lock_test();
    let client = reqwest::Client::new();

    let (_author_id, _author_name, author_token) = register_and_login(&client, "unread_author").await;
    let (_fan_id, _fan_name, fan_token) = register_and_login(&client, "unread_fan").await;

    let post = create_post(&client, &author_token, "Hello", "World").await;
    let post_id = post["id"].as_str().unwrap().to_string();

    client
        .put(&format!("{}/posts/{}/like", BASE_URL, post_id))
        .header("Authorization", format!("Bearer {}", fan_token))
        .send()
        .await
        .expect("Failed to like post");

    let unread = client
        .get(&format!("{}/notifications/unread", BASE_URL))
        .header("Authorization", format!("Bearer {}", author_token))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(unread["unread"], 1);

    let seen_resp = client
        .post(&format!("{}/notifications/seen", BASE_URL))
        .header("Authorization", format!("Bearer {}", author_token))
        .send()
        .await
        .expect("Failed to mark seen");
    assert_eq!(seen_resp.status(), 200);

    let unread = client
        .get(&format!("{}/notifications/unread", BASE_URL))
        .header("Authorization", format!("Bearer {}", author_token))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(unread["unread"], 0);
}

#[tokio::test]
async fn test_follow_unfollow_flow() {
    let _lock = lock_test();
    let client = reqwest::Client::new();

    let (target_id, _target_name, target_token) = register_and_login(&client, "follow_target").await;
    let (fan_id, _fan_name, fan_token) = register_and_login(&client, "follow_fan").await;

    // Self-follow is rejected.
    let self_follow = client
        .post(&format!("{}/follow", BASE_URL))
        .header("Authorization", format!("Bearer {}", fan_token))
        .json(&json!({"target_user_id": fan_id}))
        .send()
        .await
        .expect("Failed to make request");
    assert_eq!(self_follow.status(), 422);

    // Follow, twice; second one is a no-op.
    for _ in 0..2 {
        let follow_resp = client
            .post(&format!("{}/follow", BASE_URL))
            .header("Authorization", format!("Bearer {}", fan_token))
            .json(&json!({"target_user_id": target_id}))
            .send()
            .await
            .expect("Failed to follow");
        assert_eq!(follow_resp.status(), 200);
    }

    let followers = client
        .get(&format!("{}/followers/{}", BASE_URL, target_id))
        .send()
        .await
        .unwrap()
        .json::<Vec<String>>()
        .await
        .unwrap();
    assert_eq!(followers, vec![fan_id.clone()]);

    let followings = client
        .get(&format!("{}/followings/{}", BASE_URL, fan_id))
        .send()
        .await
        .unwrap()
        .json::<Vec<String>>()
        .await
        .unwrap();
    assert_eq!(followings, vec![target_id.clone()]);

    // Exactly one follow notification despite the double follow.
    let notifications = client
        .get(&format!("{}/notifications", BASE_URL))
        .header("Authorization", format!("Bearer {}", target_token))
        .send()
        .await
        .unwrap()
        .json::<Vec<serde_json::Value>>()
        .await
        .unwrap();
    let follows: Vec<&serde_json::Value> = notifications
        .iter()
        .filter(|n| n["kind"] == "follow" && n["sender_id"] == fan_id.as_str())
        .collect();
    assert_eq!(follows.len(), 1);

    // Unfollow clears both sides and adds no notification.
    let unfollow_resp = client
        .post(&format!("{}/unfollow", BASE_URL))
        .header("Authorization", format!("Bearer {}", fan_token))
        .json(&json!({"target_user_id": target_id}))
        .send()
        .await
        .expect("Failed to unfollow");
    assert_eq!(unfollow_resp.status(), 200);

    let followers = client
        .get(&format!("{}/followers/{}", BASE_URL, target_id))
        .send()
        .await
        .unwrap()
        .json::<Vec<String>>()
        .await
        .unwrap();
    assert!(followers.is_empty());

    let notifications = client
        .get(&format!("{}/notifications", BASE_URL))
        .header("Authorization", format!("Bearer {}", target_token))
        .send()
        .await
        .unwrap()
        .json::<Vec<serde_json::Value>>()
        .await
        .unwrap();
    let follows: Vec<&serde_json::Value> = notifications
        .iter()
        .filter(|n| n["kind"] == "follow" && n["sender_id"] == fan_id.as_str())
        .collect();
    assert_eq!(follows.len(), 1);
}

#[tokio::test]
async fn test_activity_feed_derivation() {
    let _lock = lock_test();
    let client = reqwest::Client::new();

    let (_author_id, _author_name, author_token) = register_and_login(&client, "activity_author").await;
    let (fan_id, fan_name, fan_token) = register_and_login(&client, "activity_fan").await;

    let post = create_post(&client, &author_token, "Hello", "World").await;
    let post_id = post["id"].as_str().unwrap().to_string();

    client
        .put(&format!("{}/posts/{}/like", BASE_URL, post_id))
        .header("Authorization", format!("Bearer {}", fan_token))
        .send()
        .await
        .expect("Failed to like post");

    let activity = client
        .get(&format!("{}/activity", BASE_URL))
        .header("Authorization", format!("Bearer {}", author_token))
        .send()
        .await
        .unwrap()
        .json::<Vec<serde_json::Value>>()
        .await
        .unwrap();

    let like_id = format!("like:{}:{}", post_id, fan_id);
    let like_event = activity
        .iter()
        .find(|e| e["id"] == like_id.as_str())
        .expect("synthesized like event missing");
    assert_eq!(like_event["kind"], "like");
    assert_eq!(like_event["actor_username"], fan_name);

    // Times are non-increasing.
    for pair in activity.windows(2) {
        assert!(pair[0]["time"].as_str().unwrap() >= pair[1]["time"].as_str().unwrap());
    }
}
