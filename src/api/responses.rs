//! Shared API response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Post, PostStatus, User};

/// Public view of a user. The password hash is never included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRead {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<User> for UserRead {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            is_active: user.is_active,
            is_superuser: user.is_superuser,
            created_at: user.created_at,
            updated_at: user.updated_at,
            last_login: user.last_login,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRead {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub user_id: Option<i64>,
    pub post_date: DateTime<Utc>,
    pub post_modified: DateTime<Utc>,
    pub post_status: PostStatus,
    pub post_metadata: Option<Value>,
}

impl From<Post> for PostRead {
    fn from(post: Post) -> Self {
        Self {
            id: post.id,
            title: post.title,
            content: post.content,
            user_id: post.user_id,
            post_date: post.post_date,
            post_modified: post.post_modified,
            post_status: post.post_status,
            post_metadata: post.post_metadata,
        }
    }
}

/// `{"message": "..."}` confirmation body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_read_omits_password() {
        let user = User::new("alice".into(), "$argon2id$secret".into());
        let json = serde_json::to_value(UserRead::from(user)).unwrap();

        assert_eq!(json["username"], "alice");
        assert!(json.get("password_hash").is_none());
        assert!(json.get("password").is_none());
        assert_eq!(json["is_active"], true);
    }

    #[test]
    fn test_post_read_status_uppercase() {
        let post = Post::new("Title".into(), "Body".into(), None);
        let json = serde_json::to_value(PostRead::from(post)).unwrap();
        assert_eq!(json["post_status"], "DRAFT");
        assert_eq!(json["post_metadata"], Value::Null);
    }
}
