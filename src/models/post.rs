//! Post model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::validation::{FieldError, Validator};

pub const POST_TITLE_MAX_LEN: usize = 100;

/// A blog post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    /// Author. Cleared when the user is deleted.
    pub user_id: Option<i64>,
    pub post_date: DateTime<Utc>,
    pub post_modified: DateTime<Utc>,
    pub post_status: PostStatus,
    pub post_metadata: Option<Value>,
}

impl Post {
    /// Create an unsaved draft.
    pub fn new(title: String, content: String, user_id: Option<i64>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            title,
            content,
            user_id,
            post_date: now,
            post_modified: now,
            post_status: PostStatus::Draft,
            post_metadata: None,
        }
    }

    /// Mark the post as published and bump its modification time.
    pub fn publish(&mut self) {
        self.post_status = PostStatus::Published;
        self.post_modified = Utc::now();
    }

    pub fn is_published(&self) -> bool {
        self.post_status == PostStatus::Published
    }
}

/// Publication state of a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostStatus::Draft => write!(f, "DRAFT"),
            PostStatus::Published => write!(f, "PUBLISHED"),
        }
    }
}

impl FromStr for PostStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DRAFT" => Ok(PostStatus::Draft),
            "PUBLISHED" => Ok(PostStatus::Published),
            _ => Err(anyhow::anyhow!("Invalid post status: {}", s)),
        }
    }
}

/// Input for creating a post
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePostInput {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub post_status: PostStatus,
    #[serde(default)]
    pub post_metadata: Option<Value>,
}

impl CreatePostInput {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            post_status: PostStatus::Draft,
            post_metadata: None,
        }
    }

    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        Validator::new()
            .required("title", &self.title, POST_TITLE_MAX_LEN)
            .check(
                metadata_is_object(self.post_metadata.as_ref()),
                "post_metadata",
                "Input should be a valid dictionary",
            )
            .finish()
    }
}

/// Partial update for a post. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePostInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub post_status: Option<PostStatus>,
    #[serde(default)]
    pub post_metadata: Option<Value>,
}

impl UpdatePostInput {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut validator = Validator::new();
        if let Some(title) = &self.title {
            validator.required("title", title, POST_TITLE_MAX_LEN);
        }
        validator
            .check(
                metadata_is_object(self.post_metadata.as_ref()),
                "post_metadata",
                "Input should be a valid dictionary",
            )
            .finish()
    }
}

fn metadata_is_object(metadata: Option<&Value>) -> bool {
    matches!(metadata, None | Some(Value::Null) | Some(Value::Object(_)))
}
