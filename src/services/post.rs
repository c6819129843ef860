//! Post service
//!
//! Blog post lifecycle: drafting, editing, publishing and removal.

use crate::db::repositories::PostRepository;
use crate::models::{CreatePostInput, FieldError, Post, PostStatus, UpdatePostInput};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum PostServiceError {
    #[error("Invalid input data")]
    Validation(Vec<FieldError>),

    #[error("Post not found")]
    NotFound,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub struct PostService {
    repo: Arc<dyn PostRepository>,
}

impl PostService {
    pub fn new(repo: Arc<dyn PostRepository>) -> Self {
        Self { repo }
    }

    /// Create a post attributed to `author`.
    ///
    /// Posts created through the shared secret have no author.
    pub async fn create_post(
        &self,
        input: CreatePostInput,
        author: Option<i64>,
    ) -> Result<Post, PostServiceError> {
        input.validate().map_err(PostServiceError::Validation)?;

        let mut post = Post::new(input.title.trim().to_string(), input.content, author);
        post.post_status = input.post_status;
        post.post_metadata = input.post_metadata.filter(|m| !m.is_null());

        let created = self.repo.create(&post).await?;
        tracing::info!(post_id = created.id, status = %created.post_status, "Post created");
        Ok(created)
    }

    /// All posts, newest first
    pub async fn list_posts(&self) -> Result<Vec<Post>, PostServiceError> {
        Ok(self.repo.list().await?)
    }

    pub async fn get_post(&self, id: i64) -> Result<Post, PostServiceError> {
        self.repo.get_by_id(id).await?.ok_or(PostServiceError::NotFound)
    }

    pub async fn update_post(
        &self,
        id: i64,
        input: UpdatePostInput,
    ) -> Result<Post, PostServiceError> {
        input.validate().map_err(PostServiceError::Validation)?;
        let mut post = self.get_post(id).await?;

        if let Some(title) = input.title {
            post.title = title.trim().to_string();
        }
        if let Some(content) = input.content {
            post.content = content;
        }
        if let Some(status) = input.post_status {
            post.post_status = status;
        }
        if let Some(metadata) = input.post_metadata {
            post.post_metadata = match metadata {
                Value::Null => None,
                other => Some(other),
            };
        }
        post.post_modified = Utc::now();

        Ok(self.repo.update(&post).await?)
    }

    /// Switch a post to `PUBLISHED`. Publishing twice is a no-op apart
    /// from the modification time.
    pub async fn publish_post(&self, id: i64) -> Result<Post, PostServiceError> {
        let mut post = self.get_post(id).await?;
        post.publish();
        let published = self.repo.update(&post).await?;
        tracing::info!(post_id = id, "Post published");
        Ok(published)
    }

    pub async fn delete_post(&self, id: i64) -> Result<(), PostServiceError> {
        if self.repo.delete(id).await? {
            tracing::info!(post_id = id, "Post deleted");
            Ok(())
        } else {
            Err(PostServiceError::NotFound)
        }
    }

    pub async fn count(&self) -> Result<i64, PostServiceError> {
        Ok(self.repo.count().await?)
    }

    /// Count of posts in a given state
    pub async fn count_with_status(&self, status: PostStatus) -> Result<usize, PostServiceError> {
        Ok(self
            .repo
            .list()
            .await?
            .iter()
            .filter(|p| p.post_status == status)
            .count())
    }
}
