//! Post repository
//!
//! `post_metadata` is stored as JSON text in SQLite and as JSONB in PostgreSQL.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Post, PostStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const SQLITE_POST_COLUMNS: &str =
    "id, title, content, user_id, post_date, post_modified, post_status, post_metadata";
const POSTGRES_POST_COLUMNS: &str = "id, title, content, user_id, post_date, post_modified, \
     post_status, post_metadata::text AS post_metadata";

#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Insert a post and return it with its assigned id
    async fn create(&self, post: &Post) -> Result<Post>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    /// All posts, newest first
    async fn list(&self) -> Result<Vec<Post>>;

    /// Persist every mutable column as given
    async fn update(&self, post: &Post) -> Result<Post>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, post: &Post) -> Result<Post> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_post_sqlite(self.pool.sqlite()?, post).await,
            DatabaseDriver::Postgres => create_post_postgres(self.pool.postgres()?, post).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&format!(
                    "SELECT {} FROM posts WHERE id = ?",
                    SQLITE_POST_COLUMNS
                ))
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get post by ID")?;
                row.map(|r| row_to_post_sqlite(&r)).transpose()
            }
            DatabaseDriver::Postgres => {
                let row = sqlx::query(&format!(
                    "SELECT {} FROM posts WHERE id = $1",
                    POSTGRES_POST_COLUMNS
                ))
                .bind(id)
                .fetch_optional(self.pool.postgres()?)
                .await
                .context("Failed to get post by ID")?;
                row.map(|r| row_to_post_postgres(&r)).transpose()
            }
        }
    }

    async fn list(&self) -> Result<Vec<Post>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&format!(
                "SELECT {} FROM posts ORDER BY post_date DESC, id DESC",
                SQLITE_POST_COLUMNS
            ))
            .fetch_all(self.pool.sqlite()?)
            .await
            .context("Failed to list posts")?
            .iter()
            .map(row_to_post_sqlite)
            .collect(),
            DatabaseDriver::Postgres => sqlx::query(&format!(
                "SELECT {} FROM posts ORDER BY post_date DESC, id DESC",
                POSTGRES_POST_COLUMNS
            ))
            .fetch_all(self.pool.postgres()?)
            .await
            .context("Failed to list posts")?
            .iter()
            .map(row_to_post_postgres)
            .collect(),
        }
    }

    async fn update(&self, post: &Post) -> Result<Post> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_post_sqlite(self.pool.sqlite()?, post).await?,
            DatabaseDriver::Postgres => update_post_postgres(self.pool.postgres()?, post).await?,
        }
        self.get_by_id(post.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Post not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM posts WHERE id = ?")
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete post")?
                .rows_affected(),
            DatabaseDriver::Postgres => sqlx::query("DELETE FROM posts WHERE id = $1")
                .bind(id)
                .execute(self.pool.postgres()?)
                .await
                .context("Failed to delete post")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn count(&self) -> Result<i64> {
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("SELECT COUNT(*) AS count FROM posts")
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count posts")?
                .get("count"),
            DatabaseDriver::Postgres => sqlx::query("SELECT COUNT(*) AS count FROM posts")
                .fetch_one(self.pool.postgres()?)
                .await
                .context("Failed to count posts")?
                .get("count"),
        };
        Ok(count)
    }
}

fn metadata_to_text(metadata: &Option<Value>) -> Result<Option<String>> {
    match metadata {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(
            serde_json::to_string(value).context("Failed to serialize post metadata")?,
        )),
    }
}

fn metadata_from_text(text: Option<String>) -> Result<Option<Value>> {
    text.map(|t| serde_json::from_str(&t).context("Invalid post metadata in database"))
        .transpose()
}

fn parse_status(status: &str) -> Result<PostStatus> {
    PostStatus::from_str(status)
        .with_context(|| format!("Invalid post status in database: {}", status))
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_post_sqlite(pool: &SqlitePool, post: &Post) -> Result<Post> {
    let result = sqlx::query(
        r#"
        INSERT INTO posts (title, content, user_id, post_date, post_modified, post_status, post_metadata)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&post.title)
    .bind(&post.content)
    .bind(post.user_id)
    .bind(post.post_date)
    .bind(post.post_modified)
    .bind(post.post_status.to_string())
    .bind(metadata_to_text(&post.post_metadata)?)
    .execute(pool)
    .await
    .context("Failed to create post")?;

    Ok(Post {
        id: result.last_insert_rowid(),
        ..post.clone()
    })
}

async fn update_post_sqlite(pool: &SqlitePool, post: &Post) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE posts
        SET title = ?, content = ?, user_id = ?, post_modified = ?, post_status = ?, post_metadata = ?
        WHERE id = ?
        "#,
    )
    .bind(&post.title)
    .bind(&post.content)
    .bind(post.user_id)
    .bind(post.post_modified)
    .bind(post.post_status.to_string())
    .bind(metadata_to_text(&post.post_metadata)?)
    .bind(post.id)
    .execute(pool)
    .await
    .context("Failed to update post")?;
    Ok(())
}

fn row_to_post_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Post> {
    let status: String = row.try_get("post_status")?;
    Ok(Post {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        user_id: row.try_get("user_id")?,
        post_date: row.try_get("post_date")?,
        post_modified: row.try_get("post_modified")?,
        post_status: parse_status(&status)?,
        post_metadata: metadata_from_text(row.try_get("post_metadata")?)?,
    })
}

// ============================================================================
// PostgreSQL implementations
// ============================================================================

async fn create_post_postgres(pool: &PgPool, post: &Post) -> Result<Post> {
    let row = sqlx::query(
        r#"
        INSERT INTO posts (title, content, user_id, post_date, post_modified, post_status, post_metadata)
        VALUES ($1, $2, $3, $4, $5, $6, CAST($7 AS JSONB))
        RETURNING id
        "#,
    )
    .bind(&post.title)
    .bind(&post.content)
    .bind(post.user_id)
    .bind(post.post_date)
    .bind(post.post_modified)
    .bind(post.post_status.to_string())
    .bind(metadata_to_text(&post.post_metadata)?)
    .fetch_one(pool)
    .await
    .context("Failed to create post")?;

    Ok(Post {
        id: row.try_get("id")?,
        ..post.clone()
    })
}

async fn update_post_postgres(pool: &PgPool, post: &Post) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE posts
        SET title = $1, content = $2, user_id = $3, post_modified = $4, post_status = $5,
            post_metadata = CAST($6 AS JSONB)
        WHERE id = $7
        "#,
    )
    .bind(&post.title)
    .bind(&post.content)
    .bind(post.user_id)
    .bind(post.post_modified)
    .bind(post.post_status.to_string())
    .bind(metadata_to_text(&post.post_metadata)?)
    .bind(post.id)
    .execute(pool)
    .await
    .context("Failed to update post")?;
    Ok(())
}

fn row_to_post_postgres(row: &sqlx::postgres::PgRow) -> Result<Post> {
    let status: String = row.try_get("post_status")?;
    Ok(Post {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        user_id: row.try_get("user_id")?,
        post_date: row.try_get("post_date")?,
        post_modified: row.try_get("post_modified")?,
        post_status: parse_status(&status)?,
        post_metadata: metadata_from_text(row.try_get("post_metadata")?)?,
    })
}
