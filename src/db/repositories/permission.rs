//! Permission repository
//!
//! Permissions and their many-to-many link to users.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Permission, PermissionInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait PermissionRepository: Send + Sync {
    async fn create(&self, input: &PermissionInput) -> Result<Permission>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Permission>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<Permission>>;

    /// All permissions ordered by name
    async fn list(&self) -> Result<Vec<Permission>>;

    /// Replace name and description. Returns `None` when the id is unknown.
    async fn update(&self, id: i64, input: &PermissionInput) -> Result<Option<Permission>>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn count(&self) -> Result<i64>;

    /// Permissions granted to a user, ordered by name
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Permission>>;

    /// Replace the user's grants with exactly `permission_ids`
    async fn set_for_user(&self, user_id: i64, permission_ids: &[i64]) -> Result<()>;
}

pub struct SqlxPermissionRepository {
    pool: DynDatabasePool,
}

impl SqlxPermissionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PermissionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PermissionRepository for SqlxPermissionRepository {
    async fn create(&self, input: &PermissionInput) -> Result<Permission> {
        let name = input.name.trim().to_string();
        let description = input.normalized_description();
        let id: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query("INSERT INTO permissions (name, description) VALUES (?, ?)")
                    .bind(&name)
                    .bind(&description)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to create permission")?
                    .last_insert_rowid()
            }
            DatabaseDriver::Postgres => sqlx::query(
                "INSERT INTO permissions (name, description) VALUES ($1, $2) RETURNING id",
            )
            .bind(&name)
            .bind(&description)
            .fetch_one(self.pool.postgres()?)
            .await
            .context("Failed to create permission")?
            .try_get("id")?,
        };

        Ok(Permission {
            id,
            name,
            description,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Permission>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query("SELECT id, name, description FROM permissions WHERE id = ?")
                    .bind(id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get permission by ID")?;
                row.map(|r| row_to_permission_sqlite(&r)).transpose()
            }
            DatabaseDriver::Postgres => {
                let row =
                    sqlx::query("SELECT id, name, description FROM permissions WHERE id = $1")
                        .bind(id)
                        .fetch_optional(self.pool.postgres()?)
                        .await
                        .context("Failed to get permission by ID")?;
                row.map(|r| row_to_permission_postgres(&r)).transpose()
            }
        }
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Permission>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row =
                    sqlx::query("SELECT id, name, description FROM permissions WHERE name = ?")
                        .bind(name)
                        .fetch_optional(self.pool.sqlite()?)
                        .await
                        .context("Failed to get permission by name")?;
                row.map(|r| row_to_permission_sqlite(&r)).transpose()
            }
            DatabaseDriver::Postgres => {
                let row =
                    sqlx::query("SELECT id, name, description FROM permissions WHERE name = $1")
                        .bind(name)
                        .fetch_optional(self.pool.postgres()?)
                        .await
                        .context("Failed to get permission by name")?;
                row.map(|r| row_to_permission_postgres(&r)).transpose()
            }
        }
    }

    async fn list(&self) -> Result<Vec<Permission>> {
        const SQL: &str = "SELECT id, name, description FROM permissions ORDER BY name";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SQL)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list permissions")?
                .iter()
                .map(row_to_permission_sqlite)
                .collect(),
            DatabaseDriver::Postgres => sqlx::query(SQL)
                .fetch_all(self.pool.postgres()?)
                .await
                .context("Failed to list permissions")?
                .iter()
                .map(row_to_permission_postgres)
                .collect(),
        }
    }

    async fn update(&self, id: i64, input: &PermissionInput) -> Result<Option<Permission>> {
        let name = input.name.trim();
        let description = input.normalized_description();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query("UPDATE permissions SET name = ?, description = ? WHERE id = ?")
                    .bind(name)
                    .bind(&description)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to update permission")?
                    .rows_affected()
            }
            DatabaseDriver::Postgres => {
                sqlx::query("UPDATE permissions SET name = $1, description = $2 WHERE id = $3")
                    .bind(name)
                    .bind(&description)
                    .bind(id)
                    .execute(self.pool.postgres()?)
                    .await
                    .context("Failed to update permission")?
                    .rows_affected()
            }
        };

        if affected == 0 {
            return Ok(None);
        }
        self.get_by_id(id).await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM permissions WHERE id = ?")
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete permission")?
                .rows_affected(),
            DatabaseDriver::Postgres => sqlx::query("DELETE FROM permissions WHERE id = $1")
                .bind(id)
                .execute(self.pool.postgres()?)
                .await
                .context("Failed to delete permission")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn count(&self) -> Result<i64> {
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("SELECT COUNT(*) AS count FROM permissions")
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count permissions")?
                .get("count"),
            DatabaseDriver::Postgres => sqlx::query("SELECT COUNT(*) AS count FROM permissions")
                .fetch_one(self.pool.postgres()?)
                .await
                .context("Failed to count permissions")?
                .get("count"),
        };
        Ok(count)
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Permission>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_for_user_sqlite(self.pool.sqlite()?, user_id).await,
            DatabaseDriver::Postgres => list_for_user_postgres(self.pool.postgres()?, user_id).await,
        }
    }

    async fn set_for_user(&self, user_id: i64, permission_ids: &[i64]) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                set_for_user_sqlite(self.pool.sqlite()?, user_id, permission_ids).await
            }
            DatabaseDriver::Postgres => {
                set_for_user_postgres(self.pool.postgres()?, user_id, permission_ids).await
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn list_for_user_sqlite(pool: &SqlitePool, user_id: i64) -> Result<Vec<Permission>> {
    let rows = sqlx::query(
        r#"
        SELECT p.id, p.name, p.description
        FROM permissions p
        INNER JOIN user_permissions up ON up.permission_id = p.id
        WHERE up.user_id = ?
        ORDER BY p.name
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to list user permissions")?;

    rows.iter().map(row_to_permission_sqlite).collect()
}

async fn set_for_user_sqlite(pool: &SqlitePool, user_id: i64, permission_ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM user_permissions WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear user permissions")?;

    for permission_id in dedup(permission_ids) {
        sqlx::query("INSERT INTO user_permissions (user_id, permission_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(permission_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to grant permission {}", permission_id))?;
    }

    tx.commit().await?;
    Ok(())
}

fn row_to_permission_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Permission> {
    Ok(Permission {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
    })
}

// ============================================================================
// PostgreSQL implementations
// ============================================================================

async fn list_for_user_postgres(pool: &PgPool, user_id: i64) -> Result<Vec<Permission>> {
    let rows = sqlx::query(
        r#"
        SELECT p.id, p.name, p.description
        FROM permissions p
        INNER JOIN user_permissions up ON up.permission_id = p.id
        WHERE up.user_id = $1
        ORDER BY p.name
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to list user permissions")?;

    rows.iter().map(row_to_permission_postgres).collect()
}

async fn set_for_user_postgres(pool: &PgPool, user_id: i64, permission_ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM user_permissions WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear user permissions")?;

    for permission_id in dedup(permission_ids) {
        sqlx::query("INSERT INTO user_permissions (user_id, permission_id) VALUES ($1, $2)")
            .bind(user_id)
            .bind(permission_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to grant permission {}", permission_id))?;
    }

    tx.commit().await?;
    Ok(())
}

fn row_to_permission_postgres(row: &sqlx::postgres::PgRow) -> Result<Permission> {
    Ok(Permission {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
    })
}

fn dedup(ids: &[i64]) -> Vec<i64> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::User;

    async fn setup() -> (SqlxPermissionRepository, SqlxUserRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        (
            SqlxPermissionRepository::new(pool.clone()),
            SqlxUserRepository::new(pool),
        )
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (repo, _) = setup().await;
        let created = repo
            .create(&PermissionInput::new(" posts:write ", Some("Edit posts".into())))
            .await
            .unwrap();
        assert_eq!(created.name, "posts:write");

        let fetched = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(
            repo.get_by_name("posts:write").await.unwrap().map(|p| p.id),
            Some(created.id)
        );
    }

    #[tokio::test]
    async fn test_list_update_delete() {
        let (repo, _) = setup().await;
        let b = repo.create(&PermissionInput::new("b", None)).await.unwrap();
        repo.create(&PermissionInput::new("a", None)).await.unwrap();

        let names: Vec<_> = repo.list().await.unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["a", "b"]);

        let updated = repo
            .update(b.id, &PermissionInput::new("c", Some("third".into())))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "c");
        assert!(repo.update(999, &PermissionInput::new("x", None)).await.unwrap().is_none());

        assert!(repo.delete(b.id).await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_user_grants() {
        let (repo, users) = setup().await;
        let user = users
            .create(&User::new("alice".into(), "hash".into()))
            .await
            .unwrap();
        let read = repo.create(&PermissionInput::new("read", None)).await.unwrap();
        let write = repo.create(&PermissionInput::new("write", None)).await.unwrap();

        repo.set_for_user(user.id, &[write.id, read.id, read.id]).await.unwrap();
        let granted = repo.list_for_user(user.id).await.unwrap();
        assert_eq!(granted.len(), 2);
        assert_eq!(granted[0].name, "read");

        repo.set_for_user(user.id, &[write.id]).await.unwrap();
        assert_eq!(repo.list_for_user(user.id).await.unwrap(), vec![write.clone()]);

        // Deleting the permission removes the grant
        repo.delete(write.id).await.unwrap();
        assert!(repo.list_for_user(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_grant_unknown_permission_fails() {
        let (repo, users) = setup().await;
        let user = users
            .create(&User::new("alice".into(), "hash".into()))
            .await
            .unwrap();
        assert!(repo.set_for_user(user.id, &[42]).await.is_err());
    }
}
