//! User service
//!
//! Account management on top of the user and permission repositories.
//! Passwords are hashed here and never leave this layer in plain text.

use crate::db::repositories::{PermissionRepository, SessionRepository, UserRepository};
use crate::models::{CreateUserInput, FieldError, Permission, UpdateUserInput, User};
use crate::services::password::{hash_password, verify_password};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("Invalid input data")]
    Validation(Vec<FieldError>),

    #[error("Username '{0}' is already taken.")]
    UsernameTaken(String),

    #[error("Email '{0}' is already registered.")]
    EmailTaken(String),

    #[error("User not found")]
    NotFound,

    #[error("Permission with ID {0} does not exist")]
    UnknownPermission(i64),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// User service for account management and credential checks
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    permission_repo: Arc<dyn PermissionRepository>,
    session_repo: Arc<dyn SessionRepository>,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        permission_repo: Arc<dyn PermissionRepository>,
        session_repo: Arc<dyn SessionRepository>,
    ) -> Self {
        Self {
            user_repo,
            permission_repo,
            session_repo,
        }
    }

    /// Create a user after validating input and checking uniqueness.
    ///
    /// # Errors
    ///
    /// - `Validation` for malformed input
    /// - `UsernameTaken` / `EmailTaken` for duplicates
    pub async fn create_user(&self, input: CreateUserInput) -> Result<User, UserServiceError> {
        input.validate().map_err(UserServiceError::Validation)?;

        if self.user_repo.get_by_username(&input.username).await?.is_some() {
            return Err(UserServiceError::UsernameTaken(input.username));
        }
        let email = normalize_optional(input.email);
        if let Some(email) = &email {
            if self.user_repo.get_by_email(email).await?.is_some() {
                return Err(UserServiceError::EmailTaken(email.clone()));
            }
        }

        let mut user = User::new(input.username, hash_password(&input.password)?);
        user.email = email;
        user.full_name = normalize_optional(input.full_name);
        user.is_active = input.is_active;
        user.is_superuser = input.is_superuser;

        let created = self.user_repo.create(&user).await?;
        tracing::info!(user_id = created.id, username = %created.username, "User created");
        Ok(created)
    }

    /// All users, newest first
    pub async fn list_users(&self) -> Result<Vec<User>, UserServiceError> {
        Ok(self.user_repo.list().await?)
    }

    pub async fn get_user(&self, id: i64) -> Result<User, UserServiceError> {
        self.user_repo
            .get_by_id(id)
            .await?
            .ok_or(UserServiceError::NotFound)
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, UserServiceError> {
        Ok(self.user_repo.get_by_username(username).await?)
    }

    /// Apply a partial update. A new password is re-hashed.
    ///
    /// Changing the username, password, active flag or superuser flag ends
    /// every admin session of the user.
    pub async fn update_user(
        &self,
        id: i64,
        input: UpdateUserInput,
    ) -> Result<User, UserServiceError> {
        input.validate().map_err(UserServiceError::Validation)?;
        let mut user = self.get_user(id).await?;
        let mut revoke_sessions = false;

        if let Some(username) = input.username {
            if username != user.username {
                if self.user_repo.get_by_username(&username).await?.is_some() {
                    return Err(UserServiceError::UsernameTaken(username));
                }
                user.username = username;
                revoke_sessions = true;
            }
        }
        if let Some(email) = input.email {
            let email = normalize_optional(Some(email));
            if let Some(new_email) = &email {
                if user.email.as_ref() != Some(new_email)
                    && self.user_repo.get_by_email(new_email).await?.is_some()
                {
                    return Err(UserServiceError::EmailTaken(new_email.clone()));
                }
            }
            user.email = email;
        }
        if let Some(full_name) = input.full_name {
            user.full_name = normalize_optional(Some(full_name));
        }
        if let Some(password) = input.password {
            user.password_hash = hash_password(&password)?;
            revoke_sessions = true;
        }
        if let Some(is_active) = input.is_active {
            revoke_sessions |= is_active != user.is_active;
            user.is_active = is_active;
        }
        if let Some(is_superuser) = input.is_superuser {
            revoke_sessions |= is_superuser != user.is_superuser;
            user.is_superuser = is_superuser;
        }

        let updated = self.user_repo.update(&user).await?;
        if revoke_sessions {
            self.session_repo.delete_by_user(id).await?;
            tracing::info!(user_id = id, "Sessions revoked after account change");
        }
        Ok(updated)
    }

    pub async fn delete_user(&self, id: i64) -> Result<(), UserServiceError> {
        if self.user_repo.delete(id).await? {
            tracing::info!(user_id = id, "User deleted");
            Ok(())
        } else {
            Err(UserServiceError::NotFound)
        }
    }

    /// Look up an active user by name and check the password.
    ///
    /// Unknown users, wrong passwords and inactive accounts all yield `None`.
    pub async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, UserServiceError> {
        let Some(user) = self.user_repo.get_by_username(username).await? else {
            return Ok(None);
        };
        if !user.is_active {
            return Ok(None);
        }
        let valid = verify_password(password, &user.password_hash)
            .with_context(|| format!("Stored password hash for '{}' is unreadable", username))?;
        Ok(valid.then_some(user))
    }

    pub async fn record_login(&self, id: i64) -> Result<(), UserServiceError> {
        Ok(self.user_repo.touch_last_login(id, Utc::now()).await?)
    }

    pub async fn permissions_for(&self, user_id: i64) -> Result<Vec<Permission>, UserServiceError> {
        Ok(self.permission_repo.list_for_user(user_id).await?)
    }

    /// Fail with `UnknownPermission` on the first id that does not exist.
    pub async fn check_permissions(&self, permission_ids: &[i64]) -> Result<(), UserServiceError> {
        for &permission_id in permission_ids {
            if self.permission_repo.get_by_id(permission_id).await?.is_none() {
                return Err(UserServiceError::UnknownPermission(permission_id));
            }
        }
        Ok(())
    }

    /// Replace a user's permission grants.
    pub async fn set_permissions(
        &self,
        user_id: i64,
        permission_ids: &[i64],
    ) -> Result<(), UserServiceError> {
        self.get_user(user_id).await?;
        self.check_permissions(permission_ids).await?;
        Ok(self
            .permission_repo
            .set_for_user(user_id, permission_ids)
            .await?)
    }

    pub async fn count(&self) -> Result<i64, UserServiceError> {
        Ok(self.user_repo.count().await?)
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxPermissionRepository, SqlxSessionRepository, SqlxUserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{PermissionInput, Session};

    async fn setup() -> UserService {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxPermissionRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool),
        )
    }

    #[tokio::test]
    async fn test_create_user_hashes_password() {
        let service = setup().await;
        let user = service
            .create_user(CreateUserInput::new("alice", "password123"))
            .await
            .unwrap();

        assert!(user.id > 0);
        assert_ne!(user.password_hash, "password123");
        assert!(user.password_hash.starts_with("$argon2id$"));
        assert!(!user.is_superuser);
    }

    #[tokio::test]
    async fn test_create_user_duplicate_username() {
        let service = setup().await;
        service
            .create_user(CreateUserInput::new("alice", "password123"))
            .await
            .unwrap();

        let err = service
            .create_user(CreateUserInput::new("alice", "password456"))
            .await
            .unwrap_err();
        assert!(matches!(err, UserServiceError::UsernameTaken(_)));
        assert_eq!(err.to_string(), "Username 'alice' is already taken.");
    }

    #[tokio::test]
    async fn test_create_user_duplicate_email() {
        let service = setup().await;
        let mut input = CreateUserInput::new("alice", "password123");
        input.email = Some("shared@example.com".into());
        service.create_user(input.clone()).await.unwrap();

        input.username = "bob".into();
        let err = service.create_user(input).await.unwrap_err();
        assert!(matches!(err, UserServiceError::EmailTaken(_)));
    }

    #[tokio::test]
    async fn test_create_user_validation() {
        let service = setup().await;
        let err = service
            .create_user(CreateUserInput::new("alice", "short"))
            .await
            .unwrap_err();
        match err {
            UserServiceError::Validation(errors) => assert_eq!(errors[0].field, "password"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_verify_credentials() {
        let service = setup().await;
        let user = service
            .create_user(CreateUserInput::new("alice", "password123"))
            .await
            .unwrap();

        let found = service.verify_credentials("alice", "password123").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));
        assert!(service.verify_credentials("alice", "wrong-pass").await.unwrap().is_none());
        assert!(service.verify_credentials("nobody", "password123").await.unwrap().is_none());

        service
            .update_user(
                user.id,
                UpdateUserInput {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(service.verify_credentials("alice", "password123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_user() {
        let service = setup().await;
        let user = service
            .create_user(CreateUserInput::new("alice", "password123"))
            .await
            .unwrap();
        service
            .create_user(CreateUserInput::new("bob", "password123"))
            .await
            .unwrap();

        let updated = service
            .update_user(
                user.id,
                UpdateUserInput {
                    full_name: Some("Alice Liddell".into()),
                    password: Some("new-password".into()),
                    is_superuser: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.full_name.as_deref(), Some("Alice Liddell"));
        assert!(updated.is_superuser);
        assert!(updated.updated_at.is_some());
        assert!(service.verify_credentials("alice", "new-password").await.unwrap().is_some());

        let err = service
            .update_user(
                user.id,
                UpdateUserInput {
                    username: Some("bob".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, UserServiceError::UsernameTaken(_)));
    }

    #[tokio::test]
    async fn test_delete_user() {
        let service = setup().await;
        let user = service
            .create_user(CreateUserInput::new("alice", "password123"))
            .await
            .unwrap();

        service.delete_user(user.id).await.unwrap();
        assert!(matches!(
            service.get_user(user.id).await,
            Err(UserServiceError::NotFound)
        ));
        assert!(matches!(
            service.delete_user(user.id).await,
            Err(UserServiceError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_list_users_newest_first() {
        let service = setup().await;
        service.create_user(CreateUserInput::new("first", "password123")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        service.create_user(CreateUserInput::new("second", "password123")).await.unwrap();

        let users = service.list_users().await.unwrap();
        assert_eq!(users[0].username, "second");
        assert_eq!(service.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_set_permissions() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let permissions = SqlxPermissionRepository::boxed(pool.clone());
        let service = UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            permissions.clone(),
            SqlxSessionRepository::boxed(pool),
        );

        let user = service
            .create_user(CreateUserInput::new("alice", "password123"))
            .await
            .unwrap();
        let perm = permissions
            .create(&PermissionInput::new("posts:write", None))
            .await
            .unwrap();

        service.set_permissions(user.id, &[perm.id]).await.unwrap();
        assert_eq!(service.permissions_for(user.id).await.unwrap(), vec![perm]);

        let err = service.set_permissions(user.id, &[999]).await.unwrap_err();
        assert!(matches!(err, UserServiceError::UnknownPermission(999)));
        assert!(service.check_permissions(&[perm.id]).await.is_ok());
        assert!(matches!(
            service.check_permissions(&[perm.id, 998]).await,
            Err(UserServiceError::UnknownPermission(998))
        ));
    }

    #[tokio::test]
    async fn test_account_changes_revoke_sessions() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let sessions = SqlxSessionRepository::boxed(pool.clone());
        let service = UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxPermissionRepository::boxed(pool),
            sessions.clone(),
        );
        let user = service
            .create_user(CreateUserInput::new("admin", "password123").superuser())
            .await
            .unwrap();

        let session = Session::start(user.id, user.username.clone(), true, 7);
        sessions.create(&session).await.unwrap();

        // Profile-only edits keep the session
        service
            .update_user(
                user.id,
                UpdateUserInput {
                    full_name: Some("Admin".into()),
                    is_superuser: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(sessions.get_by_id(&session.id).await.unwrap().is_some());

        service
            .update_user(
                user.id,
                UpdateUserInput {
                    is_superuser: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(sessions.get_by_id(&session.id).await.unwrap().is_none());

        let session = Session::start(user.id, user.username.clone(), false, 7);
        sessions.create(&session).await.unwrap();
        service
            .update_user(
                user.id,
                UpdateUserInput {
                    password: Some("newpassword1".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(sessions.get_by_id(&session.id).await.unwrap().is_none());
    }
}
