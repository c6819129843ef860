//! Request authentication and admin panel sessions
//!
//! Every request is resolved to an [`Authentication`] by checking, in order:
//! the session cookie, then the `Authorization-Username` /
//! `Authorization-Password` header pair. A request carrying neither is
//! anonymous.

use crate::config::ProtectedSecret;
use crate::db::repositories::SessionRepository;
use crate::models::{AuthUser, Authentication, Session, User};
use crate::services::user::{UserService, UserServiceError};
use std::sync::Arc;

/// Username that selects the shared-secret check instead of a user lookup
pub const SECRET_KEY_USERNAME: &str = "SECRET_KEY";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("User does not exist or is not an admin")]
    NotAdmin,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<UserServiceError> for AuthError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::Internal(e) => AuthError::Internal(e),
            other => AuthError::Internal(anyhow::anyhow!(other.to_string())),
        }
    }
}

/// Authentication backend shared by the API and the admin panel
pub struct AuthBackend {
    users: Arc<UserService>,
    sessions: Arc<dyn SessionRepository>,
    secret: Option<ProtectedSecret>,
    session_max_age_days: i64,
}

impl AuthBackend {
    pub fn new(
        users: Arc<UserService>,
        sessions: Arc<dyn SessionRepository>,
        secret: Option<ProtectedSecret>,
        session_max_age_days: i64,
    ) -> Self {
        Self {
            users,
            sessions,
            secret,
            session_max_age_days,
        }
    }

    /// Resolve the principal behind a request.
    ///
    /// Header credentials that fail verification are an error rather than
    /// an anonymous result.
    pub async fn authenticate(
        &self,
        session_token: Option<&str>,
        header_username: Option<&str>,
        header_password: Option<&str>,
    ) -> Result<Authentication, AuthError> {
        if let Some(token) = session_token.filter(|t| !t.is_empty()) {
            if let Some(auth) = self.from_session(token).await? {
                return Ok(auth);
            }
        }

        let (Some(username), Some(password)) = (header_username, header_password) else {
            return Ok(Authentication::anonymous());
        };

        if username == SECRET_KEY_USERNAME {
            if let Some(secret) = &self.secret {
                if secret.matches(password) {
                    return Ok(Authentication::granted(AuthUser::secret_admin(), true));
                }
            }
        }

        match self.users.verify_credentials(username, password).await? {
            Some(user) => {
                let is_admin = user.is_superuser;
                Ok(Authentication::granted(AuthUser::from_user(user), is_admin))
            }
            None => {
                tracing::debug!(username = %username, "Header credentials rejected");
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    async fn from_session(&self, token: &str) -> Result<Option<Authentication>, AuthError> {
        let Some(session) = self.sessions.get_by_id(token).await? else {
            return Ok(None);
        };
        if session.is_expired() {
            self.sessions.delete(&session.id).await?;
            return Ok(None);
        }
        let user = AuthUser::named(session.username, session.identity);
        Ok(Some(Authentication::granted(user, session.is_superuser)))
    }

    /// Log in to the admin panel. Only superusers may start a session.
    pub async fn login(&self, username: &str, password: &str) -> Result<(Session, User), AuthError> {
        let user = match self.users.get_by_username(username).await? {
            Some(user) if user.is_superuser && user.is_active => user,
            _ => return Err(AuthError::NotAdmin),
        };
        if self.users.verify_credentials(username, password).await?.is_none() {
            return Err(AuthError::InvalidCredentials);
        }

        let session = Session::start(
            user.id,
            user.username.clone(),
            user.is_superuser,
            self.session_max_age_days,
        );
        self.sessions.create(&session).await?;
        self.users.record_login(user.id).await?;

        tracing::info!(user_id = user.id, username = %user.username, "Admin login");
        Ok((session, user))
    }

    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        Ok(self.sessions.delete(token).await?)
    }

    /// Delete expired sessions, returning how many were removed
    pub async fn purge_expired_sessions(&self) -> Result<u64, AuthError> {
        Ok(self.sessions.delete_expired().await?)
    }

    pub fn session_max_age_days(&self) -> i64 {
        self.session_max_age_days
    }
}
