//! Session model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A logged-in admin panel session.
///
/// The identity fields are captured at login so that authenticating a
/// request does not need a user lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session ID (token)
    pub id: String,
    pub user_id: i64,
    pub username: String,
    pub identity: String,
    pub is_superuser: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Start a session for `user_id` that lasts `max_age_days`.
    pub fn start(
        user_id: i64,
        username: String,
        is_superuser: bool,
        max_age_days: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            username,
            identity: user_id.to_string(),
            is_superuser,
            expires_at: now + Duration::days(max_age_days),
            created_at: now,
        }
    }

    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    /// Remaining lifetime in whole seconds, for the cookie `Max-Age`.
    pub fn max_age_seconds(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_session() {
        let session = Session::start(42, "admin".into(), true, 7);
        assert_eq!(session.identity, "42");
        assert!(!session.is_expired());
        assert!(session.max_age_seconds() > 6 * 24 * 3600);
        assert!(uuid::Uuid::parse_str(&session.id).is_ok());
    }

    #[test]
    fn test_expired_session() {
        let mut session = Session::start(1, "admin".into(), false, 7);
        session.expires_at = Utc::now() - Duration::seconds(1);
        assert!(session.is_expired());
        assert_eq!(session.max_age_seconds(), 0);
    }
}
