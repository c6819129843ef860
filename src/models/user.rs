//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::validation::{FieldError, Validator};

pub const USERNAME_MAX_LEN: usize = 50;
pub const EMAIL_MAX_LEN: usize = 100;
pub const FULL_NAME_MAX_LEN: usize = 100;
pub const PASSWORD_MIN_LEN: usize = 8;

/// A registered account.
///
/// Superusers receive the admin scope when they authenticate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    /// Password hash (argon2 PHC string)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    /// Create an unsaved user. The password must already be hashed.
    pub fn new(username: String, password_hash: String) -> Self {
        Self {
            id: 0,
            username,
            email: None,
            full_name: None,
            is_active: true,
            is_superuser: false,
            password_hash,
            created_at: Utc::now(),
            updated_at: None,
            last_login: None,
        }
    }

    /// Name shown in page headers, preferring the full name.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.username)
    }
}

/// Input for creating a user
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserInput {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    /// Plain-text password, hashed by the service
    pub password: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_superuser: bool,
}

fn default_true() -> bool {
    true
}

impl CreateUserInput {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: None,
            full_name: None,
            password: password.into(),
            is_active: true,
            is_superuser: false,
        }
    }

    pub fn superuser(mut self) -> Self {
        self.is_superuser = true;
        self
    }

    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        Validator::new()
            .required("username", &self.username, USERNAME_MAX_LEN)
            .optional_max_len("full_name", self.full_name.as_deref(), FULL_NAME_MAX_LEN)
            .optional_max_len("email", self.email.as_deref(), EMAIL_MAX_LEN)
            .check(
                self.email.as_deref().map_or(true, looks_like_email),
                "email",
                "Value is not a valid email address",
            )
            .min_len("password", &self.password, PASSWORD_MIN_LEN)
            .finish()
    }
}

/// Partial update for a user. `None` leaves a field unchanged.
///
/// For `email` and `full_name`, `Some("")` clears the stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserInput {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub is_superuser: Option<bool>,
}

impl UpdateUserInput {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut validator = Validator::new();
        if let Some(username) = &self.username {
            validator.required("username", username, USERNAME_MAX_LEN);
        }
        if let Some(password) = &self.password {
            validator.min_len("password", password, PASSWORD_MIN_LEN);
        }
        validator
            .optional_max_len("full_name", self.full_name.as_deref(), FULL_NAME_MAX_LEN)
            .optional_max_len("email", self.email.as_deref(), EMAIL_MAX_LEN)
            .check(
                self.email
                    .as_deref()
                    .map_or(true, |e| e.is_empty() || looks_like_email(e)),
                "email",
                "Value is not a valid email address",
            )
            .finish()
    }
}

/// Minimal shape check: one `@` with text on both sides and a dot in the domain.
fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.contains('@')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_defaults() {
        let user = User::new("alice".into(), "hash".into());
        assert!(user.is_active);
        assert!(!user.is_superuser);
        assert!(user.updated_at.is_none());
        assert!(user.last_login.is_none());
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User::new("alice".into(), "secret-hash".into());
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(!json.contains("password_hash"));
    }

    #[test]
    fn test_display_name() {
        let mut user = User::new("alice".into(), "hash".into());
        assert_eq!(user.display_name(), "alice");
        user.full_name = Some("Alice Liddell".into());
        assert_eq!(user.display_name(), "Alice Liddell");
    }

    #[test]
    fn test_create_input_validation() {
        assert!(CreateUserInput::new("alice", "password123").validate().is_ok());

        let errors = CreateUserInput::new("", "short").validate().unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["username", "password"]);

        let long_name = "a".repeat(USERNAME_MAX_LEN + 1);
        assert!(CreateUserInput::new(long_name, "password123").validate().is_err());

        let mut input = CreateUserInput::new("bob", "password123");
        input.email = Some("not-an-email".into());
        assert!(input.validate().is_err());
        input.email = Some("bob@example.com".into());
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_create_input_defaults_from_json() {
        let input: CreateUserInput =
            serde_json::from_str(r#"{"username": "alice", "password": "password123"}"#).unwrap();
        assert!(input.is_active);
        assert!(!input.is_superuser);
        assert!(input.email.is_none());
    }

    #[test]
    fn test_update_input_validation() {
        assert!(UpdateUserInput::default().validate().is_ok());

        let input = UpdateUserInput {
            password: Some("short".into()),
            ..Default::default()
        };
        assert!(input.validate().is_err());

        let input = UpdateUserInput {
            email: Some(String::new()),
            ..Default::default()
        };
        assert!(input.validate().is_ok());
    }
}
