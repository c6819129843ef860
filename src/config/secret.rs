//! Protected secret values
//!
//! `ProtectedSecret` wraps the application secret key. The value is validated
//! when constructed and never appears in `Debug` or `Display` output.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum accepted secret length
pub const MIN_SECRET_LENGTH: usize = 12;

const MASK: &str = "**********";

/// Reasons a secret is rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecretError {
    #[error("Secret must be at least {min} characters long")]
    TooShort { min: usize },
    #[error("Secret must contain at least one uppercase letter")]
    MissingUppercase,
    #[error("Secret must contain at least one lowercase letter")]
    MissingLowercase,
    #[error("Secret must contain at least one digit")]
    MissingDigit,
}

/// A validated secret that masks itself when printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProtectedSecret(String);

impl ProtectedSecret {
    /// Validate and wrap a secret value.
    pub fn new(value: impl Into<String>) -> Result<Self, SecretError> {
        let value = value.into();
        validate_secret(&value)?;
        Ok(Self(value))
    }

    /// The raw secret. Only call this where the value is actually needed.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Show the first `visible_chars` characters and mask the rest.
    pub fn masked(&self, visible_chars: usize) -> String {
        let total = self.0.chars().count();
        let visible: String = self.0.chars().take(visible_chars).collect();
        let hidden = total.saturating_sub(visible_chars);
        format!("{}{}", visible, "*".repeat(hidden))
    }

    /// Compare against a candidate without short-circuiting on the first
    /// differing byte.
    pub fn matches(&self, candidate: &str) -> bool {
        let expected = self.0.as_bytes();
        let candidate = candidate.as_bytes();
        if expected.len() != candidate.len() {
            return false;
        }
        expected
            .iter()
            .zip(candidate)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// Check the length and character class rules for a secret.
pub fn validate_secret(value: &str) -> Result<(), SecretError> {
    if value.chars().count() < MIN_SECRET_LENGTH {
        return Err(SecretError::TooShort {
            min: MIN_SECRET_LENGTH,
        });
    }
    if !value.chars().any(|c| c.is_uppercase()) {
        return Err(SecretError::MissingUppercase);
    }
    if !value.chars().any(|c| c.is_lowercase()) {
        return Err(SecretError::MissingLowercase);
    }
    if !value.chars().any(|c| c.is_ascii_digit()) {
        return Err(SecretError::MissingDigit);
    }
    Ok(())
}

impl TryFrom<String> for ProtectedSecret {
    type Error = SecretError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProtectedSecret> for String {
    fn from(secret: ProtectedSecret) -> Self {
        secret.0
    }
}

impl fmt::Debug for ProtectedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProtectedSecret('{}')", MASK)
    }
}

impl fmt::Display for ProtectedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(MASK)
    }
}
