//! Permission model

use serde::{Deserialize, Serialize};

use super::validation::{FieldError, Validator};

pub const PERMISSION_NAME_MAX_LEN: usize = 100;
pub const PERMISSION_DESCRIPTION_MAX_LEN: usize = 255;

/// A named capability that can be granted to users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// Input for creating or replacing a permission
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl PermissionInput {
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            name: name.into(),
            description,
        }
    }

    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        Validator::new()
            .required("name", &self.name, PERMISSION_NAME_MAX_LEN)
            .optional_max_len(
                "description",
                self.description.as_deref(),
                PERMISSION_DESCRIPTION_MAX_LEN,
            )
            .finish()
    }

    /// Blank descriptions are stored as NULL.
    pub fn normalized_description(&self) -> Option<String> {
        self.description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
    }
}
