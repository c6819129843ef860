//! Services layer - Business logic
//!
//! Services sit between the HTTP handlers and the repositories. They own
//! validation, uniqueness checks and password handling, and report failures
//! through per-service error enums.

pub mod auth;
pub mod password;
pub mod permission;
pub mod post;
pub mod user;

pub use auth::{AuthBackend, AuthError, SECRET_KEY_USERNAME};
pub use password::{hash_password, verify_password};
pub use permission::{PermissionService, PermissionServiceError};
pub use post::{PostService, PostServiceError};
pub use user::{UserService, UserServiceError};
