//! Data models
//!
//! Database entities (User, Permission, Post, Session), the input types used
//! to create and update them, and the authentication result carried by each
//! request.

mod auth;
mod permission;
mod post;
mod session;
mod user;
mod validation;

pub use auth::{AuthUser, Authentication, Scope, SECRET_ADMIN_NAME};
pub use permission::{Permission, PermissionInput, PERMISSION_DESCRIPTION_MAX_LEN, PERMISSION_NAME_MAX_LEN};
pub use post::{CreatePostInput, Post, PostStatus, UpdatePostInput, POST_TITLE_MAX_LEN};
pub use session::Session;
pub use user::{
    CreateUserInput, UpdateUserInput, User, EMAIL_MAX_LEN, FULL_NAME_MAX_LEN, PASSWORD_MIN_LEN,
    USERNAME_MAX_LEN,
};
pub use validation::{FieldError, Validator};
