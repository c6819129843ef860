//! Database repositories
//!
//! One repository per entity. Each is a trait with an SQLx implementation
//! that dispatches on the pool's driver.

pub mod permission;
pub mod post;
pub mod session;
pub mod user;

pub use permission::{PermissionRepository, SqlxPermissionRepository};
pub use post::{PostRepository, SqlxPostRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};
