//! Database layer
//!
//! SQLite and PostgreSQL behind one [`DatabasePool`] trait, the embedded
//! migrations, and a repository per entity.
//!
//! ```ignore
//! use blogstarter::config::DatabaseConfig;
//! use blogstarter::db::{create_pool, check_db_ready, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::with_url("sqlite:data/app.db")).await?;
//! check_db_ready(&pool).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    check_db_ready, create_pool, create_test_pool, DatabasePool, DynDatabasePool,
    PostgresDatabase, SqliteDatabase,
};
