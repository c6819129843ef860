//! Developer task runner
//!
//! Commands: check-docker, db-create, db-start, db-remove, check-node-tools,
//! tw-install, tw-watch, migrate, create-superuser, populate-posts

mod process;
pub mod postgres;
pub mod setup;
pub mod tailwind;

use anyhow::Result;
use clap::{Parser, Subcommand};

pub use process::{check_docker, check_node_tools, run_program};

/// Container name used by the PostgreSQL tasks
pub const POSTGRES_CONTAINER_NAME: &str = "my-postgres";

/// Server the setup tasks talk to
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

#[derive(Parser, Debug)]
#[command(
    name = "tasks",
    author,
    version,
    about = "Development tasks for the blog: database container, Tailwind, migrations and seed data"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: TaskCommand,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    /// Check that the Docker CLI is installed and the daemon is running
    CheckDocker,
    /// Create and start a PostgreSQL container
    DbCreate(postgres::DbCreateArgs),
    /// Start an existing PostgreSQL container
    DbStart(postgres::ContainerArgs),
    /// Stop and remove the PostgreSQL container after confirmation
    DbRemove(postgres::DbRemoveArgs),
    /// Check that npm and npx are available
    CheckNodeTools,
    /// Install Tailwind CSS and initialize its config
    TwInstall,
    /// Rebuild the stylesheet whenever project files change
    TwWatch(tailwind::TwWatchArgs),
    /// Apply pending database migrations
    Migrate(setup::MigrateArgs),
    /// Create a superuser through the running server's API
    CreateSuperuser(setup::ServerArgs),
    /// Create a sample post through the running server's API
    PopulatePosts(setup::ServerArgs),
}

/// Run one task. Tasks that need Docker or Node run their preflight check first.
pub async fn run(command: TaskCommand) -> Result<()> {
    match command {
        TaskCommand::CheckDocker => check_docker(),
        TaskCommand::DbCreate(args) => {
            check_docker()?;
            postgres::db_create(&args)
        }
        TaskCommand::DbStart(args) => {
            check_docker()?;
            postgres::db_start(&args)
        }
        TaskCommand::DbRemove(args) => {
            check_docker()?;
            postgres::db_remove(&args)
        }
        TaskCommand::CheckNodeTools => check_node_tools(),
        TaskCommand::TwInstall => {
            check_node_tools()?;
            tailwind::tw_install()
        }
        TaskCommand::TwWatch(args) => {
            check_node_tools()?;
            tailwind::tw_watch(&args)
        }
        TaskCommand::Migrate(args) => setup::migrate(&args).await,
        TaskCommand::CreateSuperuser(args) => setup::create_superuser(&args).await,
        TaskCommand::PopulatePosts(args) => setup::populate_posts(&args).await,
    }
}
