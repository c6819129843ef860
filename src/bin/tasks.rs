//! Developer task runner
//!
//! ```text
//! tasks db-create
//! tasks migrate --yes
//! tasks create-superuser --base-url http://127.0.0.1:8000
//! ```

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use blogstarter::tasks::{self, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();
    if let Err(e) = tasks::run(cli.command).await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}
