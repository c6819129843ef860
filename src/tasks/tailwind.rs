//! Tailwind CSS tasks

use anyhow::{bail, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::info;

use super::run_program;

#[derive(Args, Debug)]
pub struct TwWatchArgs {
    /// Source stylesheet with the Tailwind directives
    #[arg(long, default_value = "./static/css/input.css")]
    pub input: PathBuf,

    /// Generated stylesheet served under /static
    #[arg(long, default_value = "./static/css/styles.css")]
    pub output: PathBuf,
}

pub fn tw_install() -> Result<()> {
    run_program("npm", &["install".into(), "-D".into(), "tailwindcss".into()])?;
    info!("Tailwind CSS installed successfully.");
    run_program("npx", &["tailwindcss".into(), "init".into()])?;
    info!("Tailwind CSS configuration initialized successfully.");
    Ok(())
}

/// Arguments for `npx` running the Tailwind watcher
pub fn watch_args(args: &TwWatchArgs) -> Vec<String> {
    vec![
        "tailwindcss".into(),
        "-i".into(),
        args.input.display().to_string(),
        "-o".into(),
        args.output.display().to_string(),
        "--watch".into(),
    ]
}

pub fn tw_watch(args: &TwWatchArgs) -> Result<()> {
    if !args.input.exists() {
        bail!("Input file '{}' does not exist.", args.input.display());
    }
    info!(
        "Watching '{}' and project files for changes and writing output to '{}'.",
        args.input.display(),
        args.output.display()
    );
    run_program("npx", &watch_args(args))
}
