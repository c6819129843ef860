//! External program helpers and preflight checks

use anyhow::{bail, Context, Result};
use std::process::{Command, Stdio};
use tracing::info;

/// Run a program with inherited stdio and fail on a non-zero exit.
pub fn run_program(program: &str, args: &[String]) -> Result<()> {
    let status = Command::new(program)
        .args(args)
        .status()
        .with_context(|| format!("Failed to execute {}", program))?;

    if !status.success() {
        let code = status.code().unwrap_or(-1);
        bail!("`{} {}` exited with code {}", program, args.join(" "), code);
    }
    Ok(())
}

fn on_path(program: &str) -> bool {
    which::which(program).is_ok()
}

/// Check that the Docker CLI exists and the daemon answers `docker info`.
pub fn check_docker() -> Result<()> {
    if !on_path("docker") {
        bail!("Preflight check: Docker CLI is not installed or not in PATH. Install Docker first.");
    }

    let running = Command::new("docker")
        .arg("info")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false);
    if !running {
        bail!("Preflight check: Docker Desktop is not running. Please start it and try again.");
    }

    info!("Preflight check: Docker CLI is installed, and Docker Desktop is running.");
    Ok(())
}

/// Check that npm and npx are runnable.
pub fn check_node_tools() -> Result<()> {
    for tool in ["npm", "npx"] {
        if !on_path(tool) {
            bail!(
                "Preflight check: {} is not installed or not in PATH. Install Node.js and npm first.",
                tool
            );
        }
    }
    info!("Preflight check: npm and npx are available.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_is_error() {
        let err = run_program("definitely-not-a-real-program-xyz", &[]).unwrap_err();
        assert!(err.to_string().contains("Failed to execute"));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_zero_exit_is_error() {
        assert!(run_program("true", &[]).is_ok());
        let err = run_program("false", &[]).unwrap_err();
        assert!(err.to_string().contains("exited with code 1"));
    }
}
