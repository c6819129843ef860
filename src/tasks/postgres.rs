//! PostgreSQL container tasks

use anyhow::{Context, Result};
use clap::Args;
use inquire::Confirm;
use tracing::info;

use super::{run_program, POSTGRES_CONTAINER_NAME};

#[derive(Args, Debug)]
pub struct ContainerArgs {
    /// Docker container name
    #[arg(long, default_value = POSTGRES_CONTAINER_NAME)]
    pub container_name: String,
}

#[derive(Args, Debug)]
pub struct DbCreateArgs {
    #[command(flatten)]
    pub container: ContainerArgs,

    /// POSTGRES_USER for the new database
    #[arg(long, default_value = "myuser")]
    pub user: String,

    /// POSTGRES_PASSWORD for the new database
    #[arg(long, default_value = "mypassword")]
    pub password: String,

    /// POSTGRES_DB to create
    #[arg(long, default_value = "mydatabase")]
    pub db: String,
}

#[derive(Args, Debug)]
pub struct DbRemoveArgs {
    #[command(flatten)]
    pub container: ContainerArgs,

    /// Skip the confirmation prompt
    #[arg(long)]
    pub yes: bool,
}

/// Arguments for `docker run` creating the database container
pub fn docker_run_args(args: &DbCreateArgs) -> Vec<String> {
    vec![
        "run".into(),
        "--name".into(),
        args.container.container_name.clone(),
        "-e".into(),
        format!("POSTGRES_USER={}", args.user),
        "-e".into(),
        format!("POSTGRES_PASSWORD={}", args.password),
        "-e".into(),
        format!("POSTGRES_DB={}", args.db),
        "-p".into(),
        "5432:5432".into(),
        "-d".into(),
        "postgres".into(),
    ]
}

pub fn db_create(args: &DbCreateArgs) -> Result<()> {
    run_program("docker", &docker_run_args(args))?;
    info!(
        "PostgreSQL container '{}' created and started successfully.",
        args.container.container_name
    );
    Ok(())
}

pub fn db_start(args: &ContainerArgs) -> Result<()> {
    run_program("docker", &["start".into(), args.container_name.clone()])?;
    info!("PostgreSQL container '{}' started successfully.", args.container_name);
    Ok(())
}

pub fn db_remove(args: &DbRemoveArgs) -> Result<()> {
    let name = &args.container.container_name;
    let confirmed = args.yes
        || Confirm::new(&format!("Do you want to stop and remove '{}'?", name))
            .with_default(false)
            .prompt()
            .context("Failed to read confirmation")?;

    if !confirmed {
        info!("Operation canceled.");
        return Ok(());
    }

    run_program("docker", &["stop".into(), name.clone()])?;
    run_program("docker", &["rm".into(), name.clone()])?;
    info!("PostgreSQL container '{}' removed successfully.", name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_docker_run_args() {
        let args = DbCreateArgs {
            container: ContainerArgs {
                container_name: "blog-db".into(),
            },
            user: "blog".into(),
            password: "secret".into(),
            db: "posts".into(),
        };
        assert_eq!(
            docker_run_args(&args).join(" "),
            "run --name blog-db -e POSTGRES_USER=blog -e POSTGRES_PASSWORD=secret \
             -e POSTGRES_DB=posts -p 5432:5432 -d postgres"
        );
    }
}
