//! Database and seed data tasks
//!
//! `create-superuser` and `populate-posts` go through the running server's
//! REST API, authenticating with the shared secret.

use anyhow::{bail, Context, Result};
use clap::Args;
use inquire::{Confirm, Password, Text};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;

use super::DEFAULT_BASE_URL;
use crate::api::middleware::{PASSWORD_HEADER, USERNAME_HEADER};
use crate::config::Config;
use crate::db::{self, migrations};
use crate::services::SECRET_KEY_USERNAME;

#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Configuration file
    #[arg(long, default_value = "config.yml")]
    pub config: PathBuf,

    /// Apply without asking
    #[arg(long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct ServerArgs {
    /// Base URL of the running server
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,
}

pub async fn migrate(args: &MigrateArgs) -> Result<()> {
    let config = Config::load_with_env(&args.config)?;
    let pool = db::create_pool(&config.database).await?;

    let pending = migrations::pending_migrations(&pool).await?;
    if pending.is_empty() {
        info!("Database is up to date.");
        pool.close().await;
        return Ok(());
    }

    info!("{} pending migration(s):", pending.len());
    for migration in &pending {
        info!("  {:03} {}", migration.version, migration.name);
    }

    let proceed = args.yes
        || Confirm::new("Proceed with upgrade?")
            .with_default(false)
            .prompt()
            .context("Failed to read confirmation")?;

    if proceed {
        let applied = migrations::run_migrations(&pool).await?;
        info!("Database upgraded successfully ({} applied).", applied);
    } else {
        info!("Upgrade aborted.");
    }

    pool.close().await;
    Ok(())
}

/// HTTP client that authenticates as the shared-secret administrator
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, secret: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USERNAME_HEADER, HeaderValue::from_static(SECRET_KEY_USERNAME));
        let mut password =
            HeaderValue::from_str(secret).context("SECRET_KEY is not a valid header value")?;
        password.set_sensitive(true);
        headers.insert(PASSWORD_HEADER, password);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Client using `SECRET_KEY` from the environment
    pub fn from_env(base_url: &str) -> Result<Self> {
        let secret = std::env::var("SECRET_KEY")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .context("SECRET_KEY not found in environment variables.")?;
        Self::new(base_url, &secret)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// POST a JSON body and return the JSON response. Non-2xx is an error.
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let url = self.url(path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            bail!("Request to {} failed with status {}: {}", url, status, text);
        }
        serde_json::from_str(&text).with_context(|| format!("Invalid JSON from {}", url))
    }
}

pub fn superuser_payload(username: &str, password: &str) -> Value {
    json!({
        "username": username,
        "full_name": username,
        "password": password,
        "is_superuser": true,
    })
}

pub fn sample_post() -> Value {
    json!({
        "title": "Hello World",
        "content": "This is the content of my first post.",
    })
}

pub async fn create_superuser(args: &ServerArgs) -> Result<()> {
    let client = ApiClient::from_env(&args.base_url)?;

    info!("Superuser Creation");
    let username = Text::new("Superuser Username:")
        .prompt()
        .context("Failed to read username")?;
    let username = username.trim();
    if username.is_empty() {
        bail!("Username cannot be empty. Aborting.");
    }
    let password = Password::new("Superuser Password:")
        .without_confirmation()
        .prompt()
        .context("Failed to read password")?;
    if password.is_empty() {
        bail!("Password cannot be empty. Aborting.");
    }

    info!("Sending POST request to {} for user '{}'", client.url("/api/auth/users"), username);
    let created = client
        .post_json("/api/auth/users", &superuser_payload(username, &password))
        .await
        .context("Failed to create superuser")?;
    info!("Superuser created successfully! Response: {}", created);
    Ok(())
}

pub async fn populate_posts(args: &ServerArgs) -> Result<()> {
    let client = ApiClient::from_env(&args.base_url)?;
    create_sample_post(&client).await?;
    Ok(())
}

async fn create_sample_post(client: &ApiClient) -> Result<Value> {
    let post = sample_post();
    info!("Sending POST request to {} with data: {}", client.url("/api/blog/"), post);
    let created = client
        .post_json("/api/blog/", &post)
        .await
        .context("Failed to create post")?;
    info!("Post created successfully! Response: {}", created);
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{build_router, AppState};
    use crate::config::ProtectedSecret;
    use crate::db::create_test_pool;
    use crate::render::Renderer;

    const SECRET: &str = "Sup3rSecretKey";

    async fn spawn_server() -> (String, AppState) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();

        let mut config = Config::default();
        config.debug = true;
        config.security.secret_key = Some(ProtectedSecret::new(SECRET).unwrap());
        let state = AppState::new(pool, &config, Renderer::new(None).unwrap());
        let app = build_router(state.clone(), &config);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), state)
    }

    #[test]
    fn test_url_joining() {
        let client = ApiClient::new("http://localhost:8000/", SECRET).unwrap();
        assert_eq!(client.url("/api/blog/"), "http://localhost:8000/api/blog/");
        assert_eq!(client.url("health"), "http://localhost:8000/health");
    }

    #[test]
    fn test_secret_must_be_header_safe() {
        assert!(ApiClient::new(DEFAULT_BASE_URL, "bad\nsecret").is_err());
    }

    #[test]
    fn test_superuser_payload() {
        let payload = superuser_payload("root", "password123");
        assert_eq!(payload["full_name"], "root");
        assert_eq!(payload["is_superuser"], true);
    }

    #[tokio::test]
    async fn test_sample_post_created_through_api() {
        let (base_url, state) = spawn_server().await;
        let client = ApiClient::new(&base_url, SECRET).unwrap();

        let created = create_sample_post(&client).await.unwrap();
        assert_eq!(created["title"], "Hello World");
        assert_eq!(created["post_status"], "DRAFT");
        assert_eq!(state.posts.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_superuser_created_through_api() {
        let (base_url, state) = spawn_server().await;
        let client = ApiClient::new(&base_url, SECRET).unwrap();

        let created = client
            .post_json("/api/auth/users", &superuser_payload("root", "password123"))
            .await
            .unwrap();
        assert_eq!(created["is_superuser"], true);
        let user = state.users.get_by_username("root").await.unwrap().unwrap();
        assert!(user.is_superuser);
    }

    #[tokio::test]
    async fn test_wrong_secret_is_rejected() {
        let (base_url, _) = spawn_server().await;
        let client = ApiClient::new(&base_url, "Wr0ngSecretKey").unwrap();

        let err = client.post_json("/api/blog/", &sample_post()).await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
