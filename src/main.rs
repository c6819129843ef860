//! Blogstarter - a starter blog with a REST API and admin panel

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tokio::signal;

use blogstarter::{
    api::{self, AppState},
    config::Config,
    db::{self, migrations::run_migrations},
    logging,
    render::Renderer,
};

/// How often expired admin sessions are removed
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Load and check configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    config.validate()?;

    // Keep the guard alive so the file writer flushes on exit
    let _log_guard = logging::init(&config)?;
    tracing::info!("Starting Blogstarter v{}...", env!("CARGO_PKG_VERSION"));
    if !config.is_production() {
        tracing::warn!("Debug mode is on. CSRF, trusted host and HTTPS checks are disabled.");
    }

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    db::check_db_ready(&pool).await?;
    tracing::info!("Database connected: {:?}", pool.driver());

    let applied = run_migrations(&pool).await?;
    tracing::info!("Database migrations completed ({} applied)", applied);

    // Templates
    let renderer = Renderer::new(config.paths.templates.as_deref())
        .context("Failed to load templates")?;

    let state = AppState::new(pool.clone(), &config, renderer);

    // Purge expired sessions every hour
    {
        let auth = state.auth.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
            loop {
                interval.tick().await;
                match auth.purge_expired_sessions().await {
                    Ok(0) => {}
                    Ok(count) => tracing::info!("Purged {} expired session(s)", count),
                    Err(e) => tracing::warn!("Failed to purge expired sessions: {}", e),
                }
            }
        });
    }

    let app = api::build_router(state, &config);

    // Start server
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down, closing database pool");
    pool.close().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
