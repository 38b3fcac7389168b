use courses_backend::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    repository::{self, RepositoryState, SqliteRepository},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Startup order: configuration, logging, database + migrations, services,
/// optional admin bootstrap, HTTP server.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise sensible local defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "courses_backend=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // JSON lines for log aggregation.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Database Initialization (SQLite) and schema migrations.
    let pool = repository::connect(&config.db_url, 5)
        .await
        .expect("FATAL: Failed to open the database. Check DATABASE_URL.");
    repository::migrate(&pool)
        .await
        .expect("FATAL: Failed to apply database migrations.");

    let repo = Arc::new(SqliteRepository::new(pool)) as RepositoryState;

    // 4. Unified State Assembly: both services share the one storage handle.
    let app_state = AppState::new(repo, config.clone())
        .expect("FATAL: Invalid token signing secret. Check JWT_SECRET.");

    // 5. Optional admin bootstrap.
    if let Some((username, password)) = config.admin_credentials() {
        match app_state.auth.ensure_admin(username, password).await {
            Ok(true) => tracing::info!(username, "Bootstrap admin account created"),
            Ok(false) => tracing::info!(username, "Bootstrap admin account already present"),
            Err(e) => panic!("FATAL: Failed to create the bootstrap admin account: {e}"),
        }
    }

    // 6. Router and Server Startup
    let app = create_router(app_state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener. Check BIND_ADDR.");

    tracing::info!("Listening on {}", config.bind_addr);
    tracing::info!("OpenAPI document available at /api-docs/openapi.json");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("FATAL: HTTP server error");

    tracing::info!("Server stopped");
}

/// Resolves on Ctrl+C so in-flight requests can finish.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
