use sacco_cms::{
    AppState,
    auth::bootstrap_admin,
    config::{AppConfig, Env},
    create_router,
    repository::{PostgresRepository, RepositoryState},
    schema::upload_folders,
    storage::{LocalStorage, StorageService, StorageState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Initializes configuration, logging, the database, upload storage, and the first
/// administrator, then serves HTTP.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging Filter Setup
    // RUST_LOG wins; otherwise debug for this crate and request logs from tower_http.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sacco_cms=debug,tower_http=info".into());

    // 3. Log format follows APP_ENV: pretty locally, JSON in production.
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. Database Initialization (Postgres)
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;
    repo.ensure_schema()
        .await
        .expect("FATAL: Failed to create database tables.");

    // 5. First administrator
    match &config.bootstrap_admin {
        Some(credentials) => {
            match bootstrap_admin(&repo, credentials)
                .await
                .expect("FATAL: Failed to create the bootstrap administrator.")
            {
                Some(admin) => tracing::warn!(
                    admin = %admin.username,
                    "created bootstrap administrator; change its password"
                ),
                None => tracing::debug!("administrators present, bootstrap skipped"),
            }
        }
        None => tracing::debug!("no bootstrap credentials configured"),
    }

    // 6. Upload Storage (local disk, served under /static/uploads)
    let local = LocalStorage::new(&config.upload_dir);
    local
        .ensure_folders(&upload_folders())
        .await
        .expect("FATAL: Failed to create upload folders. Check UPLOAD_DIR.");
    let storage = Arc::new(local) as StorageState;

    // 7. Router and Server Startup
    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState::new(repo, storage, config));

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind BIND_ADDR.");

    tracing::info!("Listening on {bind_addr}");
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server stopped unexpectedly.");
}
