//! Material Ledger - Backend Server

use std::{net::SocketAddr, sync::Arc, time::Duration};

use material_ledger_backend::{
    config::{Config, StoreKind},
    create_app,
    store::{LedgerStore, MemoryLedgerStore, PgLedgerStore},
    AppState,
};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledger_server=debug,material_ledger_backend=debug,tower_http=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing::info!("Starting Material Ledger Server");
    tracing::info!("Environment: {}", config.environment);

    let store = connect_store(&config).await?;

    // Create application state
    let state = AppState {
        store,
        config: Arc::new(config.clone()),
    };

    // Build application
    let app = create_app(state);

    // Start server
    let ip = config.server.host.parse()?;
    let addr = SocketAddr::new(ip, config.server.port);
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the configured ledger store
async fn connect_store(config: &Config) -> anyhow::Result<Arc<dyn LedgerStore>> {
    let lock_timeout = config.ledger.lock_timeout();

    match config.ledger.store {
        StoreKind::Memory => {
            tracing::warn!("Using in-memory ledger store; state is lost on restart");
            Ok(Arc::new(MemoryLedgerStore::new(lock_timeout)))
        }
        StoreKind::Postgres => {
            tracing::info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .min_connections(config.database.min_connections)
                .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_secs))
                .connect(&config.database.url)
                .await?;

            tracing::info!("Database connection established");

            if config.database.run_migrations {
                tracing::info!("Running database migrations...");
                sqlx::migrate!("./migrations").run(&db_pool).await?;
                tracing::info!("Migrations completed");
            }

            Ok(Arc::new(PgLedgerStore::new(db_pool, lock_timeout)))
        }
    }
}
