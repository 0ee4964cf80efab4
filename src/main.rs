use fulfillment_backend::{
    api::{self, AppState},
    config::Config,
    database::{self, transaction::PgTransactionManager, PoolConfig},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    init_tracing(config.is_production());

    tracing::info!("Starting fulfillment backend");
    tracing::info!("Environment: {}", config.server.environment);

    let pool_config = PoolConfig {
        max_connections: config.database.max_connections,
        min_connections: config.database.max_connections.min(5),
        connection_timeout: Duration::from_secs(config.database.acquire_timeout_secs),
        ..PoolConfig::default()
    };
    let pool = database::init_pool(&config.database.url, Some(pool_config)).await?;
    database::run_migrations(&pool).await?;

    let store = Arc::new(PgTransactionManager::new(pool, config.storage_timeout()));
    let app = api::router(AppState::new(store, &config));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fulfillment_backend=info,tower_http=info"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}
