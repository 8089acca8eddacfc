use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use docshare::config::AppConfig;
use docshare::db;
use docshare::repo::PgStore;
use docshare::routes::create_router;
use docshare::state::AppState;
use docshare::storage::LocalBlobStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "server",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        server_host = %config.server_host,
        server_port = config.server_port,
        blob_storage_root = %config.blob_storage_root.display(),
        session_ttl_hours = config.session_ttl_hours,
        cache_ttl_seconds = config.cache_ttl_seconds,
        "loaded configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    if config.run_migrations {
        let migration_pool = pool.clone();
        let applied = tokio::task::spawn_blocking(move || db::run_migrations(&migration_pool))
            .await
            .context("migration task panicked")??;
        tracing::info!(applied, "database migrations complete");
    }

    let blobs = LocalBlobStore::new(&config.blob_storage_root)
        .await
        .with_context(|| {
            format!(
                "failed to prepare blob storage at {}",
                config.blob_storage_root.display()
            )
        })?;

    let listen_addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .context("SERVER_HOST/SERVER_PORT do not form a socket address")?;

    let state = AppState::new(config, Arc::new(PgStore::new(pool)), Arc::new(blobs));
    let router = create_router(state);

    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!("listening on {}", listen_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown signal received");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
