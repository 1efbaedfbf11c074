use anyhow::Result;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use attendance::{build_state, config::AppConfig, create_router, open_store, open_tokens};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;

    // RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.filter))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting attendance service");

    let store = open_store(&config).await?;
    let tokens = open_tokens(&config).await?;
    let sweeper = tokens.spawn_sweeper(config.tokens.sweep_interval());
    let app_state = build_state(&config, store, tokens).await?;

    let app = create_router(app_state);

    let listener = TcpListener::bind(&config.server.bind).await?;
    info!("Attendance service listening on {}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    info!("Attendance service stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
