//! `cp-broker` binary: load config, bind, serve until Ctrl+C.

use std::net::SocketAddr;

use anyhow::Context;
use cp_broker::AppState;
use cp_common::logging::{self, LogFormat};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    dotenvy::dotenv().ok();

    let config = cp_common::AppConfig::load().context("Failed to load configuration")?;
    logging::init(&config.log_level, LogFormat::Json);

    tracing::info!("Starting checkpoint realtime broker...");

    let addr: SocketAddr = format!("{}:{}", config.broker.host, config.broker.port)
        .parse()
        .context("Invalid broker host/port")?;

    let state = AppState::new(config);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    cp_broker::serve(listener, state, shutdown_signal()).await?;

    tracing::info!("Broker stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
