use std::{net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;
use tracing::{info, warn};
use voice_core::VoiceCloner;
use voice_server::{config::ServerConfig, router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting voice cloning server...");

    let config = ServerConfig::from_env();
    info!(
        "Server configuration loaded: port={}, rate_limit={}/min, timeout={}s, audio_dir={}",
        config.port,
        config.rate_limit_per_minute,
        config.request_timeout_secs,
        config.audio_dir.display()
    );

    // Reference decoding and resampling are CPU bound
    let options = config.cloner_options();
    let cloner = Arc::new(tokio::task::spawn_blocking(move || VoiceCloner::initialize(options)).await?);
    if !cloner.is_ready() {
        warn!("Serving in initializing state; synthesis requests will be rejected");
    }

    let state = AppState::new(cloner, config.clone());
    let app = router(state)?;

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
