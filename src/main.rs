//! Tower Duel Server
//!
//! Runs the WebSocket room server until Ctrl-C.

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use tower_duel::{GameServer, ServerConfig, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    let config = ServerConfig::from_env().context("invalid configuration")?;

    info!("Tower Duel Server v{}", VERSION);
    info!("Tower: {} layers x {} blocks", config.game.layers, config.game.blocks_per_layer);
    if let Some(seed) = config.rng_seed {
        info!("Fixed RNG seed: {}", seed);
    }

    let server = GameServer::new(config);

    tokio::select! {
        result = server.run() => {
            result.context("server stopped")?;
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Shutting down");
            server.shutdown();
        }
    }

    Ok(())
}
