use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use shoal_arena_server::config::ServerConfig;
use shoal_arena_server::game::constants::mask::FOOD_KEY;
use shoal_arena_server::game::mask::MaskLibrary;
use shoal_arena_server::game::state::GameState;
use shoal_arena_server::metrics::{self, Metrics};
use shoal_arena_server::net::game_session::GameSession;
use shoal_arena_server::net::transport::WebTransportServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Shoal Arena Server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    config.validate()?;
    let game_config = config.game_config()?;
    game_config.validate()?;
    info!(
        "Configuration loaded: {}:{}, max_players={}, map {}",
        config.bind_address, config.port, config.max_players, game_config.world.map_size
    );

    // Variant masks are decoded up front; later misses load in the background
    let mut masks = MaskLibrary::with_assets(config.asset_dir.clone(), game_config.mask);
    let mut keys: Vec<&str> = game_config
        .progression
        .variants
        .iter()
        .map(|v| v.key.as_str())
        .collect();
    keys.push(FOOD_KEY);
    masks.preload(&keys);

    let metrics = Arc::new(Metrics::new());
    let metrics_clone = metrics.clone();
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    let state = GameState::new(game_config, masks);
    let session = Arc::new(RwLock::new(GameSession::new(state, config.max_players, metrics)));
    let server = WebTransportServer::new(config.clone(), session).await?;

    info!("Server ready on https://{}", server.bind_addr());
    info!(
        "Chrome flag: --ignore-certificate-errors-spki-list={}",
        server.cert_hash()
    );

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => error!("Failed to listen for shutdown signal: {}", e),
            }
        }
    }

    info!("Server stopped");
    Ok(())
}
