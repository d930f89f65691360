use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{error, info, Level};

use serialdesk::config::get_config;
use serialdesk::errors::{LicenseError, LicenseResult};
use serialdesk::server::{build_router, build_router_with_logging, AppState, Database};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("serialdesk_server failed: {e}");
        eprintln!("serialdesk_server failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> LicenseResult<()> {
    let config = get_config()?;

    let level: Level = config
        .logging
        .level
        .parse()
        .map_err(|_| LicenseError::ConfigError(format!("bad log level: {}", config.logging.level)))?;
    tracing_subscriber::fmt().with_max_level(level).init();

    let db = Database::new().await?;
    db.ensure_schema().await?;

    let state = AppState::from_config(db, config)?;
    if state.inventory.is_enabled() {
        info!("Storefront sync enabled for shop {}", config.sellauth.shop_id);
    }
    if state.auth.enabled {
        info!("Panel credentials required on data endpoints");
    }

    let app = if config.logging.enabled {
        build_router_with_logging(state)
    } else {
        build_router(state)
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| LicenseError::ConfigError(format!("invalid server address: {e}")))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| LicenseError::ConfigError(format!("failed to bind {addr}: {e}")))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| LicenseError::ConfigError(format!("server error: {e}")))
}
