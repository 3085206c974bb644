//! cryptowallet - crypto wallet server
//!
//! A TCP server where clients register, log in, deposit money and trade
//! crypto assets at current market prices over a line-oriented protocol.

use cryptowallet_core::{
    AssetCatalog, CatalogRefresher, CoinApiSource, Ledger, PriceSource, StaticPriceSource,
    UserStore,
};
use cryptowallet_server::{
    run_console, Config, PriceSourceKind, Server, ServerConfig, ServerError, Services,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if CRYPTOWALLET_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };
    if let Ok(path) = std::env::var("CRYPTOWALLET_CONFIG") {
        tracing::info!("Loaded config from {}", path);
    }

    tracing::info!("Starting cryptowallet server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Max connections: {}", config.network.max_connections);
    tracing::info!("  Users file: {}", config.storage.users_file.display());

    let store = Arc::new(UserStore::open(&config.storage.users_file)?);
    tracing::info!("  Registered users: {}", store.user_count());

    // Market data
    let source: Arc<dyn PriceSource> = match config.market.source {
        PriceSourceKind::Static => {
            Arc::new(StaticPriceSource::new(config.market.static_offerings()?))
        }
        PriceSourceKind::CoinApi => {
            let api_key = config
                .market
                .api_key()
                .ok_or_else(|| ServerError::Config("coinapi source needs an api key".to_string()))?;
            Arc::new(
                CoinApiSource::new(api_key)
                    .with_base_url(config.market.base_url.as_str())
                    .with_max_assets(config.market.max_assets),
            )
        }
    };
    tracing::info!(
        "  Market source: {} (refresh every {}s)",
        source.name(),
        config.market.refresh_interval_secs
    );

    let catalog = Arc::new(AssetCatalog::new());
    let refresher = Arc::new(CatalogRefresher::new(
        catalog.clone(),
        source,
        config.market.refresh_interval(),
    ));
    let refresher_handle = {
        let refresher = refresher.clone();
        tokio::spawn(async move {
            refresher.run().await;
        })
    };

    let ledger = Arc::new(Ledger::new(store.clone(), catalog.clone()));
    let services = Services::new(store.clone(), ledger, catalog);
    let server = Arc::new(Server::new(ServerConfig::from(&config.network), services));

    // Operator console
    tokio::spawn(run_console(server.clone()));

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Run server (blocks until shutdown)
    let result = server.run().await;

    refresher.shutdown();
    let _ = refresher_handle.await;

    // Persist users even if the server failed
    if let Err(e) = store.save() {
        tracing::error!("Failed to save users on shutdown: {}", e);
    }

    let stats = server.stats().snapshot();
    tracing::info!(
        "Served {} connections, {} requests ({} errors)",
        stats.connections_total,
        stats.requests_total,
        stats.errors_total
    );

    match result {
        Ok(()) | Err(ServerError::ShuttingDown) => {
            tracing::info!("Server stopped");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Server error: {}", e);
            Err(e.into())
        }
    }
}
