//! Price sources and the background catalog refresher.

use crate::error::MarketError;
use crate::market::{AssetCatalog, Offering};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Default CoinAPI REST endpoint.
pub const COINAPI_BASE_URL: &str = "https://rest.coinapi.io";

/// Default upper bound on the number of assets kept from a fetch.
pub const DEFAULT_MAX_ASSETS: usize = 50;

/// Something that can produce a fresh list of offerings.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<Vec<Offering>, MarketError>;
}

/// A fixed list of offerings, usually from configuration.
pub struct StaticPriceSource {
    offerings: Vec<Offering>,
}

impl StaticPriceSource {
    pub fn new(offerings: Vec<Offering>) -> Self {
        Self { offerings }
    }
}

#[async_trait]
impl PriceSource for StaticPriceSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> Result<Vec<Offering>, MarketError> {
        Ok(self.offerings.clone())
    }
}

/// An asset as returned by `GET /v1/assets`.
#[derive(Debug, Clone, Deserialize)]
pub struct CoinApiAsset {
    pub asset_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub type_is_crypto: u8,
    #[serde(default)]
    pub price_usd: Option<f64>,
}

/// Fetches prices from the CoinAPI REST API.
pub struct CoinApiSource {
    client: Client,
    base_url: String,
    api_key: String,
    max_assets: usize,
}

impl CoinApiSource {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: COINAPI_BASE_URL.to_string(),
            api_key: api_key.into(),
            max_assets: DEFAULT_MAX_ASSETS,
        }
    }

    /// Overrides the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_assets(mut self, max_assets: usize) -> Self {
        self.max_assets = max_assets;
        self
    }
}

/// Keeps priced crypto assets, at most `max_assets` of them.
pub fn offerings_from_assets(assets: Vec<CoinApiAsset>, max_assets: usize) -> Vec<Offering> {
    assets
        .into_iter()
        .filter(|asset| asset.type_is_crypto == 1)
        .filter_map(|asset| {
            let price = asset.price_usd?;
            let name = asset.name.unwrap_or_else(|| asset.asset_id.clone());
            Offering::new(asset.asset_id, name, price).ok()
        })
        .take(max_assets)
        .collect()
}

#[async_trait]
impl PriceSource for CoinApiSource {
    fn name(&self) -> &str {
        "coinapi"
    }

    async fn fetch(&self) -> Result<Vec<Offering>, MarketError> {
        let url = format!("{}/v1/assets", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("apikey", self.api_key.as_str())])
            .timeout(Duration::from_secs(30))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(MarketError::InvalidApiKey);
        }
        if !status.is_success() {
            return Err(MarketError::Status(status.as_u16()));
        }

        let assets = response.json::<Vec<CoinApiAsset>>().await?;
        Ok(offerings_from_assets(assets, self.max_assets))
    }
}

/// Periodically replaces the catalog with a fresh fetch.
pub struct CatalogRefresher {
    catalog: Arc<AssetCatalog>,
    source: Arc<dyn PriceSource>,
    interval: Duration,
    refreshes: AtomicU64,
    failures: AtomicU64,
    shutdown: AtomicBool,
    notify: Notify,
}

impl CatalogRefresher {
    pub fn new(catalog: Arc<AssetCatalog>, source: Arc<dyn PriceSource>, interval: Duration) -> Self {
        Self {
            catalog,
            source,
            interval,
            refreshes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Fetches once and replaces the catalog, returning the offering count.
    ///
    /// On failure, and on an empty fetch, the previous catalog is kept.
    pub async fn refresh_once(&self) -> Result<usize, MarketError> {
        let result = self.source.fetch().await;
        let offerings = match result {
            Ok(offerings) => offerings,
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        if offerings.is_empty() {
            tracing::warn!(
                "Price source '{}' returned no offerings, keeping {} cached",
                self.source.name(),
                self.catalog.len()
            );
            return Ok(0);
        }

        let count = offerings.len();
        self.catalog.replace(offerings);
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        Ok(count)
    }

    /// Runs the refresh loop (call from a background task).
    ///
    /// Fetches immediately, then once per interval until [`shutdown`](Self::shutdown).
    pub async fn run(&self) {
        tracing::info!(
            "Catalog refresher started (source={}, interval={}s)",
            self.source.name(),
            self.interval.as_secs()
        );

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            match self.refresh_once().await {
                Ok(count) => tracing::info!("Catalog refreshed with {} offerings", count),
                Err(e) => tracing::warn!("Catalog refresh failed: {}", e),
            }

            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::info!("Catalog refresher stopped");
    }

    /// Signals the refresher to stop.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.notify.notify_one();
    }

    pub fn stats(&self) -> RefresherStats {
        RefresherStats {
            refreshes: self.refreshes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            offerings: self.catalog.len(),
        }
    }
}

/// Refresher statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefresherStats {
    pub refreshes: u64,
    pub failures: u64,
    pub offerings: usize,
}
