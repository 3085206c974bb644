//! Market data: priced offerings and the shared catalog.

use crate::error::MarketError;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A priced asset that can be bought.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offering {
    pub asset_id: String,
    pub name: String,
    /// USD per unit.
    pub price: f64,
}

impl Offering {
    /// Creates a validated offering.
    pub fn new(
        asset_id: impl Into<String>,
        name: impl Into<String>,
        price: f64,
    ) -> Result<Self, MarketError> {
        let asset_id = asset_id.into();
        if asset_id.trim().is_empty() {
            return Err(MarketError::InvalidOffering("asset id cannot be blank".to_string()));
        }
        if !price.is_finite() || price <= 0.0 {
            return Err(MarketError::InvalidOffering(format!(
                "price of {} must be positive, got {}",
                asset_id, price
            )));
        }

        Ok(Self {
            asset_id,
            name: name.into(),
            price,
        })
    }
}

/// Read access to current asset prices.
pub trait MarketData: Send + Sync {
    /// Returns all offerings, ordered by asset id.
    fn list_offerings(&self) -> Vec<Offering>;

    /// Looks up a single offering.
    fn offering(&self, asset_id: &str) -> Result<Offering, MarketError>;
}

/// The current set of offerings, shared between the server and the refresher.
#[derive(Default)]
pub struct AssetCatalog {
    offerings: RwLock<BTreeMap<String, Offering>>,
    updated_at: RwLock<Option<DateTime<Utc>>>,
}

impl AssetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_offerings(offerings: impl IntoIterator<Item = Offering>) -> Self {
        let catalog = Self::new();
        catalog.replace(offerings);
        catalog
    }

    /// Swaps in a new set of offerings as a single update.
    pub fn replace(&self, offerings: impl IntoIterator<Item = Offering>) {
        let map: BTreeMap<String, Offering> = offerings
            .into_iter()
            .map(|o| (o.asset_id.clone(), o))
            .collect();
        *self.offerings.write() = map;
        *self.updated_at.write() = Some(Utc::now());
    }

    pub fn len(&self) -> usize {
        self.offerings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.offerings.read().is_empty()
    }

    /// When the catalog was last replaced.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        *self.updated_at.read()
    }
}

impl MarketData for AssetCatalog {
    fn list_offerings(&self) -> Vec<Offering> {
        self.offerings.read().values().cloned().collect()
    }

    fn offering(&self, asset_id: &str) -> Result<Offering, MarketError> {
        self.offerings
            .read()
            .get(asset_id)
            .cloned()
            .ok_or_else(|| MarketError::InvalidAsset(asset_id.to_string()))
    }
}
