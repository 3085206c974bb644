//! Wallet bookkeeping: balance, holdings and investment history.

use crate::error::WalletError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single purchase of an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investment {
    pub asset_id: String,
    pub quantity: f64,
    /// USD per unit at purchase time.
    pub price: f64,
    pub bought_at: DateTime<Utc>,
}

impl Investment {
    pub fn new(asset_id: impl Into<String>, quantity: f64, price: f64) -> Self {
        Self {
            asset_id: asset_id.into(),
            quantity,
            price,
            bought_at: Utc::now(),
        }
    }

    /// USD spent on this purchase.
    pub fn cost(&self) -> f64 {
        self.quantity * self.price
    }
}

/// A user's wallet.
///
/// Mutators validate before touching any field, so a returned error always
/// means the wallet is unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    balance: f64,
    /// asset_id -> quantity held in active investments
    holdings: BTreeMap<String, f64>,
    /// asset_id -> purchases that make up the holding
    investments: BTreeMap<String, Vec<Investment>>,
}

impl Wallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn holdings(&self) -> &BTreeMap<String, f64> {
        &self.holdings
    }

    pub fn investments(&self) -> &BTreeMap<String, Vec<Investment>> {
        &self.investments
    }

    pub fn deposit(&mut self, amount: f64) -> Result<(), WalletError> {
        check_amount(amount)?;
        self.balance += amount;
        Ok(())
    }

    pub fn withdraw(&mut self, amount: f64) -> Result<(), WalletError> {
        check_amount(amount)?;
        if self.balance < amount {
            return Err(WalletError::InsufficientFunds {
                balance: self.balance,
                requested: amount,
            });
        }
        self.balance -= amount;
        Ok(())
    }

    /// Records a purchase and adds its quantity to the holding.
    pub fn add_investment(&mut self, investment: Investment) -> Result<(), WalletError> {
        check_amount(investment.quantity)?;
        check_amount(investment.price)?;

        *self
            .holdings
            .entry(investment.asset_id.clone())
            .or_insert(0.0) += investment.quantity;
        self.investments
            .entry(investment.asset_id.clone())
            .or_default()
            .push(investment);
        Ok(())
    }

    /// Removes the whole holding of an asset, returning the quantity.
    pub fn remove_investment(&mut self, asset_id: &str) -> Result<f64, WalletError> {
        let quantity = self
            .holdings
            .remove(asset_id)
            .ok_or_else(|| WalletError::AssetNotHeld(asset_id.to_string()))?;
        self.investments.remove(asset_id);
        Ok(quantity)
    }

    /// Total USD spent on the active investments in an asset.
    pub fn invested_in(&self, asset_id: &str) -> f64 {
        self.investments
            .get(asset_id)
            .map(|list| list.iter().map(Investment::cost).sum())
            .unwrap_or(0.0)
    }

    pub fn summary(&self) -> WalletSummary {
        WalletSummary {
            balance: self.balance,
            holdings: self.holdings.clone(),
        }
    }
}

fn check_amount(amount: f64) -> Result<(), WalletError> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(WalletError::InvalidAmount(amount))
    }
}

/// Snapshot of balance and holdings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletSummary {
    pub balance: f64,
    pub holdings: BTreeMap<String, f64>,
}

impl fmt::Display for WalletSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Wallet Summary:")?;
        writeln!(f, "Current balance = {} USD", self.balance)?;
        if self.holdings.is_empty() {
            return writeln!(f, "There are no crypto holdings.");
        }
        for (asset_id, quantity) in &self.holdings {
            writeln!(f, "CryptoCurrency: {}, Current Quantity: {}", asset_id, quantity)?;
        }
        Ok(())
    }
}

/// Profit or loss of every active investment at current prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallSummary {
    pub overall: f64,
    pub per_asset: BTreeMap<String, f64>,
}

impl OverallSummary {
    pub fn from_assets(per_asset: BTreeMap<String, f64>) -> Self {
        Self {
            overall: per_asset.values().sum(),
            per_asset,
        }
    }
}

impl fmt::Display for OverallSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.overall > 0.0 {
            writeln!(f, "Your investments have grown! Current profit: {} USD", self.overall)?;
        } else if self.overall < 0.0 {
            writeln!(
                f,
                "Current loss: {} USD. Investing always carries risks! Be patient!",
                -self.overall
            )?;
        } else {
            writeln!(f, "No profit or loss at the moment. Your investments are safe!")?;
        }

        for (asset_id, delta) in &self.per_asset {
            if *delta > 0.0 {
                writeln!(f, "{}: Current profit: {} USD", asset_id, delta)?;
            } else if *delta < 0.0 {
                writeln!(f, "{}: Current loss: {} USD", asset_id, -delta)?;
            } else {
                writeln!(f, "{}: No profit or loss at the moment", asset_id)?;
            }
        }
        Ok(())
    }
}
