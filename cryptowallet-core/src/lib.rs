//! # cryptowallet-core
//!
//! Accounts, wallets and market data behind the cryptowallet server.
//!
//! The server only talks to the [`AccountService`], [`WalletService`] and
//! [`MarketData`] traits. This crate also provides their implementations:
//! - [`UserStore`]: users and wallets, persisted as one JSON file
//! - [`Ledger`]: deposit, withdraw, buy and sell over a user store
//! - [`AssetCatalog`]: current offerings, refreshed by a [`CatalogRefresher`]

pub mod account;
pub mod error;
pub mod ledger;
pub mod market;
pub mod source;
pub mod wallet;

pub use account::{hash_password, AccountService, UserRecord, UserRef, UserStore};
pub use error::{AccountError, MarketError, StoreError, WalletError};
pub use ledger::{Ledger, WalletService};
pub use market::{AssetCatalog, MarketData, Offering};
pub use source::{CatalogRefresher, CoinApiSource, PriceSource, RefresherStats, StaticPriceSource};
pub use wallet::{Investment, OverallSummary, Wallet, WalletSummary};
