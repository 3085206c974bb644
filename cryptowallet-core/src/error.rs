//! Core error types.

use thiserror::Error;

/// Errors from the account service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    #[error("There is already an account with username '{0}'. Try with another one!")]
    UsernameTaken(String),

    #[error("There is no such registered user in the system!")]
    UserNotFound(String),

    #[error("The password is incorrect!")]
    WrongPassword,

    #[error("invalid credentials: {0}")]
    InvalidCredentials(&'static str),
}

/// Errors from the wallet ledger.
///
/// Every failing ledger operation leaves the wallet untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WalletError {
    #[error("The balance in the wallet ({balance:.2} USD) is lower than the desired amount to spend ({requested:.2} USD)!")]
    InsufficientFunds { balance: f64, requested: f64 },

    #[error("There is no asset with assetID '{0}'!")]
    InvalidAsset(String),

    #[error("There is no active investment in '{0}'!")]
    AssetNotHeld(String),

    #[error("There are no active investments in the wallet!")]
    NoActiveInvestments,

    #[error("amount must be a positive number of USD, got {0}")]
    InvalidAmount(f64),

    #[error("Market data is unavailable at the moment: {0}")]
    MarketUnavailable(String),

    #[error("no wallet for user '{0}'")]
    UnknownUser(String),
}

/// Errors from market data lookups and price sources.
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("There is no asset with assetID '{0}'!")]
    InvalidAsset(String),

    #[error("invalid offering: {0}")]
    InvalidOffering(String),

    #[error("the market data API key was rejected")]
    InvalidApiKey,

    #[error("market data request failed with HTTP status {0}")]
    Status(u16),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<MarketError> for WalletError {
    fn from(err: MarketError) -> Self {
        match err {
            MarketError::InvalidAsset(asset) => WalletError::InvalidAsset(asset),
            other => WalletError::MarketUnavailable(other.to_string()),
        }
    }
}

/// Errors from the on-disk user store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("data corruption: {0}")]
    Corruption(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_funds_message() {
        let err = WalletError::InsufficientFunds {
            balance: 5.0,
            requested: 40.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("5.00"));
        assert!(msg.contains("40.00"));
    }

    #[test]
    fn test_market_error_into_wallet_error() {
        let err: WalletError = MarketError::InvalidAsset("XYZ".to_string()).into();
        assert_eq!(err, WalletError::InvalidAsset("XYZ".to_string()));

        let err: WalletError = MarketError::Status(503).into();
        assert!(matches!(err, WalletError::MarketUnavailable(_)));
        assert!(!err.to_string().contains("assetID"));
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_account_error_display() {
        assert!(AccountError::UsernameTaken("alice".to_string())
            .to_string()
            .contains("alice"));
        assert_eq!(
            AccountError::WrongPassword.to_string(),
            "The password is incorrect!"
        );
    }
}
