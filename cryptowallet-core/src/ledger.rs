//! Wallet operations over the user store and market data.

use crate::account::{UserRef, UserStore};
use crate::error::WalletError;
use crate::market::MarketData;
use crate::wallet::{Investment, OverallSummary, WalletSummary};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Money and asset operations on a user's wallet.
///
/// Every failing call leaves the wallet exactly as it was.
pub trait WalletService: Send + Sync {
    fn deposit(&self, user: &UserRef, amount: f64) -> Result<(), WalletError>;

    fn withdraw(&self, user: &UserRef, amount: f64) -> Result<(), WalletError>;

    /// Spends `amount` USD on an asset at its current price, returning the
    /// quantity bought.
    fn buy(&self, user: &UserRef, asset_id: &str, amount: f64) -> Result<f64, WalletError>;

    /// Sells the whole holding of an asset at its current price, returning the
    /// USD proceeds credited to the balance.
    fn sell(&self, user: &UserRef, asset_id: &str) -> Result<f64, WalletError>;

    fn summary(&self, user: &UserRef) -> Result<WalletSummary, WalletError>;

    fn overall_summary(&self, user: &UserRef) -> Result<OverallSummary, WalletError>;
}

/// [`WalletService`] backed by a [`UserStore`] and a price feed.
pub struct Ledger {
    store: Arc<UserStore>,
    market: Arc<dyn MarketData>,
}

impl Ledger {
    pub fn new(store: Arc<UserStore>, market: Arc<dyn MarketData>) -> Self {
        Self { store, market }
    }
}

impl WalletService for Ledger {
    fn deposit(&self, user: &UserRef, amount: f64) -> Result<(), WalletError> {
        self.store.update_wallet(user, |wallet| wallet.deposit(amount))
    }

    fn withdraw(&self, user: &UserRef, amount: f64) -> Result<(), WalletError> {
        self.store.update_wallet(user, |wallet| wallet.withdraw(amount))
    }

    fn buy(&self, user: &UserRef, asset_id: &str, amount: f64) -> Result<f64, WalletError> {
        let offering = self.market.offering(asset_id)?;
        let quantity = amount / offering.price;

        self.store.update_wallet(user, |wallet| {
            wallet.withdraw(amount)?;
            wallet.add_investment(Investment::new(asset_id, quantity, offering.price))?;
            Ok(quantity)
        })
    }

    fn sell(&self, user: &UserRef, asset_id: &str) -> Result<f64, WalletError> {
        let offering = self.market.offering(asset_id)?;

        self.store.update_wallet(user, |wallet| {
            let quantity = wallet.remove_investment(asset_id)?;
            let proceeds = quantity * offering.price;
            wallet.deposit(proceeds)?;
            Ok(proceeds)
        })
    }

    fn summary(&self, user: &UserRef) -> Result<WalletSummary, WalletError> {
        self.store
            .wallet(user)
            .map(|wallet| wallet.summary())
            .ok_or_else(|| WalletError::UnknownUser(user.username().to_string()))
    }

    fn overall_summary(&self, user: &UserRef) -> Result<OverallSummary, WalletError> {
        let wallet = self
            .store
            .wallet(user)
            .ok_or_else(|| WalletError::UnknownUser(user.username().to_string()))?;

        if wallet.holdings().is_empty() {
            return Err(WalletError::NoActiveInvestments);
        }

        let mut per_asset = BTreeMap::new();
        for (asset_id, quantity) in wallet.holdings() {
            let offering = self.market.offering(asset_id)?;
            let current_value = quantity * offering.price;
            per_asset.insert(asset_id.clone(), current_value - wallet.invested_in(asset_id));
        }

        Ok(OverallSummary::from_assets(per_asset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountService;
    use crate::error::MarketError;
    use crate::market::{AssetCatalog, Offering};

    fn setup() -> (Arc<UserStore>, Arc<AssetCatalog>, Ledger, UserRef) {
        let store = Arc::new(UserStore::in_memory());
        store.register("alice", "pw1").unwrap();
        let catalog = Arc::new(AssetCatalog::with_offerings(vec![
            Offering::new("BTC", "Bitcoin", 20.0).unwrap(),
            Offering::new("ETH", "Ethereum", 4.0).unwrap(),
        ]));
        let ledger = Ledger::new(store.clone(), catalog.clone());
        (store, catalog, ledger, UserRef::new("alice"))
    }

    #[test]
    fn test_buy_at_current_price() {
        let (store, _, ledger, user) = setup();
        ledger.deposit(&user, 100.0).unwrap();

        let quantity = ledger.buy(&user, "BTC", 40.0).unwrap();
        assert_eq!(quantity, 2.0);

        let wallet = store.wallet(&user).unwrap();
        assert_eq!(wallet.balance(), 60.0);
        assert_eq!(wallet.holdings().get("BTC"), Some(&2.0));
    }

    #[test]
    fn test_buy_failures_leave_wallet_unchanged() {
        let (store, _, ledger, user) = setup();
        ledger.deposit(&user, 5.0).unwrap();
        let before = store.wallet(&user).unwrap();

        assert!(matches!(
            ledger.buy(&user, "BTC", 10.0),
            Err(WalletError::InsufficientFunds { .. })
        ));
        assert_eq!(
            ledger.buy(&user, "XYZ", 1.0),
            Err(WalletError::InvalidAsset("XYZ".to_string()))
        );
        assert_eq!(store.wallet(&user).unwrap(), before);
    }

    struct Outage;

    impl MarketData for Outage {
        fn list_offerings(&self) -> Vec<Offering> {
            Vec::new()
        }

        fn offering(&self, _asset_id: &str) -> Result<Offering, MarketError> {
            Err(MarketError::Status(503))
        }
    }

    #[test]
    fn test_market_outage_is_not_an_invalid_asset() {
        let (store, _, _, user) = setup();
        let ledger = Ledger::new(store.clone(), Arc::new(Outage));
        ledger.deposit(&user, 50.0).unwrap();
        let before = store.wallet(&user).unwrap();

        let err = ledger.buy(&user, "BTC", 10.0).unwrap_err();
        assert!(matches!(err, WalletError::MarketUnavailable(_)), "{err:?}");
        assert_eq!(store.wallet(&user).unwrap(), before);
    }

    #[test]
    fn test_sell_credits_proceeds() {
        let (store, catalog, ledger, user) = setup();
        ledger.deposit(&user, 40.0).unwrap();
        ledger.buy(&user, "BTC", 40.0).unwrap();

        catalog.replace(vec![Offering::new("BTC", "Bitcoin", 30.0).unwrap()]);
        let proceeds = ledger.sell(&user, "BTC").unwrap();
        assert_eq!(proceeds, 60.0);

        let wallet = store.wallet(&user).unwrap();
        assert_eq!(wallet.balance(), 60.0);
        assert!(wallet.holdings().is_empty());
    }

    #[test]
    fn test_sell_not_held() {
        let (store, _, ledger, user) = setup();
        ledger.deposit(&user, 10.0).unwrap();
        let before = store.wallet(&user).unwrap();

        assert_eq!(
            ledger.sell(&user, "ETH"),
            Err(WalletError::AssetNotHeld("ETH".to_string()))
        );
        assert_eq!(
            ledger.sell(&user, "XYZ"),
            Err(WalletError::InvalidAsset("XYZ".to_string()))
        );
        assert_eq!(store.wallet(&user).unwrap(), before);
    }

    #[test]
    fn test_sequential_deposits() {
        let (_, _, ledger, user) = setup();
        let n = 50u32;
        for i in 1..=n {
            ledger.deposit(&user, f64::from(i)).unwrap();
        }
        let summary = ledger.summary(&user).unwrap();
        assert_eq!(summary.balance, f64::from(n * (n + 1) / 2));
    }

    #[test]
    fn test_overall_summary() {
        let (_, catalog, ledger, user) = setup();
        ledger.deposit(&user, 100.0).unwrap();
        ledger.buy(&user, "BTC", 40.0).unwrap();
        ledger.buy(&user, "ETH", 20.0).unwrap();

        catalog.replace(vec![
            Offering::new("BTC", "Bitcoin", 25.0).unwrap(),
            Offering::new("ETH", "Ethereum", 2.0).unwrap(),
        ]);

        let summary = ledger.overall_summary(&user).unwrap();
        assert_eq!(summary.per_asset.get("BTC"), Some(&10.0));
        assert_eq!(summary.per_asset.get("ETH"), Some(&-10.0));
        assert_eq!(summary.overall, 0.0);
    }

    #[test]
    fn test_overall_summary_without_investments() {
        let (_, _, ledger, user) = setup();
        assert_eq!(
            ledger.overall_summary(&user),
            Err(WalletError::NoActiveInvestments)
        );
    }

    #[test]
    fn test_unknown_user() {
        let (_, _, ledger, _) = setup();
        let ghost = UserRef::new("ghost");
        assert!(matches!(
            ledger.summary(&ghost),
            Err(WalletError::UnknownUser(_))
        ));
        assert!(matches!(
            ledger.deposit(&ghost, 1.0),
            Err(WalletError::UnknownUser(_))
        ));
    }
}
