//! Commands and their execution.
//!
//! A [`Command`] only ever holds validated values (see the factory), so the
//! only way execution can fail is an unmet precondition or a collaborator
//! rejecting the operation. Both surface as [`CommandError::Unsuccessful`].

use crate::error::{CommandError, FailureReason};
use crate::session::Session;
use cryptowallet_core::{AccountService, MarketData, UserRef, WalletService};
use std::sync::Arc;

/// Command verbs understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Register,
    Login,
    Logout,
    DepositMoney,
    WithdrawMoney,
    ListOfferings,
    Buy,
    Sell,
    GetWalletSummary,
    GetWalletOverallSummary,
    Disconnect,
    Help,
}

/// Which sessions may run a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Only sessions with no logged-in user.
    Anonymous,
    /// Only sessions with a logged-in user.
    Authenticated,
    Any,
}

impl Verb {
    /// All verbs, in help order.
    pub const ALL: [Verb; 12] = [
        Verb::Register,
        Verb::Login,
        Verb::Logout,
        Verb::DepositMoney,
        Verb::WithdrawMoney,
        Verb::ListOfferings,
        Verb::Buy,
        Verb::Sell,
        Verb::GetWalletSummary,
        Verb::GetWalletOverallSummary,
        Verb::Disconnect,
        Verb::Help,
    ];

    /// Looks up a verb by its wire name. Matching is case-sensitive.
    pub fn parse(name: &str) -> Option<Verb> {
        Self::ALL.into_iter().find(|verb| verb.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Register => "register",
            Verb::Login => "login",
            Verb::Logout => "logout",
            Verb::DepositMoney => "deposit-money",
            Verb::WithdrawMoney => "withdraw-money",
            Verb::ListOfferings => "list-offerings",
            Verb::Buy => "buy",
            Verb::Sell => "sell",
            Verb::GetWalletSummary => "get-wallet-summary",
            Verb::GetWalletOverallSummary => "get-wallet-overall-summary",
            Verb::Disconnect => "disconnect",
            Verb::Help => "help",
        }
    }

    /// Exact number of arguments the verb takes.
    pub fn arity(&self) -> usize {
        match self {
            Verb::Register | Verb::Login | Verb::Buy => 2,
            Verb::DepositMoney | Verb::WithdrawMoney | Verb::Sell => 1,
            Verb::Logout
            | Verb::ListOfferings
            | Verb::GetWalletSummary
            | Verb::GetWalletOverallSummary
            | Verb::Disconnect
            | Verb::Help => 0,
        }
    }

    pub fn usage(&self) -> &'static str {
        match self {
            Verb::Register => "$ register <username> <password>",
            Verb::Login => "$ login <username> <password>",
            Verb::Logout => "$ logout",
            Verb::DepositMoney => "$ deposit-money <amount>",
            Verb::WithdrawMoney => "$ withdraw-money <amount>",
            Verb::ListOfferings => "$ list-offerings",
            Verb::Buy => "$ buy --offering=<assetID> --money=<amount>",
            Verb::Sell => "$ sell --offering=<assetID>",
            Verb::GetWalletSummary => "$ get-wallet-summary",
            Verb::GetWalletOverallSummary => "$ get-wallet-overall-summary",
            Verb::Disconnect => "$ disconnect",
            Verb::Help => "$ help",
        }
    }

    pub fn access(&self) -> Access {
        match self {
            Verb::Register | Verb::Login => Access::Anonymous,
            Verb::Disconnect | Verb::Help => Access::Any,
            _ => Access::Authenticated,
        }
    }
}

/// Returns the help text listing every command.
pub fn help_text() -> String {
    let mut text = String::from("You can choose from the following commands:\n");
    for verb in Verb::ALL {
        text.push_str(verb.usage());
        text.push('\n');
    }
    text.push_str(
        "Keep in mind that the commands should start with $ \
         and you have to be logged in to use the functionalities of the app.",
    );
    text
}

/// The collaborators commands run against.
#[derive(Clone)]
pub struct Services {
    pub accounts: Arc<dyn AccountService>,
    pub wallets: Arc<dyn WalletService>,
    pub market: Arc<dyn MarketData>,
}

impl Services {
    pub fn new(
        accounts: Arc<dyn AccountService>,
        wallets: Arc<dyn WalletService>,
        market: Arc<dyn MarketData>,
    ) -> Self {
        Self {
            accounts,
            wallets,
            market,
        }
    }
}

/// A validated request.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Register { username: String, password: String },
    Login { username: String, password: String },
    Logout,
    DepositMoney { amount: f64 },
    WithdrawMoney { amount: f64 },
    ListOfferings,
    Buy { asset_id: String, amount: f64 },
    Sell { asset_id: String },
    GetWalletSummary,
    GetWalletOverallSummary,
    Disconnect,
    Help,
}

impl Command {
    pub fn verb(&self) -> Verb {
        match self {
            Command::Register { .. } => Verb::Register,
            Command::Login { .. } => Verb::Login,
            Command::Logout => Verb::Logout,
            Command::DepositMoney { .. } => Verb::DepositMoney,
            Command::WithdrawMoney { .. } => Verb::WithdrawMoney,
            Command::ListOfferings => Verb::ListOfferings,
            Command::Buy { .. } => Verb::Buy,
            Command::Sell { .. } => Verb::Sell,
            Command::GetWalletSummary => Verb::GetWalletSummary,
            Command::GetWalletOverallSummary => Verb::GetWalletOverallSummary,
            Command::Disconnect => Verb::Disconnect,
            Command::Help => Verb::Help,
        }
    }

    /// Runs the command against `session`, returning the success text.
    ///
    /// Access is checked first, from [`Verb::access`]; when it fails no
    /// collaborator is called.
    pub fn execute(self, session: &mut Session, services: &Services) -> Result<String, CommandError> {
        let verb = self.verb();
        let caller = check_access(session, verb)?;

        match (self, caller) {
            (Command::Help, _) => Ok(help_text()),

            (Command::Disconnect, _) => {
                session.close();
                Ok("You have been disconnected from the server!".to_string())
            }

            (Command::Register { username, password }, _) => {
                services
                    .accounts
                    .register(&username, &password)
                    .map_err(|e| unsuccessful(verb, e))?;
                Ok("You have successfully registered in the system".to_string())
            }

            (Command::Login { username, password }, _) => {
                let user = services
                    .accounts
                    .login(&username, &password)
                    .map_err(|e| unsuccessful(verb, e))?;
                session.login(user);
                Ok(format!("You have successfully logged in as \"{}\"", username))
            }

            (Command::Logout, Some(_)) => {
                session.logout();
                Ok("You have successfully logged out!".to_string())
            }

            (Command::DepositMoney { amount }, Some(user)) => {
                services
                    .wallets
                    .deposit(&user, amount)
                    .map_err(|e| unsuccessful(verb, e))?;
                Ok(format!("You have successfully made a deposit of {} USD", amount))
            }

            (Command::WithdrawMoney { amount }, Some(user)) => {
                services
                    .wallets
                    .withdraw(&user, amount)
                    .map_err(|e| unsuccessful(verb, e))?;
                Ok(format!("You have successfully withdrawn {} USD", amount))
            }

            (Command::ListOfferings, Some(_)) => {
                let offerings = services.market.list_offerings();

                let mut text = String::from("Available Cryptocurrencies:");
                if offerings.is_empty() {
                    text.push_str("\nNo offerings are available at the moment.");
                }
                for offering in offerings {
                    text.push_str(&format!(
                        "\n{}, {}: {} USD",
                        offering.asset_id, offering.name, offering.price
                    ));
                }
                Ok(text)
            }

            (Command::Buy { asset_id, amount }, Some(user)) => {
                let quantity = services
                    .wallets
                    .buy(&user, &asset_id, amount)
                    .map_err(|e| unsuccessful(verb, e))?;
                Ok(format!("You have successfully bought {} of {}", quantity, asset_id))
            }

            (Command::Sell { asset_id }, Some(user)) => {
                let proceeds = services
                    .wallets
                    .sell(&user, &asset_id)
                    .map_err(|e| unsuccessful(verb, e))?;
                Ok(format!(
                    "You have successfully sold your {} for {} USD",
                    asset_id, proceeds
                ))
            }

            (Command::GetWalletSummary, Some(user)) => {
                let summary = services
                    .wallets
                    .summary(&user)
                    .map_err(|e| unsuccessful(verb, e))?;
                Ok(summary.to_string())
            }

            (Command::GetWalletOverallSummary, Some(user)) => {
                let summary = services
                    .wallets
                    .overall_summary(&user)
                    .map_err(|e| unsuccessful(verb, e))?;
                Ok(summary.to_string())
            }

            // Authenticated verbs without a caller never pass check_access
            (_, None) => Err(unsuccessful(verb, FailureReason::NotLoggedIn)),
        }
    }
}

fn unsuccessful(verb: Verb, reason: impl Into<FailureReason>) -> CommandError {
    CommandError::Unsuccessful {
        command: verb.as_str(),
        reason: reason.into(),
    }
}

/// Enforces the verb's [`Access`] rule and returns the logged-in user, if any.
fn check_access(session: &Session, verb: Verb) -> Result<Option<UserRef>, CommandError> {
    let user = session.user().cloned();
    match (verb.access(), user) {
        (Access::Anonymous, Some(_)) => Err(unsuccessful(verb, FailureReason::AlreadyLoggedIn)),
        (Access::Authenticated, None) => Err(unsuccessful(verb, FailureReason::NotLoggedIn)),
        (_, user) => Ok(user),
    }
}

/// Shared fixtures for the server's unit tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::Services;
    use cryptowallet_core::{AssetCatalog, Ledger, Offering, UserStore};
    use std::sync::Arc;

    /// In-memory services with BTC at 20 USD and ETH at 4 USD.
    pub fn services() -> (Services, Arc<UserStore>, Arc<AssetCatalog>) {
        let store = Arc::new(UserStore::in_memory());
        let catalog = Arc::new(AssetCatalog::with_offerings(vec![
            Offering::new("BTC", "Bitcoin", 20.0).unwrap(),
            Offering::new("ETH", "Ethereum", 4.0).unwrap(),
        ]));
        let ledger = Arc::new(Ledger::new(store.clone(), catalog.clone()));
        let services = Services::new(store.clone(), ledger, catalog.clone());
        (services, store, catalog)
    }
}
