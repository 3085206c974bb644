//! Builds validated commands from tokenized requests.

use crate::command::{Command, Services, Verb};
use crate::error::CommandError;
use crate::session::Session;

const OFFERING_FLAG: &str = "--offering=";
const MONEY_FLAG: &str = "--money=";

/// A command bound to the session it will run against.
///
/// `execute` consumes the binding, so a command runs at most once.
pub struct BoundCommand<'a> {
    command: Command,
    session: &'a mut Session,
    services: &'a Services,
}

impl<'a> BoundCommand<'a> {
    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn execute(self) -> Result<String, CommandError> {
        self.command.execute(self.session, self.services)
    }
}

/// Turns `(verb, args)` into commands.
///
/// Built once at startup; holds the collaborators every command shares.
pub struct CommandFactory {
    services: Services,
}

impl CommandFactory {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Validates a request and binds the resulting command to `session`.
    pub fn create<'a>(
        &'a self,
        verb: &str,
        args: &[String],
        session: &'a mut Session,
    ) -> Result<BoundCommand<'a>, CommandError> {
        let command = Self::parse(verb, args)?;
        Ok(BoundCommand {
            command,
            session,
            services: &self.services,
        })
    }

    /// Validates a request without binding it.
    ///
    /// Checks run in order: verb, argument count, argument values.
    pub fn parse(verb: &str, args: &[String]) -> Result<Command, CommandError> {
        let verb = Verb::parse(verb).ok_or_else(|| CommandError::UnknownCommand(verb.to_string()))?;

        if args.len() != verb.arity() {
            return Err(CommandError::ArgumentCountMismatch {
                command: verb.as_str(),
                expected: verb.arity(),
                actual: args.len(),
                usage: verb.usage(),
            });
        }

        let command = match verb {
            Verb::Register => Command::Register {
                username: args[0].clone(),
                password: args[1].clone(),
            },
            Verb::Login => Command::Login {
                username: args[0].clone(),
                password: args[1].clone(),
            },
            Verb::Logout => Command::Logout,
            Verb::DepositMoney => Command::DepositMoney {
                amount: parse_amount(verb, &args[0])?,
            },
            Verb::WithdrawMoney => Command::WithdrawMoney {
                amount: parse_amount(verb, &args[0])?,
            },
            Verb::ListOfferings => Command::ListOfferings,
            Verb::Buy => {
                let asset_id = flag_value(verb, &args[0], OFFERING_FLAG)?;
                let amount = flag_value(verb, &args[1], MONEY_FLAG)?;
                Command::Buy {
                    asset_id: asset_id.to_string(),
                    amount: parse_amount(verb, amount)?,
                }
            }
            Verb::Sell => Command::Sell {
                asset_id: flag_value(verb, &args[0], OFFERING_FLAG)?.to_string(),
            },
            Verb::GetWalletSummary => Command::GetWalletSummary,
            Verb::GetWalletOverallSummary => Command::GetWalletOverallSummary,
            Verb::Disconnect => Command::Disconnect,
            Verb::Help => Command::Help,
        };

        Ok(command)
    }
}

fn invalid(verb: Verb, reason: impl Into<String>) -> CommandError {
    CommandError::InvalidArgument {
        command: verb.as_str(),
        reason: reason.into(),
    }
}

/// Parses a USD amount: a finite decimal greater than zero.
fn parse_amount(verb: Verb, raw: &str) -> Result<f64, CommandError> {
    let amount: f64 = raw
        .parse()
        .map_err(|_| invalid(verb, format!("'{}' is not a valid amount", raw)))?;

    if !amount.is_finite() {
        return Err(invalid(verb, format!("'{}' is not a valid amount", raw)));
    }
    if amount <= 0.0 {
        return Err(invalid(verb, "the amount must be greater than 0 USD"));
    }
    Ok(amount)
}

/// Strips an exact `--name=` prefix and returns the non-empty value.
fn flag_value<'v>(verb: Verb, raw: &'v str, prefix: &str) -> Result<&'v str, CommandError> {
    let value = raw
        .strip_prefix(prefix)
        .ok_or_else(|| invalid(verb, format!("expected {}<value>, got '{}'", prefix, raw)))?;

    if value.is_empty() {
        return Err(invalid(verb, format!("{} needs a value", prefix.trim_end_matches('='))));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing;
    use crate::session::ConnectionId;
    use cryptowallet_core::AccountService;
    use cryptowallet_protocol::ErrorCode;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_unknown_verb() {
        assert_eq!(
            CommandFactory::parse("fly", &[]),
            Err(CommandError::UnknownCommand("fly".to_string()))
        );
        // Unknown verb wins over a bad argument count
        assert_eq!(
            CommandFactory::parse("Help", &args(&["x"])).unwrap_err().error_code(),
            ErrorCode::UnknownCommand
        );
    }

    #[test]
    fn test_arity_is_total() {
        let samples: Vec<String> = args(&["a", "b", "c", "d"]);
        for verb in Verb::ALL {
            for count in 0..=4 {
                if count == verb.arity() {
                    continue;
                }
                let err = CommandFactory::parse(verb.as_str(), &samples[..count]).unwrap_err();
                assert_eq!(
                    err,
                    CommandError::ArgumentCountMismatch {
                        command: verb.as_str(),
                        expected: verb.arity(),
                        actual: count,
                        usage: verb.usage(),
                    },
                    "{} with {} args",
                    verb.as_str(),
                    count
                );
            }
        }
    }

    #[test]
    fn test_zero_arg_verbs() {
        assert_eq!(CommandFactory::parse("logout", &[]), Ok(Command::Logout));
        assert_eq!(CommandFactory::parse("help", &[]), Ok(Command::Help));
        assert_eq!(
            CommandFactory::parse("get-wallet-overall-summary", &[]),
            Ok(Command::GetWalletOverallSummary)
        );
    }

    #[test]
    fn test_credentials() {
        assert_eq!(
            CommandFactory::parse("register", &args(&["alice", "pw1"])),
            Ok(Command::Register {
                username: "alice".to_string(),
                password: "pw1".to_string(),
            })
        );
    }

    #[test]
    fn test_amounts() {
        assert_eq!(
            CommandFactory::parse("deposit-money", &args(&["12.5"])),
            Ok(Command::DepositMoney { amount: 12.5 })
        );
        assert_eq!(
            CommandFactory::parse("withdraw-money", &args(&["3"])),
            Ok(Command::WithdrawMoney { amount: 3.0 })
        );

        for bad in ["abc", "0", "-5", "NaN", "inf", "-0", "1,5"] {
            let err = CommandFactory::parse("deposit-money", &args(&[bad])).unwrap_err();
            assert_eq!(err.error_code(), ErrorCode::InvalidArgument, "amount {bad}");
        }
    }

    #[test]
    fn test_buy_flags() {
        assert_eq!(
            CommandFactory::parse("buy", &args(&["--offering=BTC", "--money=10"])),
            Ok(Command::Buy {
                asset_id: "BTC".to_string(),
                amount: 10.0,
            })
        );

        let bad_cases = [
            ["--money=10", "--offering=BTC"],
            ["--offering=", "--money=10"],
            ["--offering=BTC", "--money="],
            ["--offering=BTC", "--money=-1"],
            ["offering=BTC", "--money=10"],
            ["--offeringBTC", "--money=10"],
            ["--OFFERING=BTC", "--money=10"],
        ];
        for case in bad_cases {
            let err = CommandFactory::parse("buy", &args(&case)).unwrap_err();
            assert_eq!(err.error_code(), ErrorCode::InvalidArgument, "{case:?}");
        }
    }

    #[test]
    fn test_sell_flag() {
        assert_eq!(
            CommandFactory::parse("sell", &args(&["--offering=ETH"])),
            Ok(Command::Sell {
                asset_id: "ETH".to_string(),
            })
        );
        assert!(matches!(
            CommandFactory::parse("sell", &args(&["ETH"])),
            Err(CommandError::InvalidArgument { command: "sell", .. })
        ));
    }

    #[test]
    fn test_create_binds_session() {
        let (services, store, _) = testing::services();
        store.register("alice", "pw1").unwrap();
        let factory = CommandFactory::new(services);
        let mut session = Session::new(ConnectionId(3), "127.0.0.1:5000".parse().unwrap());

        let bound = factory
            .create("login", &args(&["alice", "pw1"]), &mut session)
            .unwrap();
        assert_eq!(bound.command().verb(), Verb::Login);
        bound.execute().unwrap();

        assert!(session.is_authenticated());
    }

    #[test]
    fn test_create_validation_failure_never_touches_session() {
        let (services, _, _) = testing::services();
        let factory = CommandFactory::new(services);
        let mut session = Session::new(ConnectionId(3), "127.0.0.1:5000".parse().unwrap());

        assert!(factory
            .create("disconnect", &args(&["now"]), &mut session)
            .is_err());
        assert!(!session.is_closing());
    }
}
