//! Which accounts can receive funds from a given account for a given action.

use crate::aggregator::{AccountAggregator, AggregateError};
use crate::tier_gate::TierGate;
use std::sync::Arc;
use tally_core::CurrencyType;
use tally_fi::{Account, AccountKind, Action};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolverError {
    #[error("{0} has no transaction targets")]
    UnsupportedAction(Action),
    #[error("cannot {action} from {kind} account {address}")]
    SourceNotCryptoCapable {
        action: Action,
        kind: AccountKind,
        address: String,
    },
}

/// Fails for actions that never have destination accounts, and for crypto
/// actions started from a fiat account.
pub fn check_supported(source: &Account, action: Action) -> Result<(), ResolverError> {
    match action {
        Action::Send | Action::Swap if !source.kind().is_crypto() => {
            Err(ResolverError::SourceNotCryptoCapable {
                action,
                kind: source.kind(),
                address: source.address().value().to_string(),
            })
        }
        Action::Send | Action::Swap | Action::Sell => Ok(()),
        Action::Deposit | Action::Withdraw | Action::Receive | Action::ViewActivity => {
            Err(ResolverError::UnsupportedAction(action))
        }
    }
}

pub fn is_valid_target(source: &Account, candidate: &Account, action: Action) -> bool {
    let kind = candidate.kind();
    match action {
        Action::Send => !matches!(kind, AccountKind::Fiat | AccountKind::Interest),
        Action::Swap => {
            kind.is_crypto()
                && kind != AccountKind::Interest
                && candidate.currency() != source.currency()
                && (source.kind() != AccountKind::Trading || kind == AccountKind::Trading)
        }
        Action::Sell => kind == AccountKind::Fiat,
        Action::Deposit | Action::Withdraw | Action::Receive | Action::ViewActivity => false,
    }
}

/// Filter `candidates` down to valid destinations, keeping their order.
pub fn valid_targets(
    source: &Account,
    action: Action,
    candidates: &[Account],
) -> Result<Vec<Account>, ResolverError> {
    check_supported(source, action)?;
    Ok(candidates
        .iter()
        .filter(|candidate| is_valid_target(source, candidate, action))
        .cloned()
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error(transparent)]
    Resolver(#[from] ResolverError),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

/// Resolves targets against a wallet's aggregated accounts.
#[derive(Clone)]
pub struct TransactionTargets {
    aggregator: AccountAggregator,
    tier_gate: Arc<TierGate>,
}

impl TransactionTargets {
    pub fn new(aggregator: AccountAggregator, tier_gate: Arc<TierGate>) -> Self {
        Self {
            aggregator,
            tier_gate,
        }
    }

    /// Valid destinations for `action` from `source`, never including `source`.
    ///
    /// Sends stay within the source's asset. Selling is only offered to users
    /// eligible for simplified due diligence.
    pub async fn targets(&self, source: &Account, action: Action) -> Result<Vec<Account>, TargetError> {
        check_supported(source, action)?;

        if action == Action::Sell && !self.tier_gate.check_sdd_eligibility().await {
            tracing::info!(address = %source.address(), "User not eligible to sell");
            return Ok(Vec::new());
        }

        let candidates: Vec<Account> = self
            .aggregator
            .accounts()
            .await?
            .into_iter()
            .filter(|candidate| candidate.address() != source.address())
            .filter(|candidate| action != Action::Send || candidate.currency() == source.currency())
            .collect();

        let targets = valid_targets(source, action, &candidates)?;
        tracing::debug!(%action, address = %source.address(), targets = targets.len(), "Resolved targets");
        Ok(targets)
    }

    /// [`targets`](Self::targets) for the aggregated account at `address`.
    pub async fn targets_from(
        &self,
        address: &str,
        currency: CurrencyType,
        action: Action,
    ) -> Result<Vec<Account>, TargetError> {
        let source = self
            .aggregator
            .accounts()
            .await?
            .into_iter()
            .find(|account| account.address().value() == address && account.currency() == currency)
            .ok_or_else(|| AggregateError::AccountNotFound {
                address: address.to_string(),
                currency,
            })?;
        self.targets(&source, action).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use tally_core::{CryptoCurrency, FiatCurrency, Money};
    use tally_fi::Address;

    fn crypto(currency: CryptoCurrency, address: &str, kind: AccountKind) -> Account {
        Account::new(
            0,
            Address::new(address, currency),
            Money::zero(currency.into()),
            address,
            kind,
        )
        .unwrap()
    }

    fn fiat(currency: FiatCurrency) -> Account {
        Account::new(
            0,
            Address::new(currency.code(), currency),
            Money::fiat(Decimal::ONE, currency),
            currency.code(),
            AccountKind::Fiat,
        )
        .unwrap()
    }

    fn addresses(accounts: &[Account]) -> Vec<&str> {
        accounts.iter().map(|account| account.address().value()).collect()
    }

    #[test]
    fn test_swap_from_non_custodial() {
        let source = crypto(CryptoCurrency::Bitcoin, "btc-source", AccountKind::NonCustodial);
        let candidates = vec![
            crypto(CryptoCurrency::Bitcoin, "btc-other", AccountKind::NonCustodial),
            crypto(CryptoCurrency::Ethereum, "eth", AccountKind::NonCustodial),
            fiat(FiatCurrency::Usd),
            crypto(CryptoCurrency::Ethereum, "eth-interest", AccountKind::Interest),
            crypto(CryptoCurrency::Ethereum, "eth-trading", AccountKind::Trading),
        ];

        let targets = valid_targets(&source, Action::Swap, &candidates).unwrap();
        assert_eq!(addresses(&targets), vec!["eth", "eth-trading"]);
    }

    #[test]
    fn test_swap_from_trading_requires_trading() {
        let source = crypto(CryptoCurrency::Bitcoin, "btc-trading", AccountKind::Trading);
        let candidates = vec![
            crypto(CryptoCurrency::Ethereum, "eth", AccountKind::NonCustodial),
            crypto(CryptoCurrency::Ethereum, "eth-trading", AccountKind::Trading),
            crypto(CryptoCurrency::Stellar, "xlm-trading", AccountKind::Trading),
        ];

        let targets = valid_targets(&source, Action::Swap, &candidates).unwrap();
        assert_eq!(addresses(&targets), vec!["eth-trading", "xlm-trading"]);
    }

    #[test]
    fn test_sell_offers_only_fiat() {
        let source = crypto(CryptoCurrency::Ethereum, "eth", AccountKind::Trading);
        let candidates = vec![
            fiat(FiatCurrency::Usd),
            crypto(CryptoCurrency::Bitcoin, "btc", AccountKind::NonCustodial),
            fiat(FiatCurrency::Eur),
        ];

        let targets = valid_targets(&source, Action::Sell, &candidates).unwrap();
        assert_eq!(addresses(&targets), vec!["USD", "EUR"]);
    }

    #[test]
    fn test_send_excludes_fiat_and_interest() {
        let source = crypto(CryptoCurrency::Bitcoin, "btc", AccountKind::NonCustodial);
        let candidates = vec![
            crypto(CryptoCurrency::Bitcoin, "btc-trading", AccountKind::Trading),
            crypto(CryptoCurrency::Bitcoin, "btc-interest", AccountKind::Interest),
            fiat(FiatCurrency::Gbp),
            crypto(CryptoCurrency::Bitcoin, "btc-2", AccountKind::NonCustodial),
        ];

        let targets = valid_targets(&source, Action::Send, &candidates).unwrap();
        assert_eq!(addresses(&targets), vec!["btc-trading", "btc-2"]);
    }

    #[test]
    fn test_unsupported_actions_fail_loudly() {
        let source = crypto(CryptoCurrency::Bitcoin, "btc", AccountKind::NonCustodial);
        let candidates = vec![crypto(CryptoCurrency::Ethereum, "eth", AccountKind::NonCustodial)];

        for action in [Action::Deposit, Action::Withdraw, Action::Receive, Action::ViewActivity] {
            assert_eq!(
                valid_targets(&source, action, &candidates),
                Err(ResolverError::UnsupportedAction(action))
            );
        }
    }

    #[test]
    fn test_fiat_source_cannot_send_or_swap() {
        let source = fiat(FiatCurrency::Usd);
        for action in [Action::Send, Action::Swap] {
            assert!(matches!(
                valid_targets(&source, action, &[]),
                Err(ResolverError::SourceNotCryptoCapable { .. })
            ));
        }
        assert_eq!(valid_targets(&source, Action::Sell, &[]), Ok(Vec::new()));
    }
}
