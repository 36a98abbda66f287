use crate::provider::LegacyWallet;
use crate::source::{AssetAccountSource, FailurePolicy, SourceError, ensure_unique};
use async_trait::async_trait;
use std::sync::Arc;
use tally_core::{CryptoCurrency, CurrencyType, Money};
use tally_fi::{Account, AccountKind, Address};

/// Bitcoin-family accounts read straight from the HD wallet.
pub struct LegacyChainSource {
    currency: CryptoCurrency,
    currencies: [CurrencyType; 1],
    wallet: Arc<dyn LegacyWallet>,
}

impl LegacyChainSource {
    pub fn new(currency: CryptoCurrency, wallet: Arc<dyn LegacyWallet>) -> Self {
        Self {
            currency,
            currencies: [currency.into()],
            wallet,
        }
    }

    /// `None` when the wallet has no receive address for `index`.
    fn account_at(&self, index: u32) -> Result<Option<Account>, SourceError> {
        let Some(address) = self.wallet.receive_address(self.currency, index) else {
            tracing::debug!(currency = %self.currency, index, "Skipping account without receive address");
            return Ok(None);
        };

        let name = self.wallet.label(self.currency, index).unwrap_or_default();
        let balance = Money::from_minor(self.wallet.balance(self.currency, index), self.currency);

        Account::new(
            index,
            Address::new(address, self.currency),
            balance,
            name,
            AccountKind::NonCustodial,
        )
        .map(Some)
        .map_err(|e| SourceError::new(self.name(), e))
    }
}

#[async_trait]
impl AssetAccountSource for LegacyChainSource {
    fn name(&self) -> &'static str {
        self.currency.code()
    }

    fn currencies(&self) -> &[CurrencyType] {
        &self.currencies
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Authoritative
    }

    async fn fetch_accounts(&self, _use_cache: bool) -> Result<Vec<Account>, SourceError> {
        let count = self.wallet.active_account_count(self.currency);
        let mut accounts = Vec::with_capacity(count as usize);

        for position in 0..count {
            let Some(index) = self.wallet.index_of_active_account(self.currency, position) else {
                continue;
            };
            if let Some(account) = self.account_at(index)? {
                accounts.push(account);
            }
        }

        ensure_unique(self.name(), accounts)
    }

    async fn default_account(
        &self,
        currency: CurrencyType,
    ) -> Result<Option<Account>, SourceError> {
        if !self.owns(currency) {
            return Ok(None);
        }
        self.account_at(self.wallet.default_account_index(self.currency))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceErrorReason;

    /// Accounts 0..=3 exist; 1 is archived, 2 has no receive address.
    struct StubWallet {
        duplicate_addresses: bool,
    }

    impl LegacyWallet for StubWallet {
        fn active_account_count(&self, currency: CryptoCurrency) -> u32 {
            match currency {
                CryptoCurrency::Bitcoin => 3,
                _ => 0,
            }
        }

        fn index_of_active_account(&self, _currency: CryptoCurrency, position: u32) -> Option<u32> {
            [0, 2, 3].get(position as usize).copied()
        }

        fn receive_address(&self, _currency: CryptoCurrency, index: u32) -> Option<String> {
            match index {
                2 => None,
                _ if self.duplicate_addresses => Some("1same".to_string()),
                other => Some(format!("1addr{other}")),
            }
        }

        fn label(&self, _currency: CryptoCurrency, index: u32) -> Option<String> {
            (index == 0).then(|| "Main".to_string())
        }

        fn balance(&self, _currency: CryptoCurrency, index: u32) -> u128 {
            index as u128 * 100_000
        }

        fn default_account_index(&self, _currency: CryptoCurrency) -> u32 {
            3
        }

        fn ether_address(&self) -> Option<String> {
            None
        }

        fn has_ether_account(&self) -> bool {
            false
        }
    }

    fn source(currency: CryptoCurrency, duplicate_addresses: bool) -> LegacyChainSource {
        LegacyChainSource::new(currency, Arc::new(StubWallet { duplicate_addresses }))
    }

    #[tokio::test]
    async fn test_enumerates_active_accounts_skipping_missing_addresses() {
        let accounts = source(CryptoCurrency::Bitcoin, false)
            .fetch_accounts(false)
            .await
            .unwrap();

        let indices: Vec<u32> = accounts.iter().map(Account::index).collect();
        assert_eq!(indices, vec![0, 3]);
        assert_eq!(accounts[0].name(), "Main");
        assert_eq!(accounts[1].name(), "");
        assert_eq!(accounts[1].address().value(), "1addr3");
        assert_eq!(accounts[1].balance().to_major_string(), "0.003");
    }

    #[tokio::test]
    async fn test_no_active_accounts_is_empty() {
        let accounts = source(CryptoCurrency::BitcoinCash, false)
            .fetch_accounts(false)
            .await
            .unwrap();
        assert!(accounts.is_empty());
    }

    #[tokio::test]
    async fn test_default_uses_wallet_default_index() {
        let source = source(CryptoCurrency::Bitcoin, false);
        let default = source
            .default_account(CryptoCurrency::Bitcoin.into())
            .await
            .unwrap()
            .expect("default account");
        assert_eq!(default.index(), 3);

        let other = source.default_account(CryptoCurrency::Ethereum.into()).await.unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_addresses_are_rejected() {
        let err = source(CryptoCurrency::Bitcoin, true)
            .fetch_accounts(false)
            .await
            .unwrap_err();
        assert_eq!(err.source_name, "BTC");
        assert!(matches!(err.reason, SourceErrorReason::DuplicateAccount(_)));
    }
}
