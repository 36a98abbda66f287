use crate::provider::{AccountDetailsProvider, LegacyWallet};
use crate::source::{AssetAccountSource, FailurePolicy, SourceError};
use async_trait::async_trait;
use std::sync::Arc;
use tally_core::{CryptoCurrency, CurrencyType, Money};
use tally_fi::{Account, AccountKind, Address};

pub const ETHER_ACCOUNT_NAME: &str = "My Ether Wallet";

const ETHER: [CurrencyType; 1] = [CurrencyType::Crypto(CryptoCurrency::Ethereum)];

/// The wallet's single ether account.
///
/// When the balance service is down the account is still listed, with a zero
/// balance, so it stays selectable.
pub struct EtherSource {
    wallet: Arc<dyn LegacyWallet>,
    provider: Arc<dyn AccountDetailsProvider>,
}

impl EtherSource {
    pub fn new(wallet: Arc<dyn LegacyWallet>, provider: Arc<dyn AccountDetailsProvider>) -> Self {
        Self { wallet, provider }
    }

    /// The provider's own account name is ignored.
    fn account(&self, address: String, balance_minor: u128) -> Result<Account, SourceError> {
        Account::new(
            0,
            Address::new(address, CryptoCurrency::Ethereum),
            Money::from_minor(balance_minor, CryptoCurrency::Ethereum),
            ETHER_ACCOUNT_NAME,
            AccountKind::NonCustodial,
        )
        .map_err(|e| SourceError::new(self.name(), e))
    }
}

#[async_trait]
impl AssetAccountSource for EtherSource {
    fn name(&self) -> &'static str {
        CryptoCurrency::Ethereum.code()
    }

    fn currencies(&self) -> &[CurrencyType] {
        &ETHER
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Authoritative
    }

    async fn fetch_accounts(&self, use_cache: bool) -> Result<Vec<Account>, SourceError> {
        let address = self
            .wallet
            .ether_address()
            .filter(|_| self.wallet.has_ether_account());
        let Some(address) = address else {
            tracing::debug!("Wallet has no ether address");
            return Ok(Vec::new());
        };

        match self.provider.fetch_account_details(use_cache).await {
            Ok(details) => Ok(vec![self.account(details.address, details.balance_minor)?]),
            Err(e) => {
                tracing::warn!(error = %e, "Ether balance unavailable, listing zero-balance account");
                let fallback = self.account(address, 0)?;
                Err(SourceError::new(self.name(), e).with_fallback(vec![fallback]))
            }
        }
    }

    async fn default_account(
        &self,
        currency: CurrencyType,
    ) -> Result<Option<Account>, SourceError> {
        if !self.owns(currency) {
            return Ok(None);
        }
        match self.fetch_accounts(false).await {
            Ok(accounts) => Ok(accounts.into_iter().next()),
            Err(e) => Ok(e.fallback.into_iter().next()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{NetworkError, ProviderAccountDetails, ProviderError};

    struct EtherWallet {
        address: Option<&'static str>,
    }

    impl LegacyWallet for EtherWallet {
        fn active_account_count(&self, _currency: CryptoCurrency) -> u32 {
            0
        }

        fn index_of_active_account(&self, _currency: CryptoCurrency, _position: u32) -> Option<u32> {
            None
        }

        fn receive_address(&self, _currency: CryptoCurrency, _index: u32) -> Option<String> {
            None
        }

        fn label(&self, _currency: CryptoCurrency, _index: u32) -> Option<String> {
            None
        }

        fn balance(&self, _currency: CryptoCurrency, _index: u32) -> u128 {
            0
        }

        fn default_account_index(&self, _currency: CryptoCurrency) -> u32 {
            0
        }

        fn ether_address(&self) -> Option<String> {
            self.address.map(str::to_string)
        }

        fn has_ether_account(&self) -> bool {
            self.address.is_some()
        }
    }

    struct Details(Result<ProviderAccountDetails, ProviderError>);

    #[async_trait]
    impl AccountDetailsProvider for Details {
        async fn fetch_account_details(
            &self,
            _use_cache: bool,
        ) -> Result<ProviderAccountDetails, ProviderError> {
            self.0.clone()
        }
    }

    fn source(address: Option<&'static str>, details: Result<ProviderAccountDetails, ProviderError>) -> EtherSource {
        EtherSource::new(Arc::new(EtherWallet { address }), Arc::new(Details(details)))
    }

    #[tokio::test]
    async fn test_lists_provider_balance() {
        let details = ProviderAccountDetails {
            address: "0xabc".to_string(),
            balance_minor: 1_500_000_000_000_000_000,
            name: "Ignored".to_string(),
        };
        let accounts = source(Some("0xabc"), Ok(details)).fetch_accounts(false).await.unwrap();

        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].name(), ETHER_ACCOUNT_NAME);
        assert_eq!(accounts[0].balance().to_major_string(), "1.5");
    }

    #[tokio::test]
    async fn test_no_ether_address_is_empty() {
        let accounts = source(None, Err(ProviderError::NotFound))
            .fetch_accounts(false)
            .await
            .unwrap();
        assert!(accounts.is_empty());
    }

    #[tokio::test]
    async fn test_failure_carries_zero_balance_fallback() {
        let failing = Err(ProviderError::Network(NetworkError::Transport("timeout".to_string())));
        let source = source(Some("0xdef"), failing);

        let err = source.fetch_accounts(false).await.unwrap_err();
        assert_eq!(err.fallback.len(), 1);
        assert_eq!(err.fallback[0].address().value(), "0xdef");
        assert!(err.fallback[0].balance().is_zero());
        assert_eq!(err.fallback[0].name(), ETHER_ACCOUNT_NAME);

        let default = source
            .default_account(CryptoCurrency::Ethereum.into())
            .await
            .unwrap()
            .expect("fallback default");
        assert_eq!(default.address().value(), "0xdef");
    }
}
