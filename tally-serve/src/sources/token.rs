use super::account_from_details;
use crate::provider::{AccountDetailsProvider, ProviderError};
use crate::source::{AssetAccountSource, FailurePolicy, SourceError};
use async_trait::async_trait;
use std::sync::Arc;
use tally_core::{CryptoCurrency, CurrencyType};
use tally_fi::Account;

/// ERC-20 token balance held on the wallet's ether address.
pub struct TokenSource {
    currency: CryptoCurrency,
    currencies: [CurrencyType; 1],
    provider: Arc<dyn AccountDetailsProvider>,
}

impl TokenSource {
    pub fn new(currency: CryptoCurrency, provider: Arc<dyn AccountDetailsProvider>) -> Self {
        Self {
            currency,
            currencies: [currency.into()],
            provider,
        }
    }
}

#[async_trait]
impl AssetAccountSource for TokenSource {
    fn name(&self) -> &'static str {
        self.currency.code()
    }

    fn currencies(&self) -> &[CurrencyType] {
        &self.currencies
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Authoritative
    }

    /// Primes the provider's cache so the first listing can be served from it.
    async fn initialize(&self) -> Result<(), SourceError> {
        match self.provider.fetch_account_details(false).await {
            Ok(_) | Err(ProviderError::NotFound) => Ok(()),
            Err(e) => Err(SourceError::new(self.name(), e)),
        }
    }

    /// A wallet without a token account lists nothing.
    async fn fetch_accounts(&self, use_cache: bool) -> Result<Vec<Account>, SourceError> {
        let details = match self.provider.fetch_account_details(use_cache).await {
            Ok(details) => details,
            Err(ProviderError::NotFound) => {
                tracing::debug!(source = self.name(), "No token account");
                return Ok(Vec::new());
            }
            Err(e) => return Err(SourceError::new(self.name(), e)),
        };
        let name = details.name.clone();
        Ok(vec![account_from_details(self.name(), self.currency, details, name)?])
    }

    async fn default_account(
        &self,
        currency: CurrencyType,
    ) -> Result<Option<Account>, SourceError> {
        if !self.owns(currency) {
            return Ok(None);
        }
        Ok(self.fetch_accounts(false).await?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderAccountDetails;
    use crate::source::SourceErrorReason;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct PaxDetails {
        error: Option<ProviderError>,
        saw_cache_flag: AtomicBool,
    }

    #[async_trait]
    impl AccountDetailsProvider for PaxDetails {
        async fn fetch_account_details(
            &self,
            use_cache: bool,
        ) -> Result<ProviderAccountDetails, ProviderError> {
            self.saw_cache_flag.store(use_cache, Ordering::SeqCst);
            if let Some(error) = &self.error {
                return Err(error.clone());
            }
            Ok(ProviderAccountDetails {
                address: "0xabc".to_string(),
                balance_minor: 25_000_000_000_000_000_000,
                name: "USD Digital".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_wraps_single_details_result() {
        let provider = Arc::new(PaxDetails {
            error: None,
            saw_cache_flag: AtomicBool::new(false),
        });
        let source = TokenSource::new(CryptoCurrency::Pax, provider.clone());

        let accounts = source.fetch_accounts(true).await.unwrap();
        assert!(provider.saw_cache_flag.load(Ordering::SeqCst));
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].index(), 0);
        assert_eq!(accounts[0].name(), "USD Digital");
        assert_eq!(accounts[0].balance().to_string(), "25 PAX");
    }

    #[tokio::test]
    async fn test_failure_propagates_without_fallback() {
        let source = TokenSource::new(
            CryptoCurrency::Pax,
            Arc::new(PaxDetails {
                error: Some(ProviderError::Unavailable("rpc down".to_string())),
                saw_cache_flag: AtomicBool::new(false),
            }),
        );

        let err = source.fetch_accounts(false).await.unwrap_err();
        assert!(err.fallback.is_empty());
        assert!(matches!(err.reason, SourceErrorReason::Provider(ProviderError::Unavailable(_))));
        assert!(source.initialize().await.is_err());
        assert!(source.default_account(CryptoCurrency::Pax.into()).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_token_account_lists_nothing() {
        let source = TokenSource::new(
            CryptoCurrency::Pax,
            Arc::new(PaxDetails {
                error: Some(ProviderError::NotFound),
                saw_cache_flag: AtomicBool::new(false),
            }),
        );

        assert!(source.fetch_accounts(false).await.unwrap().is_empty());
        assert!(source.initialize().await.is_ok());
        assert_eq!(source.default_account(CryptoCurrency::Pax.into()).await.unwrap(), None);
    }
}
