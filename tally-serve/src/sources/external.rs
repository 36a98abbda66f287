use super::account_from_details;
use crate::provider::{AccountDetailsProvider, ProviderError};
use crate::source::{AssetAccountSource, FailurePolicy, SourceError};
use async_trait::async_trait;
use std::sync::Arc;
use tally_core::{CryptoCurrency, CurrencyType};
use tally_fi::Account;

/// Account on a separate network reached through its own service (Stellar).
///
/// Best-effort: when the network service is down the account is left out
/// rather than hiding every other account.
pub struct ExternalNetworkSource {
    currency: CryptoCurrency,
    currencies: [CurrencyType; 1],
    provider: Arc<dyn AccountDetailsProvider>,
}

impl ExternalNetworkSource {
    pub fn new(currency: CryptoCurrency, provider: Arc<dyn AccountDetailsProvider>) -> Self {
        Self {
            currency,
            currencies: [currency.into()],
            provider,
        }
    }
}

#[async_trait]
impl AssetAccountSource for ExternalNetworkSource {
    fn name(&self) -> &'static str {
        self.currency.code()
    }

    fn currencies(&self) -> &[CurrencyType] {
        &self.currencies
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::BestEffort
    }

    async fn fetch_accounts(&self, use_cache: bool) -> Result<Vec<Account>, SourceError> {
        match self.provider.fetch_account_details(use_cache).await {
            Ok(details) => {
                let name = details.name.clone();
                Ok(vec![account_from_details(self.name(), self.currency, details, name)?])
            }
            Err(ProviderError::NotFound) => Ok(Vec::new()),
            Err(e) => {
                tracing::warn!(source = self.name(), error = %e, "Network account unavailable, omitting");
                Ok(Vec::new())
            }
        }
    }

    /// The service's own current account, not the first listed one.
    async fn default_account(
        &self,
        currency: CurrencyType,
    ) -> Result<Option<Account>, SourceError> {
        if !self.owns(currency) {
            return Ok(None);
        }
        let Some(details) = self.provider.current_account() else {
            return Ok(None);
        };
        let name = details.name.clone();
        account_from_details(self.name(), self.currency, details, name).map(Some)
    }
}
