use crate::provider::FiatAccountsProvider;
use crate::source::{AssetAccountSource, FailurePolicy, SourceError, ensure_unique};
use async_trait::async_trait;
use std::sync::Arc;
use tally_core::{CurrencyType, FiatCurrency, Money};
use tally_fi::{Account, AccountKind, Address};

/// Cash balances, one account per fiat currency the user holds.
pub struct FiatSource {
    currencies: Vec<CurrencyType>,
    provider: Arc<dyn FiatAccountsProvider>,
}

impl FiatSource {
    pub fn new(provider: Arc<dyn FiatAccountsProvider>) -> Self {
        Self {
            currencies: FiatCurrency::ALL.into_iter().map(CurrencyType::from).collect(),
            provider,
        }
    }
}

#[async_trait]
impl AssetAccountSource for FiatSource {
    fn name(&self) -> &'static str {
        "fiat"
    }

    fn currencies(&self) -> &[CurrencyType] {
        &self.currencies
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Authoritative
    }

    async fn fetch_accounts(&self, _use_cache: bool) -> Result<Vec<Account>, SourceError> {
        let balances = self
            .provider
            .fiat_balances()
            .await
            .map_err(|e| SourceError::new(self.name(), e))?;

        let accounts = balances
            .into_iter()
            .enumerate()
            .map(|(index, balance)| {
                Account::new(
                    index as u32,
                    Address::new(balance.currency.code(), balance.currency),
                    Money::fiat(balance.amount, balance.currency),
                    format!("{} Account", balance.currency),
                    AccountKind::Fiat,
                )
                .map_err(|e| SourceError::new(self.name(), e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        ensure_unique(self.name(), accounts)
    }

    async fn default_account(
        &self,
        currency: CurrencyType,
    ) -> Result<Option<Account>, SourceError> {
        if !self.owns(currency) {
            return Ok(None);
        }
        let accounts = self.fetch_accounts(false).await?;
        Ok(accounts.into_iter().find(|account| account.currency() == currency))
    }
}
