use crate::provider::{CustodialBalance, CustodialBalancesProvider};
use crate::source::{AssetAccountSource, FailurePolicy, SourceError, ensure_unique};
use async_trait::async_trait;
use std::sync::Arc;
use tally_core::{CryptoCurrency, CurrencyType, Money};
use tally_fi::{Account, AccountKind, Address};

/// Trading and rewards balances the service holds for the user.
pub struct CustodialSource {
    currencies: Vec<CurrencyType>,
    provider: Arc<dyn CustodialBalancesProvider>,
}

impl CustodialSource {
    pub fn new(provider: Arc<dyn CustodialBalancesProvider>) -> Self {
        Self {
            currencies: CryptoCurrency::ALL.into_iter().map(CurrencyType::from).collect(),
            provider,
        }
    }

    fn accounts_for(&self, balance: &CustodialBalance) -> Result<Vec<Account>, SourceError> {
        let currency = balance.currency;
        let code = currency.code().to_ascii_lowercase();

        let mut accounts = vec![Account::new(
            0,
            Address::new(format!("{code}-trading"), currency),
            Money::from_minor(balance.trading_minor, currency),
            format!("{} Trading Account", currency.display_name()),
            AccountKind::Trading,
        )
        .map_err(|e| SourceError::new(self.name(), e))?];

        if let Some(interest_minor) = balance.interest_minor {
            let interest = Account::new(
                0,
                Address::new(format!("{code}-interest"), currency),
                Money::from_minor(interest_minor, currency),
                format!("{} Rewards Account", currency.display_name()),
                AccountKind::Interest,
            )
            .map_err(|e| SourceError::new(self.name(), e))?;
            accounts.push(interest);
        }

        Ok(accounts)
    }
}

#[async_trait]
impl AssetAccountSource for CustodialSource {
    fn name(&self) -> &'static str {
        "custodial"
    }

    fn currencies(&self) -> &[CurrencyType] {
        &self.currencies
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::BestEffort
    }

    async fn fetch_accounts(&self, _use_cache: bool) -> Result<Vec<Account>, SourceError> {
        let balances = match self.provider.custodial_balances().await {
            Ok(balances) => balances,
            Err(e) => {
                tracing::warn!(source = self.name(), error = %e, "Custodial balances unavailable, omitting");
                return Ok(Vec::new());
            }
        };

        let mut accounts = Vec::new();
        for balance in &balances {
            accounts.extend(self.accounts_for(balance)?);
        }
        ensure_unique(self.name(), accounts)
    }

    /// First trading account in `currency`.
    async fn default_account(
        &self,
        currency: CurrencyType,
    ) -> Result<Option<Account>, SourceError> {
        if !self.owns(currency) {
            return Ok(None);
        }
        let accounts = self.fetch_accounts(false).await?;
        Ok(accounts
            .into_iter()
            .find(|account| account.kind() == AccountKind::Trading && account.currency() == currency))
    }
}
