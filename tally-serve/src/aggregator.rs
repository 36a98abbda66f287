//! All of a wallet's accounts, across every asset source, as one collection.

use crate::provider::WalletReadiness;
use crate::source::{AssetAccountSource, FailurePolicy, SourceError, SourceErrorReason};
use futures::future::join_all;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tally_core::{CacheError, CurrencyType, RefreshPolicy, SingleFlightCache};
use tally_fi::Account;

/// What to do when accounts are requested before the wallet is initialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InitializationMode {
    /// Wait for the initialization signal.
    #[default]
    Wait,
    /// Answer with an empty collection straight away, leaving the cache alone.
    ShortCircuit,
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub initialization: InitializationMode,
    pub refresh: RefreshPolicy,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            initialization: InitializationMode::Wait,
            refresh: RefreshPolicy::OnInvalidate,
        }
    }
}

/// A source that failed during the last aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source: &'static str,
    pub policy: FailurePolicy,
    pub message: String,
    /// Number of fallback accounts listed in its place.
    pub fallback_accounts: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateReport {
    pub accounts: Vec<Account>,
    pub failures: Vec<SourceFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregateError {
    #[error("wallet was not initialized within {0:?}")]
    InitializationTimeout(Duration),
    #[error("account cache unavailable: {0}")]
    Cache(String),
    #[error("no {currency} account contains address {address}")]
    AccountNotFound {
        address: String,
        currency: CurrencyType,
    },
    #[error("no source reports {0} accounts")]
    UnknownCurrency(CurrencyType),
    #[error(transparent)]
    Source(#[from] SourceError),
}

impl From<CacheError<Infallible>> for AggregateError {
    fn from(error: CacheError<Infallible>) -> Self {
        AggregateError::Cache(error.to_string())
    }
}

type Sources = Arc<[Arc<dyn AssetAccountSource>]>;

/// Fans a fetch out to every source and keeps the merged result cached.
#[derive(Clone)]
pub struct AccountAggregator {
    sources: Sources,
    readiness: Arc<dyn WalletReadiness>,
    config: AggregatorConfig,
    cache: SingleFlightCache<AggregateReport, Infallible>,
}

impl AccountAggregator {
    /// Sources are queried in parallel but always merged in the order given here.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        sources: Vec<Arc<dyn AssetAccountSource>>,
        readiness: Arc<dyn WalletReadiness>,
        config: AggregatorConfig,
    ) -> Self {
        let sources: Sources = sources.into();
        let fetch_sources = sources.clone();
        let cache: SingleFlightCache<AggregateReport, Infallible> =
            SingleFlightCache::spawn("accounts", config.refresh, move || {
                let sources = fetch_sources.clone();
                async move { Ok(collect(sources).await) }
            });

        Self {
            sources,
            readiness,
            config,
            cache,
        }
    }

    pub fn sources(&self) -> &[Arc<dyn AssetAccountSource>] {
        &self.sources
    }

    pub fn is_initialized(&self) -> bool {
        self.readiness.is_initialized()
    }

    /// Cached accounts if fresh, otherwise a (shared) fetch.
    pub async fn accounts(&self) -> Result<Vec<Account>, AggregateError> {
        Ok(self.report().await?.accounts)
    }

    /// Like [`accounts`](Self::accounts) but with the per-source failures.
    pub async fn report(&self) -> Result<AggregateReport, AggregateError> {
        if !self.ready(None).await? {
            return Ok(AggregateReport::default());
        }
        Ok(self.cache.get().await?)
    }

    /// Query every source now, replacing the cached collection.
    pub async fn fetch_accounts(&self) -> Result<Vec<Account>, AggregateError> {
        Ok(self.fetch_report().await?.accounts)
    }

    pub async fn fetch_report(&self) -> Result<AggregateReport, AggregateError> {
        if !self.ready(None).await? {
            return Ok(AggregateReport::default());
        }
        Ok(self.cache.fetch().await?)
    }

    /// [`fetch_accounts`](Self::fetch_accounts) with a bound on the
    /// initialization wait.
    pub async fn fetch_accounts_within(
        &self,
        limit: Duration,
    ) -> Result<Vec<Account>, AggregateError> {
        if !self.ready(Some(limit)).await? {
            return Ok(Vec::new());
        }
        Ok(self.cache.fetch().await?.accounts)
    }

    /// The last aggregate stored, without fetching.
    pub async fn last_report(&self) -> Option<AggregateReport> {
        self.cache.peek().await
    }

    /// Cached accounts in `currency`. Never fetches.
    pub async fn accounts_filtered(&self, currency: CurrencyType) -> Vec<Account> {
        self.last_report()
            .await
            .map(|report| filter_currency(report.accounts, currency))
            .unwrap_or_default()
    }

    /// Accounts in `currency`, empty while the wallet is not initialized.
    ///
    /// With `from_cache` the aggregate is used (fetched if needed); otherwise
    /// the owning sources are asked directly.
    pub async fn accounts_for(
        &self,
        currency: CurrencyType,
        from_cache: bool,
    ) -> Result<Vec<Account>, AggregateError> {
        if !self.readiness.is_initialized() {
            return Ok(Vec::new());
        }
        if from_cache {
            return Ok(filter_currency(self.accounts().await?, currency));
        }

        let owners = self.owners(currency)?;
        let mut accounts = Vec::new();
        for source in owners {
            let listed = match source.fetch_accounts(false).await {
                Ok(listed) => listed,
                Err(e) if !e.fallback.is_empty() => e.fallback,
                Err(e) => return Err(e.into()),
            };
            accounts.extend(filter_currency(listed, currency));
        }
        Ok(accounts)
    }

    /// Default account for `currency`, from the first owning source that has one.
    pub async fn default_account(
        &self,
        currency: CurrencyType,
    ) -> Result<Option<Account>, AggregateError> {
        for source in self.owners(currency)? {
            if let Some(account) = source.default_account(currency).await? {
                return Ok(Some(account));
            }
        }
        Ok(None)
    }

    pub async fn name_of_account_containing(
        &self,
        address: &str,
        currency: CurrencyType,
    ) -> Result<String, AggregateError> {
        self.accounts()
            .await?
            .into_iter()
            .find(|account| account.address().value() == address && account.currency() == currency)
            .map(|account| account.name().to_string())
            .ok_or_else(|| AggregateError::AccountNotFound {
                address: address.to_string(),
                currency,
            })
    }

    /// Run each source's warm-up hook in order, stopping at the first failure.
    pub async fn initialize_sources(&self) -> Result<(), AggregateError> {
        for source in self.sources.iter() {
            source.initialize().await?;
            tracing::debug!(source = source.name(), "Source initialized");
        }
        Ok(())
    }

    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    /// `Ok(false)` means short-circuit with an empty answer.
    async fn ready(&self, limit: Option<Duration>) -> Result<bool, AggregateError> {
        if self.readiness.is_initialized() {
            return Ok(true);
        }
        if self.config.initialization == InitializationMode::ShortCircuit {
            tracing::debug!("Wallet not initialized, returning no accounts");
            return Ok(false);
        }

        match limit {
            None => self.readiness.wait_until_initialized().await,
            Some(limit) => tokio::time::timeout(limit, self.readiness.wait_until_initialized())
                .await
                .map_err(|_| AggregateError::InitializationTimeout(limit))?,
        }
        Ok(true)
    }

    fn owners(
        &self,
        currency: CurrencyType,
    ) -> Result<Vec<&Arc<dyn AssetAccountSource>>, AggregateError> {
        let owners: Vec<_> = self
            .sources
            .iter()
            .filter(|source| source.owns(currency))
            .collect();
        if owners.is_empty() {
            return Err(AggregateError::UnknownCurrency(currency));
        }
        Ok(owners)
    }
}

fn filter_currency(accounts: Vec<Account>, currency: CurrencyType) -> Vec<Account> {
    accounts
        .into_iter()
        .filter(|account| account.currency() == currency)
        .collect()
}

/// One task per source, joined and merged in declaration order.
async fn collect(sources: Sources) -> AggregateReport {
    let tasks = sources.iter().map(|source| {
        let source = source.clone();
        tokio::spawn(async move { source.fetch_accounts(false).await })
    });
    let results = join_all(tasks).await;

    let mut report = AggregateReport::default();
    for (source, joined) in sources.iter().zip(results) {
        let outcome = joined.unwrap_or_else(|e| {
            Err(SourceError::new(
                source.name(),
                SourceErrorReason::Aborted(e.to_string()),
            ))
        });

        match outcome {
            Ok(accounts) => {
                tracing::debug!(source = source.name(), accounts = accounts.len(), "Source fetched");
                report.accounts.extend(accounts);
            }
            Err(e) => {
                let policy = source.failure_policy();
                match policy {
                    FailurePolicy::BestEffort => {
                        tracing::warn!(source = source.name(), error = %e, "Best-effort source failed")
                    }
                    FailurePolicy::Authoritative => {
                        tracing::error!(source = source.name(), error = %e, fallback = e.fallback.len(), "Source failed")
                    }
                }
                report.failures.push(SourceFailure {
                    source: source.name(),
                    policy,
                    message: e.to_string(),
                    fallback_accounts: e.fallback.len(),
                });
                report.accounts.extend(e.fallback);
            }
        }
    }

    tracing::info!(
        accounts = report.accounts.len(),
        failures = report.failures.len(),
        "Accounts aggregated"
    );
    report
}
