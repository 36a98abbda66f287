use crate::provider::ProviderError;
use async_trait::async_trait;
use serde::Serialize;
use tally_core::CurrencyType;
use tally_fi::account::find_duplicate;
use tally_fi::{Account, AccountError};

/// What a source does when its provider fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Failures degrade to an empty contribution inside the source.
    BestEffort,
    /// Failures are reported to the aggregator.
    Authoritative,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceErrorReason {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    InvalidAccount(#[from] AccountError),
    #[error("account {0} reported twice")]
    DuplicateAccount(String),
    #[error("fetch task ended abnormally: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{source_name} source failed: {reason}")]
pub struct SourceError {
    pub source_name: &'static str,
    #[source]
    pub reason: SourceErrorReason,
    /// Accounts to show in place of the real result.
    pub fallback: Vec<Account>,
}

impl SourceError {
    pub fn new(source_name: &'static str, reason: impl Into<SourceErrorReason>) -> Self {
        Self {
            source_name,
            reason: reason.into(),
            fallback: Vec::new(),
        }
    }

    pub fn with_fallback(mut self, fallback: Vec<Account>) -> Self {
        self.fallback = fallback;
        self
    }
}

/// One asset family's accounts.
///
/// Sources are independent of each other; the aggregator runs them in
/// parallel and concatenates their results in registration order.
#[async_trait]
pub trait AssetAccountSource: Send + Sync {
    /// Short identifier used in logs and failure reports.
    fn name(&self) -> &'static str;

    /// Asset namespace this source reports accounts for.
    fn currencies(&self) -> &[CurrencyType];

    fn failure_policy(&self) -> FailurePolicy;

    fn owns(&self, currency: CurrencyType) -> bool {
        self.currencies().contains(&currency)
    }

    /// Warm-up hook run once after login.
    async fn initialize(&self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Fetch this family's accounts. `use_cache` is passed to providers
    /// that keep their own cache.
    async fn fetch_accounts(&self, use_cache: bool) -> Result<Vec<Account>, SourceError>;

    /// The account preselected for `currency`, by this family's rule.
    async fn default_account(&self, currency: CurrencyType)
    -> Result<Option<Account>, SourceError>;
}

/// Reject a result listing the same (address, asset) twice.
pub(crate) fn ensure_unique(
    source_name: &'static str,
    accounts: Vec<Account>,
) -> Result<Vec<Account>, SourceError> {
    if let Some(duplicate) = find_duplicate(&accounts) {
        let reason = SourceErrorReason::DuplicateAccount(duplicate.address().to_string());
        return Err(SourceError::new(source_name, reason));
    }
    Ok(accounts)
}
