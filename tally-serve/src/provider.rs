//! Collaborators the sources and the tier gate read from.
//!
//! Wire clients live outside this crate; they only need to hand back the
//! typed results below. [`crate::fixture`] implements all of them over a JSON
//! wallet description.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tally_core::{CryptoCurrency, FiatCurrency};
use tally_fi::{EligibilityResponse, UserTiers, VerificationResponse};
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server responded {code}: {message}")]
    Status { code: u16, message: String },
    #[error("could not decode response: {0}")]
    Decoding(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error("no account exists for this wallet")]
    NotFound,
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Tells callers when the wallet has been decrypted and loaded.
#[async_trait]
pub trait WalletReadiness: Send + Sync {
    fn is_initialized(&self) -> bool;

    /// Resolves once the wallet is initialized. Returns immediately if it
    /// already is.
    async fn wait_until_initialized(&self);
}

/// Readiness flag backed by a watch channel.
pub struct InitializationSignal {
    ready_tx: watch::Sender<bool>,
}

impl InitializationSignal {
    pub fn new() -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self { ready_tx }
    }

    pub fn mark_initialized(&self) {
        self.ready_tx.send_replace(true);
    }

    /// Back to not-initialized, as after a logout.
    pub fn reset(&self) {
        self.ready_tx.send_replace(false);
    }
}

impl Default for InitializationSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletReadiness for InitializationSignal {
    fn is_initialized(&self) -> bool {
        *self.ready_tx.borrow()
    }

    async fn wait_until_initialized(&self) {
        let mut ready_rx = self.ready_tx.subscribe();
        // The sender lives in self, so the channel cannot close while we wait.
        let _ = ready_rx.wait_for(|ready| *ready).await;
    }
}

/// HD wallet holding the bitcoin-family accounts and the ether key.
pub trait LegacyWallet: Send + Sync {
    fn active_account_count(&self, currency: CryptoCurrency) -> u32;

    /// Wallet account index of the `position`-th active account.
    fn index_of_active_account(&self, currency: CryptoCurrency, position: u32) -> Option<u32>;

    fn receive_address(&self, currency: CryptoCurrency, index: u32) -> Option<String>;

    fn label(&self, currency: CryptoCurrency, index: u32) -> Option<String>;

    /// Balance in minor units.
    fn balance(&self, currency: CryptoCurrency, index: u32) -> u128;

    fn default_account_index(&self, currency: CryptoCurrency) -> u32;

    fn ether_address(&self) -> Option<String>;

    fn has_ether_account(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAccountDetails {
    pub address: String,
    pub balance_minor: u128,
    pub name: String,
}

/// Per-asset service reporting a single account's details.
#[async_trait]
pub trait AccountDetailsProvider: Send + Sync {
    async fn fetch_account_details(
        &self,
        use_cache: bool,
    ) -> Result<ProviderAccountDetails, ProviderError>;

    /// The account the service currently considers selected, if it has that notion.
    fn current_account(&self) -> Option<ProviderAccountDetails> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiatBalance {
    pub currency: FiatCurrency,
    pub amount: Decimal,
}

#[async_trait]
pub trait FiatAccountsProvider: Send + Sync {
    async fn fiat_balances(&self) -> Result<Vec<FiatBalance>, ProviderError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustodialBalance {
    pub currency: CryptoCurrency,
    pub trading_minor: u128,
    /// `None` when the user has no rewards account for this asset.
    pub interest_minor: Option<u128>,
}

#[async_trait]
pub trait CustodialBalancesProvider: Send + Sync {
    async fn custodial_balances(&self) -> Result<Vec<CustodialBalance>, ProviderError>;
}

#[async_trait]
pub trait KycClient: Send + Sync {
    async fn fetch_tiers(&self) -> Result<UserTiers, NetworkError>;

    async fn check_sdd_eligibility(&self) -> Result<EligibilityResponse, NetworkError>;

    async fn check_sdd_verification(&self) -> Result<VerificationResponse, NetworkError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureFlag {
    SddEnabled,
}

impl std::str::FromStr for FeatureFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sdd_enabled" | "sdd" => Ok(FeatureFlag::SddEnabled),
            other => Err(format!("Unknown feature flag '{other}'")),
        }
    }
}

pub trait FeatureFlags: Send + Sync {
    fn is_enabled(&self, flag: FeatureFlag) -> bool;
}

/// Flags fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct StaticFeatureFlags {
    enabled: Vec<FeatureFlag>,
}

impl StaticFeatureFlags {
    pub fn new(enabled: impl IntoIterator<Item = FeatureFlag>) -> Self {
        Self {
            enabled: enabled.into_iter().collect(),
        }
    }
}

impl FeatureFlags for StaticFeatureFlags {
    fn is_enabled(&self, flag: FeatureFlag) -> bool {
        self.enabled.contains(&flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_initialization_signal_releases_waiters() {
        let signal = Arc::new(InitializationSignal::new());
        assert!(!signal.is_initialized());

        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait_until_initialized().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        signal.mark_initialized();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be released")
            .unwrap();

        // Already initialized: returns straight away.
        signal.wait_until_initialized().await;

        signal.reset();
        assert!(!signal.is_initialized());
    }

    #[test]
    fn test_static_flags() {
        let flags = StaticFeatureFlags::new(["sdd_enabled".parse::<FeatureFlag>().unwrap()]);
        assert!(flags.is_enabled(FeatureFlag::SddEnabled));
        assert!(!StaticFeatureFlags::default().is_enabled(FeatureFlag::SddEnabled));
    }
}
