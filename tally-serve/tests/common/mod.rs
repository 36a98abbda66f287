#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tally_core::{CryptoCurrency, CurrencyType, Money};
use tally_fi::{
    Account, AccountKind, Address, EligibilityResponse, Tier, TierStatus, UserTier, UserTiers,
    VerificationResponse,
};
use tally_serve::provider::{FeatureFlag, KycClient, NetworkError, StaticFeatureFlags};
use tally_serve::source::{AssetAccountSource, FailurePolicy, SourceError};

pub fn account(currency: CryptoCurrency, address: &str, kind: AccountKind) -> Account {
    Account::new(
        0,
        Address::new(address, currency),
        Money::from_minor(1, currency),
        format!("{address} account"),
        kind,
    )
    .expect("valid account")
}

/// Source answering with fixed accounts after a delay, counting fetches.
pub struct ScriptedSource {
    pub name: &'static str,
    pub currencies: Vec<CurrencyType>,
    pub delay: Duration,
    pub result: Result<Vec<Account>, SourceError>,
    pub policy: FailurePolicy,
    pub fetches: AtomicUsize,
    /// Shared log of source names in completion order.
    pub completions: Option<Arc<Mutex<Vec<&'static str>>>>,
    pub initialize_fails: bool,
}

impl ScriptedSource {
    pub fn new(name: &'static str, currency: CryptoCurrency, accounts: Vec<Account>) -> Self {
        Self {
            name,
            currencies: vec![currency.into()],
            delay: Duration::ZERO,
            result: Ok(accounts),
            policy: FailurePolicy::Authoritative,
            fetches: AtomicUsize::new(0),
            completions: None,
            initialize_fails: false,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self, error: SourceError) -> Self {
        self.result = Err(error);
        self
    }

    pub fn recording(mut self, completions: Arc<Mutex<Vec<&'static str>>>) -> Self {
        self.completions = Some(completions);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetAccountSource for ScriptedSource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn currencies(&self) -> &[CurrencyType] {
        &self.currencies
    }

    fn failure_policy(&self) -> FailurePolicy {
        self.policy
    }

    async fn initialize(&self) -> Result<(), SourceError> {
        if self.initialize_fails {
            return Err(SourceError::new(
                self.name,
                tally_serve::ProviderError::Unavailable("warm-up failed".to_string()),
            ));
        }
        if let Some(completions) = &self.completions {
            completions.lock().unwrap().push(self.name);
        }
        Ok(())
    }

    async fn fetch_accounts(&self, _use_cache: bool) -> Result<Vec<Account>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if let Some(completions) = &self.completions {
            completions.lock().unwrap().push(self.name);
        }
        self.result.clone()
    }

    async fn default_account(
        &self,
        currency: CurrencyType,
    ) -> Result<Option<Account>, SourceError> {
        Ok(self
            .result
            .clone()?
            .into_iter()
            .find(|account| account.currency() == currency))
    }
}

/// KYC backend with scripted answers and per-call counters.
pub struct ScriptedKyc {
    pub tiers: UserTiers,
    pub tiers_delay: Duration,
    pub tiers_error: Option<NetworkError>,
    /// The first tier fetch never answers.
    pub first_fetch_hangs: bool,
    pub eligible: bool,
    pub verified: bool,
    /// `None`: the verification task never completes.
    pub completes_after: Option<usize>,
    pub tier_fetches: AtomicUsize,
    pub eligibility_checks: AtomicUsize,
    pub verification_checks: AtomicUsize,
}

impl ScriptedKyc {
    pub fn at_tier(tier: Tier) -> Self {
        Self {
            tiers: UserTiers::new(vec![UserTier::new(tier, TierStatus::Verified)]),
            tiers_delay: Duration::ZERO,
            tiers_error: None,
            first_fetch_hangs: false,
            eligible: true,
            verified: true,
            completes_after: Some(0),
            tier_fetches: AtomicUsize::new(0),
            eligibility_checks: AtomicUsize::new(0),
            verification_checks: AtomicUsize::new(0),
        }
    }

    pub fn remote_calls(&self) -> usize {
        self.tier_fetches.load(Ordering::SeqCst)
            + self.eligibility_checks.load(Ordering::SeqCst)
            + self.verification_checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KycClient for ScriptedKyc {
    async fn fetch_tiers(&self) -> Result<UserTiers, NetworkError> {
        let previous = self.tier_fetches.fetch_add(1, Ordering::SeqCst);
        if self.first_fetch_hangs && previous == 0 {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.tiers_delay).await;
        match &self.tiers_error {
            Some(error) => Err(error.clone()),
            None => Ok(self.tiers.clone()),
        }
    }

    async fn check_sdd_eligibility(&self) -> Result<EligibilityResponse, NetworkError> {
        self.eligibility_checks.fetch_add(1, Ordering::SeqCst);
        Ok(EligibilityResponse {
            eligible: self.eligible,
            tier: self.tiers.latest_approved_tier(),
        })
    }

    async fn check_sdd_verification(&self) -> Result<VerificationResponse, NetworkError> {
        let previous = self.verification_checks.fetch_add(1, Ordering::SeqCst);
        let task_complete = self
            .completes_after
            .map(|after| previous >= after)
            .unwrap_or(false);
        Ok(VerificationResponse {
            verified: self.verified && task_complete,
            task_complete,
        })
    }
}

pub fn sdd_flags(enabled: bool) -> Arc<StaticFeatureFlags> {
    let flags: Vec<FeatureFlag> = if enabled {
        vec![FeatureFlag::SddEnabled]
    } else {
        Vec::new()
    };
    Arc::new(StaticFeatureFlags::new(flags))
}
