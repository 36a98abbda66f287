//! KYC tier lookups and simplified-due-diligence (SDD) checks.
//!
//! Tiers are fetched through a single-flight cache with a hard timeout.
//! SDD verification is eventually consistent on the backend, so it can be
//! polled until the verification task reports completion.

use crate::provider::{FeatureFlag, FeatureFlags, KycClient, NetworkError};
use std::sync::Arc;
use std::time::Duration;
use tally_core::{CacheError, RefreshPolicy, SingleFlightCache};
use tally_fi::{EligibilityResponse, Tier, UserTiers};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct TierGateConfig {
    /// Upper bound on a single tier fetch.
    pub fetch_timeout: Duration,
    pub poll_interval: Duration,
    /// How long verification is polled before giving up.
    pub poll_deadline: Duration,
}

impl Default for TierGateConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(5),
            poll_deadline: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TierError {
    #[error("tier request timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error("verification polling cancelled")]
    Cancelled,
    #[error("tier cache unavailable: {0}")]
    Cache(String),
}

fn flatten_cache_error(error: CacheError<TierError>) -> TierError {
    match error {
        CacheError::Fetch(e) => e,
        e => TierError::Cache(e.to_string()),
    }
}

pub struct TierGate {
    client: Arc<dyn KycClient>,
    flags: Arc<dyn FeatureFlags>,
    config: TierGateConfig,
    cache: SingleFlightCache<UserTiers, TierError>,
}

impl TierGate {
    pub fn new(
        client: Arc<dyn KycClient>,
        flags: Arc<dyn FeatureFlags>,
        config: TierGateConfig,
    ) -> Self {
        let fetch_client = client.clone();
        let limit = config.fetch_timeout;
        let cache = SingleFlightCache::spawn("tiers", RefreshPolicy::OnInvalidate, move || {
            let client = fetch_client.clone();
            async move {
                match tokio::time::timeout(limit, client.fetch_tiers()).await {
                    Ok(tiers) => tiers.map_err(TierError::Network),
                    Err(_) => {
                        tracing::warn!(timeout = ?limit, "Tier fetch timed out");
                        Err(TierError::Timeout(limit))
                    }
                }
            }
        });

        Self {
            client,
            flags,
            config,
            cache,
        }
    }

    pub fn config(&self) -> &TierGateConfig {
        &self.config
    }

    /// Cached tiers, fetched on first use.
    pub async fn tiers(&self) -> Result<UserTiers, TierError> {
        self.cache.get().await.map_err(flatten_cache_error)
    }

    /// Refetch tiers, joining a fetch already running.
    pub async fn fetch_tiers(&self) -> Result<UserTiers, TierError> {
        self.cache.fetch().await.map_err(flatten_cache_error)
    }

    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    fn sdd_enabled(&self) -> bool {
        self.flags.is_enabled(FeatureFlag::SddEnabled)
    }

    pub async fn sdd_eligibility(&self, tier: Tier) -> EligibilityResponse {
        if tier == Tier::Tier2 {
            return EligibilityResponse {
                eligible: true,
                tier,
            };
        }
        if !self.sdd_enabled() {
            return EligibilityResponse {
                eligible: false,
                tier: Tier::Tier0,
            };
        }

        match self.client.check_sdd_eligibility().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, %tier, "SDD eligibility check failed");
                EligibilityResponse {
                    eligible: false,
                    tier,
                }
            }
        }
    }

    pub async fn is_sdd_eligible(&self, tier: Tier) -> bool {
        self.sdd_eligibility(tier).await.eligible
    }

    /// Whether a user at `tier` has passed SDD verification. Errors count as
    /// not verified.
    pub async fn is_sdd_verified(&self, tier: Tier, poll_until_complete: bool) -> bool {
        let never_cancelled = CancellationToken::new();
        match self
            .poll_sdd_verification(tier, poll_until_complete, &never_cancelled)
            .await
        {
            Ok(verified) => verified,
            Err(e) => {
                tracing::warn!(error = %e, %tier, "SDD verification check failed");
                false
            }
        }
    }

    /// Ask for the verification status, optionally re-asking every
    /// `poll_interval` until the backend task completes or `poll_deadline`
    /// passes. Gives up with `false` at the deadline.
    pub async fn poll_sdd_verification(
        &self,
        tier: Tier,
        poll_until_complete: bool,
        cancel: &CancellationToken,
    ) -> Result<bool, TierError> {
        match tier {
            Tier::Tier0 => return Ok(false),
            Tier::Tier2 => return Ok(true),
            Tier::Tier1 => {}
        }
        if !self.sdd_enabled() {
            return Ok(false);
        }

        let deadline = Instant::now() + self.config.poll_deadline;
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TierError::Cancelled),
                response = self.client.check_sdd_verification() => response?,
            };

            if !poll_until_complete || response.task_complete {
                tracing::debug!(attempts, verified = response.verified, "SDD verification settled");
                return Ok(response.verified);
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(attempts, "SDD verification still pending at deadline");
                return Ok(false);
            }

            let next_attempt = (now + self.config.poll_interval).min(deadline);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TierError::Cancelled),
                _ = tokio::time::sleep_until(next_attempt) => {}
            }
        }
    }

    /// SDD eligibility at the user's highest approved tier.
    pub async fn check_sdd_eligibility(&self) -> bool {
        match self.tiers().await {
            Ok(tiers) => self.is_sdd_eligible(tiers.latest_approved_tier()).await,
            Err(e) => {
                tracing::warn!(error = %e, "Could not load tiers for SDD eligibility");
                false
            }
        }
    }

    pub async fn check_sdd_verification(&self, poll_until_complete: bool) -> bool {
        match self.tiers().await {
            Ok(tiers) => {
                self.is_sdd_verified(tiers.latest_approved_tier(), poll_until_complete)
                    .await
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not load tiers for SDD verification");
                false
            }
        }
    }
}
