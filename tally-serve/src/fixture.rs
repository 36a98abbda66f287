//! Collaborators backed by a JSON wallet description.
//!
//! Used by the server binary and by tests in place of real backend clients.
//! Amounts are written in major units (`"0.5"` BTC) and converted to minor
//! units using the currency's precision.

use crate::provider::{
    AccountDetailsProvider, CustodialBalance, CustodialBalancesProvider, FeatureFlag, FiatAccountsProvider,
    FiatBalance, KycClient, LegacyWallet, NetworkError, ProviderAccountDetails, ProviderError,
    StaticFeatureFlags,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tally_core::{CryptoCurrency, FiatCurrency};
use tally_fi::{EligibilityResponse, UserTier, UserTiers, VerificationResponse};

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("{currency} amount {amount} cannot be represented in minor units")]
    AmountOutOfRange {
        currency: CryptoCurrency,
        amount: Decimal,
    },
    #[error("unknown feature flag: {0}")]
    UnknownFeature(String),
    #[error("unknown provider in failure list: {0}")]
    UnknownProvider(String),
}

/// Provider names accepted in [`WalletFixture::failing`].
pub const PROVIDER_NAMES: [&str; 6] = ["ether", "pax", "stellar", "fiat", "custodial", "kyc"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletFixture {
    /// Delay before the wallet reports itself initialized.
    pub init_delay_ms: u64,
    /// Delay added to every remote provider call.
    pub latency_ms: u64,
    pub legacy: BTreeMap<CryptoCurrency, LegacyFixture>,
    pub ether: Option<DetailsFixture>,
    pub pax: Option<DetailsFixture>,
    pub stellar: Option<DetailsFixture>,
    pub fiat: Vec<FiatFixture>,
    pub custodial: Vec<CustodialFixture>,
    pub kyc: KycFixture,
    pub features: Vec<String>,
    /// Providers that fail every call.
    pub failing: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyFixture {
    pub default_index: u32,
    pub accounts: Vec<LegacyAccountFixture>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyAccountFixture {
    pub index: u32,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub balance: Decimal,
    #[serde(default = "active_by_default")]
    pub active: bool,
}

fn active_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailsFixture {
    pub address: String,
    #[serde(default)]
    pub balance: Decimal,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiatFixture {
    pub currency: FiatCurrency,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustodialFixture {
    pub currency: CryptoCurrency,
    #[serde(default)]
    pub trading: Decimal,
    #[serde(default)]
    pub interest: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KycFixture {
    pub tiers: Vec<UserTier>,
    pub sdd_eligible: bool,
    pub sdd_verified: bool,
    /// Number of verification checks answered with `taskComplete: false`
    /// before the task completes.
    pub verification_completes_after: u32,
}

/// Convert a major-unit amount into minor units.
pub fn to_minor(amount: Decimal, currency: CryptoCurrency) -> Result<u128, FixtureError> {
    let out_of_range = || FixtureError::AmountOutOfRange { currency, amount };
    let scale = Decimal::from(10u64.pow(currency.precision()));
    amount
        .checked_mul(scale)
        .filter(|minor| !minor.is_sign_negative() && minor.fract().is_zero())
        .and_then(|minor| minor.to_u128())
        .ok_or_else(out_of_range)
}

impl WalletFixture {
    /// Check everything that would otherwise fail lazily inside a provider.
    pub fn validate(&self) -> Result<(), FixtureError> {
        for (currency, legacy) in &self.legacy {
            for account in &legacy.accounts {
                to_minor(account.balance, *currency)?;
            }
        }
        let details = [
            (CryptoCurrency::Ethereum, &self.ether),
            (CryptoCurrency::Pax, &self.pax),
            (CryptoCurrency::Stellar, &self.stellar),
        ];
        for (currency, fixture) in details {
            if let Some(fixture) = fixture {
                to_minor(fixture.balance, currency)?;
            }
        }
        for custodial in &self.custodial {
            to_minor(custodial.trading, custodial.currency)?;
            if let Some(interest) = custodial.interest {
                to_minor(interest, custodial.currency)?;
            }
        }
        self.feature_flags()?;
        if let Some(unknown) = self.failing.iter().find(|name| !PROVIDER_NAMES.contains(&name.as_str())) {
            return Err(FixtureError::UnknownProvider(unknown.clone()));
        }
        Ok(())
    }

    pub fn feature_flags(&self) -> Result<StaticFeatureFlags, FixtureError> {
        let flags = self
            .features
            .iter()
            .map(|name| name.parse::<FeatureFlag>().map_err(|_| FixtureError::UnknownFeature(name.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(StaticFeatureFlags::new(flags))
    }

    fn fails(&self, provider: &str) -> bool {
        self.failing.iter().any(|name| name == provider)
    }

    fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

fn injected_failure(provider: &str) -> NetworkError {
    NetworkError::Transport(format!("{provider} unreachable"))
}

async fn simulate_latency(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}

/// The HD wallet part of a fixture.
pub struct FixtureWallet {
    legacy: BTreeMap<CryptoCurrency, LegacyFixture>,
    ether_address: Option<String>,
}

impl FixtureWallet {
    pub fn new(fixture: &WalletFixture) -> Self {
        Self {
            legacy: fixture.legacy.clone(),
            ether_address: fixture.ether.as_ref().map(|ether| ether.address.clone()),
        }
    }

    fn account(&self, currency: CryptoCurrency, index: u32) -> Option<&LegacyAccountFixture> {
        self.legacy
            .get(&currency)?
            .accounts
            .iter()
            .find(|account| account.index == index)
    }

    fn active(&self, currency: CryptoCurrency) -> impl Iterator<Item = &LegacyAccountFixture> {
        self.legacy
            .get(&currency)
            .into_iter()
            .flat_map(|legacy| legacy.accounts.iter())
            .filter(|account| account.active)
    }
}

impl LegacyWallet for FixtureWallet {
    fn active_account_count(&self, currency: CryptoCurrency) -> u32 {
        self.active(currency).count() as u32
    }

    fn index_of_active_account(&self, currency: CryptoCurrency, position: u32) -> Option<u32> {
        self.active(currency)
            .nth(position as usize)
            .map(|account| account.index)
    }

    fn receive_address(&self, currency: CryptoCurrency, index: u32) -> Option<String> {
        self.account(currency, index)?.address.clone()
    }

    fn label(&self, currency: CryptoCurrency, index: u32) -> Option<String> {
        self.account(currency, index)?.label.clone()
    }

    fn balance(&self, currency: CryptoCurrency, index: u32) -> u128 {
        self.account(currency, index)
            .and_then(|account| to_minor(account.balance, currency).ok())
            .unwrap_or_default()
    }

    fn default_account_index(&self, currency: CryptoCurrency) -> u32 {
        self.legacy
            .get(&currency)
            .map(|legacy| legacy.default_index)
            .unwrap_or_default()
    }

    fn ether_address(&self) -> Option<String> {
        self.ether_address.clone()
    }

    fn has_ether_account(&self) -> bool {
        self.ether_address.is_some()
    }
}

/// Single-account service (ether balance, token balance, Stellar account).
pub struct FixtureDetails {
    name: &'static str,
    currency: CryptoCurrency,
    details: Option<DetailsFixture>,
    failing: bool,
    latency: Duration,
}

impl FixtureDetails {
    fn new(
        name: &'static str,
        currency: CryptoCurrency,
        details: &Option<DetailsFixture>,
        fixture: &WalletFixture,
    ) -> Self {
        Self {
            name,
            currency,
            details: details.clone(),
            failing: fixture.fails(name),
            latency: fixture.latency(),
        }
    }

    fn current(&self) -> Result<ProviderAccountDetails, ProviderError> {
        if self.failing {
            return Err(injected_failure(self.name).into());
        }
        let details = self.details.as_ref().ok_or(ProviderError::NotFound)?;
        let balance_minor = to_minor(details.balance, self.currency)
            .map_err(|e| NetworkError::Decoding(e.to_string()))?;
        Ok(ProviderAccountDetails {
            address: details.address.clone(),
            balance_minor,
            name: details.name.clone(),
        })
    }
}

#[async_trait]
impl AccountDetailsProvider for FixtureDetails {
    async fn fetch_account_details(
        &self,
        _use_cache: bool,
    ) -> Result<ProviderAccountDetails, ProviderError> {
        simulate_latency(self.latency).await;
        self.current()
    }

    fn current_account(&self) -> Option<ProviderAccountDetails> {
        self.current().ok()
    }
}

pub struct FixtureFiat {
    balances: Vec<FiatFixture>,
    failing: bool,
    latency: Duration,
}

#[async_trait]
impl FiatAccountsProvider for FixtureFiat {
    async fn fiat_balances(&self) -> Result<Vec<FiatBalance>, ProviderError> {
        simulate_latency(self.latency).await;
        if self.failing {
            return Err(injected_failure("fiat").into());
        }
        Ok(self
            .balances
            .iter()
            .map(|balance| FiatBalance {
                currency: balance.currency,
                amount: balance.amount,
            })
            .collect())
    }
}

pub struct FixtureCustodial {
    balances: Vec<CustodialFixture>,
    failing: bool,
    latency: Duration,
}

#[async_trait]
impl CustodialBalancesProvider for FixtureCustodial {
    async fn custodial_balances(&self) -> Result<Vec<CustodialBalance>, ProviderError> {
        simulate_latency(self.latency).await;
        if self.failing {
            return Err(injected_failure("custodial").into());
        }
        self.balances
            .iter()
            .map(|balance| -> Result<CustodialBalance, FixtureError> {
                let trading_minor = to_minor(balance.trading, balance.currency)?;
                let interest_minor = balance
                    .interest
                    .map(|interest| to_minor(interest, balance.currency))
                    .transpose()?;
                Ok(CustodialBalance {
                    currency: balance.currency,
                    trading_minor,
                    interest_minor,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| NetworkError::Decoding(e.to_string()).into())
    }
}

/// KYC backend. Counts verification checks so a fixture can make the
/// verification task complete after a number of polls.
pub struct FixtureKyc {
    kyc: KycFixture,
    failing: bool,
    latency: Duration,
    verification_checks: AtomicU32,
}

impl FixtureKyc {
    pub fn verification_checks(&self) -> u32 {
        self.verification_checks.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), NetworkError> {
        if self.failing {
            return Err(injected_failure("kyc"));
        }
        Ok(())
    }
}

#[async_trait]
impl KycClient for FixtureKyc {
    async fn fetch_tiers(&self) -> Result<UserTiers, NetworkError> {
        simulate_latency(self.latency).await;
        self.check()?;
        Ok(UserTiers::new(self.kyc.tiers.clone()))
    }

    async fn check_sdd_eligibility(&self) -> Result<EligibilityResponse, NetworkError> {
        simulate_latency(self.latency).await;
        self.check()?;
        Ok(EligibilityResponse {
            eligible: self.kyc.sdd_eligible,
            tier: UserTiers::new(self.kyc.tiers.clone()).latest_approved_tier(),
        })
    }

    async fn check_sdd_verification(&self) -> Result<VerificationResponse, NetworkError> {
        simulate_latency(self.latency).await;
        self.check()?;
        let previous = self.verification_checks.fetch_add(1, Ordering::SeqCst);
        let task_complete = previous >= self.kyc.verification_completes_after;
        Ok(VerificationResponse {
            verified: task_complete && self.kyc.sdd_verified,
            task_complete,
        })
    }
}

/// Every collaborator a wallet session needs, built from one fixture.
pub struct FixtureProviders {
    pub wallet: Arc<FixtureWallet>,
    pub ether: Arc<FixtureDetails>,
    pub pax: Arc<FixtureDetails>,
    pub stellar: Arc<FixtureDetails>,
    pub fiat: Arc<FixtureFiat>,
    pub custodial: Arc<FixtureCustodial>,
    pub kyc: Arc<FixtureKyc>,
    pub flags: Arc<StaticFeatureFlags>,
}

impl FixtureProviders {
    pub fn new(fixture: &WalletFixture) -> Result<Self, FixtureError> {
        fixture.validate()?;
        let latency = fixture.latency();

        Ok(Self {
            wallet: Arc::new(FixtureWallet::new(fixture)),
            ether: Arc::new(FixtureDetails::new("ether", CryptoCurrency::Ethereum, &fixture.ether, fixture)),
            pax: Arc::new(FixtureDetails::new("pax", CryptoCurrency::Pax, &fixture.pax, fixture)),
            stellar: Arc::new(FixtureDetails::new(
                "stellar",
                CryptoCurrency::Stellar,
                &fixture.stellar,
                fixture,
            )),
            fiat: Arc::new(FixtureFiat {
                balances: fixture.fiat.clone(),
                failing: fixture.fails("fiat"),
                latency,
            }),
            custodial: Arc::new(FixtureCustodial {
                balances: fixture.custodial.clone(),
                failing: fixture.fails("custodial"),
                latency,
            }),
            kyc: Arc::new(FixtureKyc {
                kyc: fixture.kyc.clone(),
                failing: fixture.fails("kyc"),
                latency,
                verification_checks: AtomicU32::new(0),
            }),
            flags: Arc::new(fixture.feature_flags()?),
        })
    }
}
