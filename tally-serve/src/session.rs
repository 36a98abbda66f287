use crate::aggregator::{AccountAggregator, AggregatorConfig};
use crate::fixture::{FixtureError, FixtureProviders, WalletFixture};
use crate::provider::{
    AccountDetailsProvider, CustodialBalancesProvider, FeatureFlags, FiatAccountsProvider, InitializationSignal,
    KycClient, LegacyWallet,
};
use crate::resolver::TransactionTargets;
use crate::source::AssetAccountSource;
use crate::sources::{
    CustodialSource, EtherSource, ExternalNetworkSource, FiatSource, LegacyChainSource, TokenSource,
};
use crate::tier_gate::{TierGate, TierGateConfig};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tally_core::CryptoCurrency;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub aggregator: AggregatorConfig,
    pub tier_gate: TierGateConfig,
}

/// Collaborators behind the standard source set.
pub struct Collaborators {
    pub wallet: Arc<dyn LegacyWallet>,
    pub ether: Arc<dyn AccountDetailsProvider>,
    pub pax: Arc<dyn AccountDetailsProvider>,
    pub stellar: Arc<dyn AccountDetailsProvider>,
    pub fiat: Arc<dyn FiatAccountsProvider>,
    pub custodial: Arc<dyn CustodialBalancesProvider>,
    pub kyc: Arc<dyn KycClient>,
    pub flags: Arc<dyn FeatureFlags>,
}

impl From<FixtureProviders> for Collaborators {
    fn from(providers: FixtureProviders) -> Self {
        Self {
            wallet: providers.wallet,
            ether: providers.ether,
            pax: providers.pax,
            stellar: providers.stellar,
            fiat: providers.fiat,
            custodial: providers.custodial,
            kyc: providers.kyc,
            flags: providers.flags,
        }
    }
}

/// Sources in display order: BTC, BCH, ETH, PAX, XLM, fiat, custodial.
pub fn standard_sources(collaborators: &Collaborators) -> Vec<Arc<dyn AssetAccountSource>> {
    vec![
        Arc::new(LegacyChainSource::new(CryptoCurrency::Bitcoin, collaborators.wallet.clone())),
        Arc::new(LegacyChainSource::new(CryptoCurrency::BitcoinCash, collaborators.wallet.clone())),
        Arc::new(EtherSource::new(collaborators.wallet.clone(), collaborators.ether.clone())),
        Arc::new(TokenSource::new(CryptoCurrency::Pax, collaborators.pax.clone())),
        Arc::new(ExternalNetworkSource::new(CryptoCurrency::Stellar, collaborators.stellar.clone())),
        Arc::new(FiatSource::new(collaborators.fiat.clone())),
        Arc::new(CustodialSource::new(collaborators.custodial.clone())),
    ]
}

/// Everything scoped to one logged-in wallet.
pub struct WalletSession {
    id: String,
    signal: Arc<InitializationSignal>,
    aggregator: AccountAggregator,
    tier_gate: Arc<TierGate>,
    targets: TransactionTargets,
    startup: Mutex<Option<JoinHandle<()>>>,
}

impl WalletSession {
    pub fn new(
        id: impl Into<String>,
        signal: Arc<InitializationSignal>,
        collaborators: Collaborators,
        config: SessionConfig,
    ) -> Self {
        let aggregator = AccountAggregator::new(
            standard_sources(&collaborators),
            signal.clone(),
            config.aggregator,
        );
        let tier_gate = Arc::new(TierGate::new(
            collaborators.kyc,
            collaborators.flags,
            config.tier_gate,
        ));
        let targets = TransactionTargets::new(aggregator.clone(), tier_gate.clone());

        Self {
            id: id.into(),
            signal,
            aggregator,
            tier_gate,
            targets,
            startup: Mutex::new(None),
        }
    }

    /// Build a session over fixture providers. The wallet reports itself
    /// initialized after the fixture's `init_delay_ms`, then sources are
    /// warmed up.
    pub fn from_fixture(
        id: impl Into<String>,
        fixture: &WalletFixture,
        config: SessionConfig,
    ) -> Result<Self, FixtureError> {
        let providers = FixtureProviders::new(fixture)?;
        let session = Self::new(id, Arc::new(InitializationSignal::new()), providers.into(), config);
        session.start(Duration::from_millis(fixture.init_delay_ms));
        Ok(session)
    }

    fn start(&self, init_delay: Duration) {
        let id = self.id.clone();
        let signal = self.signal.clone();
        let aggregator = self.aggregator.clone();

        let handle = tokio::spawn(async move {
            if !init_delay.is_zero() {
                tokio::time::sleep(init_delay).await;
            }
            signal.mark_initialized();
            tracing::info!(wallet = %id, "Wallet initialized");

            if let Err(e) = aggregator.initialize_sources().await {
                tracing::warn!(wallet = %id, error = %e, "Source warm-up failed");
            }
        });

        if let Ok(mut startup) = self.startup.lock() {
            *startup = Some(handle);
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn signal(&self) -> &Arc<InitializationSignal> {
        &self.signal
    }

    pub fn aggregator(&self) -> &AccountAggregator {
        &self.aggregator
    }

    pub fn tier_gate(&self) -> &Arc<TierGate> {
        &self.tier_gate
    }

    pub fn targets(&self) -> &TransactionTargets {
        &self.targets
    }

    /// Drop cached accounts and tiers and mark the wallet uninitialized.
    pub fn clear_on_logout(&self) {
        if let Ok(mut startup) = self.startup.lock() {
            if let Some(handle) = startup.take() {
                handle.abort();
            }
        }
        self.aggregator.clear();
        self.tier_gate.clear();
        self.signal.reset();
        tracing::info!(wallet = %self.id, "Session cleared");
    }
}
