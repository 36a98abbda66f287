pub mod aggregator;
pub mod fixture;
pub mod provider;
pub mod resolver;
pub mod session;
pub mod source;
pub mod sources;
pub mod tier_gate;

pub use aggregator::{
    AccountAggregator, AggregateError, AggregateReport, AggregatorConfig, InitializationMode,
    SourceFailure,
};
pub use fixture::WalletFixture;
pub use provider::{InitializationSignal, NetworkError, ProviderError, WalletReadiness};
pub use resolver::{ResolverError, TargetError, TransactionTargets, valid_targets};
pub use session::{Collaborators, SessionConfig, WalletSession, standard_sources};
pub use source::{AssetAccountSource, FailurePolicy, SourceError, SourceErrorReason};
pub use tier_gate::{TierError, TierGate, TierGateConfig};
