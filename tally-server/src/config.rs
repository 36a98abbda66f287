//! Wallet fixtures served by this process, keyed by wallet id.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tally_serve::WalletFixture;
use tally_serve::fixture::FixtureError;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("wallet '{wallet}' is invalid: {source}")]
    Invalid {
        wallet: String,
        #[source]
        source: FixtureError,
    },
}

/// Load and validate a JSON object mapping wallet ids to fixtures.
pub async fn load_wallets(path: &Path) -> Result<BTreeMap<String, WalletFixture>, ConfigError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let wallets: BTreeMap<String, WalletFixture> =
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    for (wallet, fixture) in &wallets {
        fixture.validate().map_err(|source| ConfigError::Invalid {
            wallet: wallet.clone(),
            source,
        })?;
    }

    tracing::info!(path = %path.display(), wallets = wallets.len(), "Loaded wallet fixtures");
    Ok(wallets)
}
