//! Wallet session manager
//!
//! Keeps one `WalletSession` per wallet id so repeated requests for the same
//! wallet share its account cache and tier cache. Sessions are created on
//! first use from the loaded fixtures and dropped on logout.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tally_serve::fixture::FixtureError;
use tally_serve::{SessionConfig, WalletFixture, WalletSession};
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("unknown wallet: {0}")]
    UnknownWallet(String),
    #[error(transparent)]
    Fixture(#[from] FixtureError),
}

#[derive(Clone)]
pub struct SessionManager {
    fixtures: Arc<BTreeMap<String, WalletFixture>>,
    config: SessionConfig,
    sessions: Arc<RwLock<HashMap<String, Arc<WalletSession>>>>,
}

impl SessionManager {
    pub fn new(fixtures: BTreeMap<String, WalletFixture>, config: SessionConfig) -> Self {
        Self {
            fixtures: Arc::new(fixtures),
            config,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get or create the session for a wallet id
    pub async fn get_or_create(&self, wallet_id: &str) -> Result<Arc<WalletSession>, SessionError> {
        if let Some(session) = self.sessions.read().await.get(wallet_id) {
            return Ok(session.clone());
        }

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(wallet_id) {
            return Ok(session.clone());
        }

        let fixture = self
            .fixtures
            .get(wallet_id)
            .ok_or_else(|| SessionError::UnknownWallet(wallet_id.to_string()))?;
        let session = Arc::new(WalletSession::from_fixture(
            wallet_id,
            fixture,
            self.config.clone(),
        )?);
        tracing::info!("📝 Creating new session for wallet: {}", wallet_id);
        sessions.insert(wallet_id.to_string(), session.clone());

        Ok(session)
    }

    /// Clear and drop a session. Returns whether one existed.
    pub async fn remove(&self, wallet_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(wallet_id);
        match removed {
            Some(session) => {
                session.clear_on_logout();
                tracing::info!("🗑️  Removed session for wallet: {}", wallet_id);
                true
            }
            None => false,
        }
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }
}
