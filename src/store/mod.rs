//! Pending authorization store
//!
//! Process-wide state holding at most one in-flight transfer awaiting
//! biometric confirmation per session. No persistence: lost on restart,
//! which is acceptable because re-authorization is always re-triggerable.

use crate::error::AuthorizationError;
use crate::models::{PendingAuthorization, TransferIntent};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Trait for pending-authorization bookkeeping.
///
/// Mutated exclusively by the orchestrator under the single-flight
/// invariant: `open` fails while an entry exists for the session.
#[async_trait::async_trait]
pub trait PendingAuthorizationStore: Send + Sync {
    /// Open the single authorization slot for a session
    async fn open(
        &self,
        session_id: &str,
        intent: Option<TransferIntent>,
    ) -> Result<PendingAuthorization>;

    /// Clear the slot unconditionally; idempotent
    async fn resolve(&self, session_id: &str);

    /// Pure read of the current entry
    async fn current(&self, session_id: &str) -> Option<PendingAuthorization>;
}

/// In-memory store keyed by session id
pub struct InMemoryPendingStore {
    entries: Arc<RwLock<HashMap<String, PendingAuthorization>>>,
}

impl InMemoryPendingStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryPendingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PendingAuthorizationStore for InMemoryPendingStore {

    async fn open(
        &self,
        session_id: &str,
        intent: Option<TransferIntent>,
    ) -> Result<PendingAuthorization> {
        let mut entries = self.entries.write().await;

        if entries.contains_key(session_id) {
            return Err(AuthorizationError::ChallengeAlreadyOpen(
                session_id.to_string(),
            ));
        }

        let pending = PendingAuthorization {
            session_id: session_id.to_string(),
            intent,
            created_at: chrono::Utc::now(),
        };

        entries.insert(session_id.to_string(), pending.clone());
        Ok(pending)
    }

    async fn resolve(&self, session_id: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(session_id);
    }

    async fn current(&self, session_id: &str) -> Option<PendingAuthorization> {
        let entries = self.entries.read().await;
        entries.get(session_id).cloned()
    }
}
