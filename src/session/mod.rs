//! Session contexts and the per-process session registry
//!
//! A session is one continuous voice or chat interaction tied to a single
//! authenticated user. Each session owns its orchestrator; the registry
//! expires idle sessions so abandoned challenges do not linger.

use crate::agent::AuthorizationOrchestrator;
use crate::channel::BufferedChannel;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Default inactivity timeout (5 minutes)
pub const DEFAULT_SESSION_TIMEOUT_SECS: i64 = 300;

/// Explicit per-session identity passed to the orchestrator
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub user_id: String,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
        }
    }

    /// Conventional chat session id for a user
    pub fn for_chat_user(user_id: &str) -> Self {
        Self::new(format!("chat_{}", user_id), user_id)
    }
}

/// A session's orchestrator plus its outbound line buffer
#[derive(Clone)]
pub struct SessionHandle {
    pub orchestrator: Arc<AuthorizationOrchestrator>,
    pub channel: Arc<BufferedChannel>,
}

struct SessionEntry {
    handle: SessionHandle,
    last_activity: DateTime<Utc>,
}

/// Registry of live sessions with inactivity expiry
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
    timeout: Duration,
    factory: Box<dyn Fn(SessionContext) -> SessionHandle + Send + Sync>,
}

impl SessionRegistry {
    pub fn new(factory: Box<dyn Fn(SessionContext) -> SessionHandle + Send + Sync>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            timeout: Duration::seconds(DEFAULT_SESSION_TIMEOUT_SECS),
            factory,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: i64) -> Self {
        self.timeout = Duration::seconds(timeout_secs);
        self
    }

    /// Fetch the session's handle, creating or replacing an expired one
    pub async fn get_or_create(&self, context: SessionContext) -> SessionHandle {
        let now = Utc::now();
        let session_id = context.session_id.clone();

        {
            let mut sessions = self.sessions.write().await;

            if let Some(entry) = sessions.get_mut(&session_id) {
                if now - entry.last_activity <= self.timeout {
                    entry.last_activity = now;
                    return entry.handle.clone();
                }
                debug!(session_id = %session_id, "Session expired, creating new");
                sessions.remove(&session_id);
            }
        }

        info!(session_id = %session_id, "Creating new session");
        let handle = (self.factory)(context);

        let mut sessions = self.sessions.write().await;
        sessions.insert(
            session_id,
            SessionEntry {
                handle: handle.clone(),
                last_activity: now,
            },
        );

        handle
    }

    /// Drop a session outright
    pub async fn clear(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(session_id).is_some() {
            debug!(session_id = %session_id, "Session cleared");
        }
    }

    /// Remove all expired sessions; returns how many were dropped
    pub async fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;

        let before = sessions.len();
        sessions.retain(|_, entry| now - entry.last_activity <= self.timeout);
        let removed = before - sessions.len();

        if removed > 0 {
            info!(removed, "Cleaned up expired sessions");
        }
        removed
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biometric::StaticCamera;
    use crate::channel::BufferedChannel;
    use crate::intent::{BeneficiaryDirectory, IntentExtractor};
    use crate::store::InMemoryPendingStore;
    use crate::verifier::ScriptedVerifier;

    fn registry(timeout_secs: i64) -> SessionRegistry {
        SessionRegistry::new(Box::new(|context| {
            let channel = Arc::new(BufferedChannel::new());
            let orchestrator = Arc::new(AuthorizationOrchestrator::new(
                context,
                IntentExtractor::new(BeneficiaryDirectory::with_defaults()),
                Arc::new(InMemoryPendingStore::new()),
                Arc::new(StaticCamera::with_frame("data:image/jpeg;base64,abc")),
                Arc::new(ScriptedVerifier::denying("no")),
                channel.clone(),
            ));
            SessionHandle {
                orchestrator,
                channel,
            }
        }))
        .with_timeout(timeout_secs)
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_live_session() {
        let registry = registry(DEFAULT_SESSION_TIMEOUT_SECS);

        let first = registry
            .get_or_create(SessionContext::for_chat_user("1"))
            .await;
        let second = registry
            .get_or_create(SessionContext::for_chat_user("1"))
            .await;

        assert!(Arc::ptr_eq(&first.orchestrator, &second.orchestrator));
        assert_eq!(registry.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_expired_session_is_replaced() {
        // Zero timeout: every lookup sees the previous entry as expired
        let registry = registry(0);

        let first = registry
            .get_or_create(SessionContext::for_chat_user("1"))
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = registry
            .get_or_create(SessionContext::for_chat_user("1"))
            .await;

        assert!(!Arc::ptr_eq(&first.orchestrator, &second.orchestrator));
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let registry = registry(0);
        registry
            .get_or_create(SessionContext::for_chat_user("1"))
            .await;
        registry
            .get_or_create(SessionContext::for_chat_user("2"))
            .await;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let removed = registry.cleanup_expired().await;
        assert_eq!(removed, 2);
        assert_eq!(registry.active_count().await, 0);
    }
}
