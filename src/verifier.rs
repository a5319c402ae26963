//! Backend face-verification client
//!
//! Sends one captured still plus the pending transfer context to the
//! banking backend and returns its verdict. Uses a long-lived
//! reqwest::Client for connection pooling.

use crate::error::AuthorizationError;
use crate::models::{VerificationVerdict, TransferResult};
use crate::Result;
use reqwest::Client;
use serde::Serialize;
use std::collections::VecDeque;
use std::env;
use std::time::Duration;
use tracing::{error, info};

/// One verification request as the backend expects it
#[derive(Debug, Clone, Serialize)]
pub struct VerifyFaceRequest {
    /// Captured still as a data-URL string
    pub image: String,
    pub user_id: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_minor_units: Option<i64>,
}

/// Capability interface for the verification backend.
///
/// Exactly one call per submitted attempt; the caller decides how a
/// transport error is surfaced to the user.
#[async_trait::async_trait]
pub trait FaceVerifier: Send + Sync {
    async fn verify(&self, request: &VerifyFaceRequest) -> Result<VerificationVerdict>;
}

/// HTTP verifier posting to `POST {base}/verify-face`
pub struct HttpFaceVerifier {
    client: Client,
    base_url: String,
}

impl HttpFaceVerifier {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Build from `BANKING_BACKEND_URL`
    pub fn from_env() -> Result<Self> {
        let base_url = env::var("BANKING_BACKEND_URL").map_err(|_| {
            AuthorizationError::ConfigError(
                "BANKING_BACKEND_URL is not configured".to_string(),
            )
        })?;

        Ok(Self::new(base_url))
    }
}

#[async_trait::async_trait]
impl FaceVerifier for HttpFaceVerifier {
    async fn verify(&self, request: &VerifyFaceRequest) -> Result<VerificationVerdict> {
        let url = format!("{}/verify-face", self.base_url);

        info!(session_id = %request.session_id, "Submitting face verification");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!("Verification request failed: {}", e);
                AuthorizationError::VerificationError(format!(
                    "verify-face request failed: {}",
                    e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Verification backend returned {}: {}", status, body);
            return Err(AuthorizationError::VerificationError(format!(
                "verify-face returned {}",
                status
            )));
        }

        let verdict = response.json::<VerificationVerdict>().await.map_err(|e| {
            error!("Failed to parse verification response: {}", e);
            AuthorizationError::VerificationError(format!(
                "invalid verify-face response: {}",
                e
            ))
        })?;

        info!(
            verified = verdict.verified,
            has_transfer = verdict.transfer.is_some(),
            "Verification verdict received"
        );

        Ok(verdict)
    }
}

/// Scripted verifier for development and testing.
///
/// Pops queued outcomes in order, then keeps returning the fallback.
pub struct ScriptedVerifier {
    queue: tokio::sync::Mutex<VecDeque<Result<VerificationVerdict>>>,
    fallback: VerificationVerdict,
}

impl ScriptedVerifier {
    pub fn new(fallback: VerificationVerdict) -> Self {
        Self {
            queue: tokio::sync::Mutex::new(VecDeque::new()),
            fallback,
        }
    }

    /// Always verifies, carrying the given executed transfer
    pub fn approving(transfer: TransferResult) -> Self {
        Self::new(VerificationVerdict {
            verified: true,
            reason: None,
            transfer: Some(transfer),
        })
    }

    /// Always denies with the given reason
    pub fn denying(reason: &str) -> Self {
        Self::new(VerificationVerdict::denied(reason))
    }

    pub async fn push(&self, outcome: Result<VerificationVerdict>) {
        self.queue.lock().await.push_back(outcome);
    }
}

#[async_trait::async_trait]
impl FaceVerifier for ScriptedVerifier {
    async fn verify(&self, _request: &VerifyFaceRequest) -> Result<VerificationVerdict> {
        let mut queue = self.queue.lock().await;
        match queue.pop_front() {
            Some(outcome) => outcome,
            None => Ok(self.fallback.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransferStatus;

    #[test]
    fn test_request_serialization() {
        let request = VerifyFaceRequest {
            image: "data:image/jpeg;base64,abc".to_string(),
            user_id: "1".to_string(),
            session_id: "chat_1".to_string(),
            recipient_reference: Some("0987654321".to_string()),
            amount_minor_units: Some(500_000),
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("chat_1"));
        assert!(json.contains("0987654321"));

        // Optional context fields are omitted entirely when absent
        let bare = VerifyFaceRequest {
            recipient_reference: None,
            amount_minor_units: None,
            ..request
        };
        let json = serde_json::to_string(&bare).unwrap();
        assert!(!json.contains("recipient_reference"));
    }

    #[tokio::test]
    async fn test_scripted_verifier_queue_then_fallback() {
        let verifier = ScriptedVerifier::denying("face mismatch");
        verifier
            .push(Ok(VerificationVerdict {
                verified: true,
                reason: None,
                transfer: Some(TransferResult {
                    status: TransferStatus::Success,
                    message: "Sent".to_string(),
                    new_balance_display: "₦45,000".to_string(),
                }),
            }))
            .await;

        let request = VerifyFaceRequest {
            image: String::new(),
            user_id: "1".to_string(),
            session_id: "s".to_string(),
            recipient_reference: None,
            amount_minor_units: None,
        };

        let first = verifier.verify(&request).await.unwrap();
        assert!(first.verified);

        let second = verifier.verify(&request).await.unwrap();
        assert!(!second.verified);
        assert_eq!(second.reason.as_deref(), Some("face mismatch"));
    }
}
