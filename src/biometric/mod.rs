//! Biometric challenge controller
//!
//! Owns the lifecycle of a single verification attempt: acquire one still
//! image, submit it with the pending authorization context, interpret the
//! verdict. Exactly one capture request and one network call per
//! submission cycle.

use crate::error::AuthorizationError;
use crate::models::{AttemptStatus, BiometricAttempt, PendingAuthorization, VerificationVerdict};
use crate::verifier::{FaceVerifier, VerifyFaceRequest};
use crate::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const CAPTURE_UNAVAILABLE_REASON: &str = "could not capture image";
pub const NETWORK_ERROR_REASON: &str = "network error";

/// Capability interface: produce one still image.
///
/// Returns a data-URL string, or `None` when the device yields nothing.
#[async_trait::async_trait]
pub trait CameraCapture: Send + Sync {
    async fn capture_still(&self) -> Result<Option<String>>;
}

/// Fixed-frame camera for development and testing
pub struct StaticCamera {
    frame: Option<String>,
}

impl StaticCamera {
    pub fn with_frame(frame: &str) -> Self {
        Self {
            frame: Some(frame.to_string()),
        }
    }

    /// Camera that never produces an image
    pub fn unavailable() -> Self {
        Self { frame: None }
    }
}

#[async_trait::async_trait]
impl CameraCapture for StaticCamera {
    async fn capture_still(&self) -> Result<Option<String>> {
        Ok(self.frame.clone())
    }
}

struct AttemptSlot {
    next_token: u64,
    current: Option<BiometricAttempt>,
}

/// Controller for the single live attempt of an open challenge.
///
/// Attempts carry a monotonic token; any result that lands after the
/// attempt it belongs to was discarded is dropped instead of applied.
pub struct BiometricController {
    camera: Arc<dyn CameraCapture>,
    verifier: Arc<dyn FaceVerifier>,
    slot: Mutex<AttemptSlot>,
}

impl BiometricController {
    pub fn new(camera: Arc<dyn CameraCapture>, verifier: Arc<dyn FaceVerifier>) -> Self {
        Self {
            camera,
            verifier,
            slot: Mutex::new(AttemptSlot {
                next_token: 1,
                current: None,
            }),
        }
    }

    /// Open a fresh attempt awaiting its capture
    pub async fn open(&self) -> Result<BiometricAttempt> {
        let mut slot = self.slot.lock().await;

        let token = slot.next_token;
        slot.next_token += 1;

        let attempt = BiometricAttempt {
            token,
            status: AttemptStatus::Capturing,
            failure_reason: None,
            frame: None,
        };
        slot.current = Some(attempt.clone());

        debug!(token, "Biometric attempt opened");
        Ok(attempt)
    }

    /// User confirmed: request one still from the camera and submit it.
    ///
    /// No frame from the camera becomes an immediate retryable denial
    /// with no network call made.
    pub async fn capture_and_submit(
        &self,
        pending: &PendingAuthorization,
        user_id: &str,
    ) -> Result<Option<VerificationVerdict>> {
        let token = self.require_capturing().await?;

        let frame = self.camera.capture_still().await.unwrap_or_else(|e| {
            warn!("Camera capture failed: {}", e);
            None
        });

        let Some(frame) = frame else {
            warn!(token, "No image captured; denying without network call");
            let verdict = VerificationVerdict::denied(CAPTURE_UNAVAILABLE_REASON);
            return Ok(self.apply_verdict(token, verdict).await);
        };

        self.submit_inner(token, frame, pending, user_id).await
    }

    /// User confirmed with a frame the surface captured itself
    pub async fn submit_frame(
        &self,
        frame: String,
        pending: &PendingAuthorization,
        user_id: &str,
    ) -> Result<Option<VerificationVerdict>> {
        let token = self.require_capturing().await?;
        self.submit_inner(token, frame, pending, user_id).await
    }

    /// User-initiated retry after a failed attempt: back to capturing.
    pub async fn retry(&self) -> Result<BiometricAttempt> {
        let mut slot = self.slot.lock().await;

        let attempt = slot
            .current
            .as_mut()
            .ok_or(AuthorizationError::NoOpenAttempt)?;
        if !attempt.is_retryable() {
            return Err(AuthorizationError::VerificationError(
                "attempt is not in a retryable state".to_string(),
            ));
        }

        attempt.status = AttemptStatus::Capturing;
        attempt.failure_reason = None;
        attempt.frame = None;

        debug!(token = attempt.token, "Biometric attempt reset for retry");
        Ok(attempt.clone())
    }

    /// Abort any in-flight capture or verification and discard the attempt.
    /// Disposition of the pending authorization is the orchestrator's call.
    pub async fn cancel(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(attempt) = slot.current.take() {
            info!(token = attempt.token, "Biometric attempt cancelled");
        }
    }

    /// Destroy the attempt after the challenge resolved
    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(attempt) = slot.current.take() {
            debug!(token = attempt.token, "Biometric attempt closed");
        }
    }

    /// Snapshot of the live attempt, if any
    pub async fn current(&self) -> Option<BiometricAttempt> {
        self.slot.lock().await.current.clone()
    }

    async fn require_capturing(&self) -> Result<u64> {
        let slot = self.slot.lock().await;
        let attempt = slot
            .current
            .as_ref()
            .ok_or(AuthorizationError::NoOpenAttempt)?;

        match attempt.status {
            AttemptStatus::Capturing => Ok(attempt.token),
            AttemptStatus::Verifying => Err(AuthorizationError::VerificationError(
                "verification already in flight".to_string(),
            )),
            _ => Err(AuthorizationError::VerificationError(format!(
                "attempt is {}, not awaiting capture",
                attempt.status
            ))),
        }
    }

    /// One network call; the slot lock is not held across the await so a
    /// cancel can land while the backend is working.
    async fn submit_inner(
        &self,
        token: u64,
        frame: String,
        pending: &PendingAuthorization,
        user_id: &str,
    ) -> Result<Option<VerificationVerdict>> {
        {
            let mut slot = self.slot.lock().await;
            let Some(attempt) = slot.current.as_mut().filter(|a| a.token == token) else {
                return Ok(None);
            };
            attempt.status = AttemptStatus::Verifying;
            attempt.failure_reason = None;
            attempt.frame = Some(frame.clone());
        }

        let request = VerifyFaceRequest {
            image: frame,
            user_id: user_id.to_string(),
            session_id: pending.session_id.clone(),
            recipient_reference: pending
                .intent
                .as_ref()
                .map(|i| i.recipient_reference.clone()),
            amount_minor_units: pending.intent.as_ref().map(|i| i.amount_minor_units),
        };

        info!(token, session_id = %pending.session_id, "Submitting attempt");

        // Transport failures are retryable, not fatal
        let verdict = match self.verifier.verify(&request).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(token, "Verification transport error: {}", e);
                VerificationVerdict::denied(NETWORK_ERROR_REASON)
            }
        };

        Ok(self.apply_verdict(token, verdict).await)
    }

    /// Record the verdict on the attempt it belongs to; a stale token
    /// means the attempt was discarded and the verdict is dropped.
    async fn apply_verdict(
        &self,
        token: u64,
        verdict: VerificationVerdict,
    ) -> Option<VerificationVerdict> {
        let mut slot = self.slot.lock().await;
        let Some(attempt) = slot.current.as_mut().filter(|a| a.token == token) else {
            info!(token, "Discarding verdict for discarded attempt");
            return None;
        };

        if verdict.verified {
            attempt.status = AttemptStatus::Success;
        } else {
            attempt.status = AttemptStatus::Failed;
            attempt.failure_reason = verdict.reason.clone();
        }

        Some(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TransferIntent, TransferResult, TransferStatus};
    use crate::verifier::ScriptedVerifier;
    use chrono::Utc;

    fn pending() -> PendingAuthorization {
        PendingAuthorization {
            session_id: "chat_1".to_string(),
            intent: Some(TransferIntent {
                recipient_reference: "0987654321".to_string(),
                amount_minor_units: 500_000,
            }),
            created_at: Utc::now(),
        }
    }

    fn approving_verifier() -> Arc<ScriptedVerifier> {
        Arc::new(ScriptedVerifier::approving(TransferResult {
            status: TransferStatus::Success,
            message: "Transfer complete".to_string(),
            new_balance_display: "₦45,000".to_string(),
        }))
    }

    #[tokio::test]
    async fn test_open_awaits_capture() {
        let controller = BiometricController::new(
            Arc::new(StaticCamera::with_frame("data:image/jpeg;base64,abc")),
            approving_verifier(),
        );

        let attempt = controller.open().await.unwrap();
        assert_eq!(attempt.status, AttemptStatus::Capturing);
        assert!(attempt.frame.is_none());
    }

    #[tokio::test]
    async fn test_capture_unavailable_denies_without_network() {
        // A verifier verdict would be `verified: false` with this reason,
        // so seeing the capture reason proves no network call was made
        let verifier = Arc::new(ScriptedVerifier::denying("backend was called"));
        let controller =
            BiometricController::new(Arc::new(StaticCamera::unavailable()), verifier);

        controller.open().await.unwrap();
        let verdict = controller
            .capture_and_submit(&pending(), "1")
            .await
            .unwrap()
            .unwrap();

        assert!(!verdict.verified);
        assert_eq!(verdict.reason.as_deref(), Some(CAPTURE_UNAVAILABLE_REASON));

        let attempt = controller.current().await.unwrap();
        assert_eq!(attempt.status, AttemptStatus::Failed);
        assert!(attempt.is_retryable());
    }

    #[tokio::test]
    async fn test_capture_and_submit_success() {
        let controller = BiometricController::new(
            Arc::new(StaticCamera::with_frame("data:image/jpeg;base64,abc")),
            approving_verifier(),
        );

        controller.open().await.unwrap();
        let verdict = controller
            .capture_and_submit(&pending(), "1")
            .await
            .unwrap()
            .unwrap();
        assert!(verdict.verified);

        let attempt = controller.current().await.unwrap();
        assert_eq!(attempt.status, AttemptStatus::Success);
    }

    #[tokio::test]
    async fn test_submit_client_frame() {
        let controller = BiometricController::new(
            Arc::new(StaticCamera::unavailable()),
            approving_verifier(),
        );

        controller.open().await.unwrap();
        let verdict = controller
            .submit_frame("data:image/jpeg;base64,xyz".to_string(), &pending(), "1")
            .await
            .unwrap()
            .unwrap();
        assert!(verdict.verified);
    }

    #[tokio::test]
    async fn test_denied_then_manual_retry() {
        let verifier = Arc::new(ScriptedVerifier::denying("face mismatch"));
        let controller = BiometricController::new(
            Arc::new(StaticCamera::with_frame("data:image/jpeg;base64,abc")),
            verifier,
        );

        controller.open().await.unwrap();
        let verdict = controller
            .capture_and_submit(&pending(), "1")
            .await
            .unwrap()
            .unwrap();
        assert!(!verdict.verified);

        let failed = controller.current().await.unwrap();
        assert_eq!(failed.status, AttemptStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("face mismatch"));

        // Explicit user action resets to capturing; no automatic retry
        let retried = controller.retry().await.unwrap();
        assert_eq!(retried.status, AttemptStatus::Capturing);
        assert!(retried.failure_reason.is_none());
    }

    #[tokio::test]
    async fn test_retry_requires_failed_attempt() {
        let controller = BiometricController::new(
            Arc::new(StaticCamera::with_frame("data:image/jpeg;base64,abc")),
            approving_verifier(),
        );

        assert!(matches!(
            controller.retry().await,
            Err(AuthorizationError::NoOpenAttempt)
        ));

        controller.open().await.unwrap();
        assert!(controller.retry().await.is_err());
    }

    #[tokio::test]
    async fn test_transport_error_becomes_retryable_denial() {
        let verifier = Arc::new(ScriptedVerifier::denying("fallback"));
        verifier
            .push(Err(AuthorizationError::VerificationError(
                "connection refused".to_string(),
            )))
            .await;
        let controller = BiometricController::new(
            Arc::new(StaticCamera::with_frame("data:image/jpeg;base64,abc")),
            verifier,
        );

        controller.open().await.unwrap();
        let verdict = controller
            .capture_and_submit(&pending(), "1")
            .await
            .unwrap()
            .unwrap();
        assert!(!verdict.verified);
        assert_eq!(verdict.reason.as_deref(), Some(NETWORK_ERROR_REASON));

        let attempt = controller.current().await.unwrap();
        assert!(attempt.is_retryable());
    }

    #[tokio::test]
    async fn test_cancel_discards_attempt() {
        let controller = BiometricController::new(
            Arc::new(StaticCamera::with_frame("data:image/jpeg;base64,abc")),
            approving_verifier(),
        );

        controller.open().await.unwrap();
        controller.cancel().await;
        assert!(controller.current().await.is_none());

        let result = controller.capture_and_submit(&pending(), "1").await;
        assert!(matches!(result, Err(AuthorizationError::NoOpenAttempt)));
    }

    #[tokio::test]
    async fn test_reopened_attempt_gets_fresh_token() {
        let controller = BiometricController::new(
            Arc::new(StaticCamera::with_frame("data:image/jpeg;base64,abc")),
            approving_verifier(),
        );

        let first = controller.open().await.unwrap();
        controller.cancel().await;
        let second = controller.open().await.unwrap();
        assert!(second.token > first.token);
    }
}
