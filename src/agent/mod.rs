//! Authorization orchestrator - the state machine tying the flow together
//!
//! TRIGGER → OPEN CHALLENGE → CAPTURE → VERIFY → RECONCILE → IDLE
//!
//! Consumes events from the voice/chat channel and from the biometric
//! controller, decides when to open a challenge, and reports the outcome
//! back to the conversational surface. All transitions for one session are
//! serialized; the two suspending operations (capture, verify) are fenced
//! by attempt tokens so a late result never lands on a stale attempt.

use crate::biometric::{BiometricController, CameraCapture};
use crate::channel::{ChannelEvent, ConversationChannel};
use crate::error::AuthorizationError;
use crate::intent::IntentExtractor;
use crate::models::{
    BiometricAttempt, PendingAuthorization, TransferIntent, TransferStatus, VerificationVerdict,
};
use crate::session::SessionContext;
use crate::store::PendingAuthorizationStore;
use crate::verifier::FaceVerifier;
use crate::Result;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Tool names that carry the structured biometric trigger.
/// Both spellings exist upstream (client tool vs. agent tool).
const TRIGGER_TOOL_NAMES: &[&str] = &["triggerBiometric", "trigger_biometric_auth"];

/// Degraded-mode fallback: agent speech that asks for verification when the
/// structured tool invocation was lost upstream. Only consulted when no
/// structured signal arrived in the same turn.
const CHALLENGE_REQUEST_PHRASES: &[&str] = &[
    "face recognition",
    "verify your identity",
    "scan your face",
];

/// Orchestrator states; Idle is both initial and terminal per transfer
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    Idle,
    AwaitingIntent,
    ChallengeOpen,
    Reconciling,
}

struct FlowInner {
    state: FlowState,
    /// Set when a structured trigger arrived this turn; suppresses the
    /// phrase-matching fallback until the next user turn.
    structured_signal_seen: bool,
}

/// Per-session authorization state machine
pub struct AuthorizationOrchestrator {
    session: SessionContext,
    extractor: IntentExtractor,
    store: Arc<dyn PendingAuthorizationStore>,
    controller: BiometricController,
    channel: Arc<dyn ConversationChannel>,
    inner: Mutex<FlowInner>,
}

impl AuthorizationOrchestrator {
    pub fn new(
        session: SessionContext,
        extractor: IntentExtractor,
        store: Arc<dyn PendingAuthorizationStore>,
        camera: Arc<dyn CameraCapture>,
        verifier: Arc<dyn FaceVerifier>,
        channel: Arc<dyn ConversationChannel>,
    ) -> Self {
        Self {
            session,
            extractor,
            store,
            controller: BiometricController::new(camera, verifier),
            channel,
            inner: Mutex::new(FlowInner {
                state: FlowState::Idle,
                structured_signal_seen: false,
            }),
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub async fn state(&self) -> FlowState {
        self.inner.lock().await.state
    }

    /// Snapshot of the live biometric attempt, if a challenge is open
    pub async fn challenge(&self) -> Option<BiometricAttempt> {
        self.controller.current().await
    }

    pub async fn pending(&self) -> Option<PendingAuthorization> {
        self.store.current(&self.session.session_id).await
    }

    //
    // ================= Inbound Events =================
    //

    pub async fn handle_event(&self, event: ChannelEvent) -> Result<()> {
        match event {
            ChannelEvent::UserText(text) => self.handle_user_text(&text).await,
            ChannelEvent::AgentText(text) => self.handle_agent_text(&text).await,
            ChannelEvent::ToolInvocation { name, parameters } => {
                self.handle_tool_invocation(&name, &parameters).await
            }
        }
    }

    /// Typed or transcribed user input: a new turn begins here
    async fn handle_user_text(&self, text: &str) -> Result<()> {
        self.inner.lock().await.structured_signal_seen = false;

        match self.extractor.extract(text) {
            Some(intent) => {
                info!(
                    session_id = %self.session.session_id,
                    recipient = %intent.recipient_reference,
                    amount = intent.amount_minor_units,
                    "Transfer intent extracted"
                );
                self.begin_authorization(Some(intent)).await
            }
            None => {
                // intent-not-recognized: silently drop
                debug!(session_id = %self.session.session_id, "No transfer intent in user text");
                Ok(())
            }
        }
    }

    /// Structured tool invocation from the transport
    async fn handle_tool_invocation(&self, name: &str, parameters: &Value) -> Result<()> {
        if !TRIGGER_TOOL_NAMES.contains(&name) {
            debug!(tool = name, "Ignoring unrelated tool invocation");
            return Ok(());
        }

        self.inner.lock().await.structured_signal_seen = true;

        let intent = intent_from_parameters(parameters);
        info!(
            session_id = %self.session.session_id,
            has_intent = intent.is_some(),
            "Biometric trigger tool invoked"
        );
        self.begin_authorization(intent).await
    }

    /// Agent speech: phrase-matching fallback for a lost tool invocation
    async fn handle_agent_text(&self, text: &str) -> Result<()> {
        {
            let inner = self.inner.lock().await;
            if inner.structured_signal_seen {
                return Ok(());
            }
        }

        let text_lower = text.to_lowercase();
        if !CHALLENGE_REQUEST_PHRASES
            .iter()
            .any(|phrase| text_lower.contains(phrase))
        {
            return Ok(());
        }

        warn!(
            session_id = %self.session.session_id,
            "Challenge-request phrase matched without structured signal; using fallback trigger"
        );
        self.begin_authorization(None).await
    }

    //
    // ================= Challenge Lifecycle =================
    //

    /// Open the pending authorization and the biometric challenge.
    ///
    /// At most one authorization flow is ever live per session: a trigger
    /// arriving while one is open is ignored and the existing challenge
    /// continues.
    async fn begin_authorization(&self, intent: Option<TransferIntent>) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if inner.state != FlowState::Idle {
            debug!(
                session_id = %self.session.session_id,
                state = ?inner.state,
                "Duplicate trigger ignored; challenge already live"
            );
            return Ok(());
        }

        inner.state = FlowState::AwaitingIntent;

        match self.store.open(&self.session.session_id, intent).await {
            Ok(pending) => {
                debug!(
                    session_id = %self.session.session_id,
                    has_intent = pending.intent.is_some(),
                    "Pending authorization opened"
                );
            }
            Err(AuthorizationError::ChallengeAlreadyOpen(_)) => {
                // Another surface of this session already holds the slot
                inner.state = FlowState::Idle;
                return Ok(());
            }
            Err(e) => {
                inner.state = FlowState::Idle;
                return Err(e);
            }
        }

        match self.controller.open().await {
            Ok(attempt) => {
                inner.state = FlowState::ChallengeOpen;
                info!(
                    session_id = %self.session.session_id,
                    token = attempt.token,
                    status = %attempt.status,
                    "Challenge open"
                );
                Ok(())
            }
            Err(e) => {
                self.store.resolve(&self.session.session_id).await;
                inner.state = FlowState::Idle;
                Err(e)
            }
        }
    }

    /// User confirmed: capture one still via the camera capability,
    /// submit it, and reconcile the verdict.
    ///
    /// The capture and verification awaits run without the session lock
    /// held, so a cancel can land while they are in flight; a verdict for
    /// a discarded attempt is dropped by the token check.
    pub async fn submit_capture(&self) -> Result<()> {
        let pending = self.pending_for_submit().await?;

        match self
            .controller
            .capture_and_submit(&pending, &self.session.user_id)
            .await?
        {
            Some(verdict) => self.reconcile(verdict).await,
            None => {
                // Stale: the attempt was cancelled while verifying
                debug!(session_id = %self.session.session_id, "Late verdict discarded");
                Ok(())
            }
        }
    }

    /// User confirmed with a frame the surface captured itself
    /// (the browser webcam posts its own still)
    pub async fn submit_frame(&self, image: String) -> Result<()> {
        let pending = self.pending_for_submit().await?;

        match self
            .controller
            .submit_frame(image, &pending, &self.session.user_id)
            .await?
        {
            Some(verdict) => self.reconcile(verdict).await,
            None => {
                debug!(session_id = %self.session.session_id, "Late verdict discarded");
                Ok(())
            }
        }
    }

    async fn pending_for_submit(&self) -> Result<PendingAuthorization> {
        let inner = self.inner.lock().await;
        if inner.state != FlowState::ChallengeOpen {
            return Err(AuthorizationError::NoPendingAuthorization(
                self.session.session_id.clone(),
            ));
        }
        self.store
            .current(&self.session.session_id)
            .await
            .ok_or_else(|| {
                AuthorizationError::NoPendingAuthorization(self.session.session_id.clone())
            })
    }

    /// Explicit user retry after a failed attempt
    pub async fn retry(&self) -> Result<()> {
        let inner = self.inner.lock().await;
        if inner.state != FlowState::ChallengeOpen {
            return Err(AuthorizationError::NoPendingAuthorization(
                self.session.session_id.clone(),
            ));
        }
        drop(inner);

        self.controller.retry().await.map(|_| ())
    }

    /// User cancelled: abort any in-flight work, clear the pending
    /// authorization, emit nothing.
    pub async fn cancel(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.state != FlowState::ChallengeOpen {
            return Ok(());
        }

        inner.state = FlowState::Reconciling;
        self.controller.cancel().await;
        self.store.resolve(&self.session.session_id).await;
        inner.state = FlowState::Idle;

        info!(session_id = %self.session.session_id, "Challenge cancelled; pending authorization discarded");
        Ok(())
    }

    //
    // ================= Reconciliation =================
    //

    async fn reconcile(&self, verdict: VerificationVerdict) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.state != FlowState::ChallengeOpen {
            debug!(session_id = %self.session.session_id, "Verdict for a closed flow; ignoring");
            return Ok(());
        }

        if !verdict.verified {
            // Retryable: the challenge stays open, the slot stays filled
            let reason = verdict
                .reason
                .as_deref()
                .unwrap_or("verification failed")
                .to_string();
            warn!(
                session_id = %self.session.session_id,
                reason = %reason,
                "Verification denied; challenge remains open for retry"
            );
            self.channel
                .say(&format!(
                    "Face verification failed: {}. Please try again.",
                    reason
                ))
                .await?;
            return Ok(());
        }

        inner.state = FlowState::Reconciling;
        self.store.resolve(&self.session.session_id).await;
        self.controller.close().await;

        let line = match &verdict.transfer {
            Some(transfer) if transfer.status == TransferStatus::Success => {
                info!(
                    session_id = %self.session.session_id,
                    new_balance = %transfer.new_balance_display,
                    "Transfer confirmed"
                );
                format!(
                    "{} Your new balance is {}.",
                    transfer.message, transfer.new_balance_display
                )
            }
            Some(transfer) if transfer.status == TransferStatus::Failed => {
                warn!(session_id = %self.session.session_id, "Transfer failed after verification");
                format!("Transfer failed: {}", transfer.message)
            }
            // Identity confirmed but nothing executed: reported as a
            // generic success, same as the verified-no-transfer source path
            _ => {
                info!(session_id = %self.session.session_id, "Identity confirmed, no transaction executed");
                "Face verified. Your identity has been confirmed.".to_string()
            }
        };

        self.channel.say(&line).await?;
        inner.state = FlowState::Idle;
        Ok(())
    }
}

/// Pull a transfer intent out of tool-invocation parameters, if present.
/// Accepts minor units directly or a major-unit `amount`.
fn intent_from_parameters(parameters: &Value) -> Option<TransferIntent> {
    let recipient_reference = parameters
        .get("recipient_reference")
        .or_else(|| parameters.get("recipient"))
        .and_then(Value::as_str)?
        .to_string();

    let amount_minor_units = parameters
        .get("amount_minor_units")
        .and_then(Value::as_i64)
        .or_else(|| {
            parameters
                .get("amount")
                .and_then(Value::as_f64)
                .map(|major| (major * 100.0).round() as i64)
        })?;

    if amount_minor_units <= 0 {
        return None;
    }

    Some(TransferIntent {
        recipient_reference,
        amount_minor_units,
    })
}
