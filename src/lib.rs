//! Voice Banking Orchestrator
//!
//! The authorization core of a voice-driven banking client:
//! - Turns spoken or typed transfer requests into structured intents
//! - Holds at most one pending authorization per session
//! - Runs the biometric (face) challenge gating each transfer
//! - Reconciles backend verdicts into conversational output
//!
//! AUTHORIZATION FLOW:
//! TRIGGER → OPEN CHALLENGE → CAPTURE → VERIFY → RECONCILE → IDLE

pub mod agent;
pub mod api;
pub mod biometric;
pub mod channel;
pub mod completions;
pub mod error;
pub mod intent;
pub mod models;
pub mod session;
pub mod store;
pub mod verifier;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use agent::{AuthorizationOrchestrator, FlowState};
