//! Core data models for the authorization flow

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

//
// ================= Enums =================
//

/// Lifecycle of a single biometric verification attempt
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Idle,
    Capturing,
    Verifying,
    Success,
    Failed,
}

/// Outcome of the transfer executed alongside a verification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Success,
    Failed,
    None,
}

//
// ================= Intent =================
//

/// Structured transfer request derived from user input.
///
/// Ephemeral: exists only until consumed by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferIntent {
    /// Resolved beneficiary account number
    pub recipient_reference: String,
    /// Amount in minor units (kobo); always > 0
    pub amount_minor_units: i64,
}

/// A saved transfer recipient
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Beneficiary {
    pub alias: String,
    pub name: String,
    pub bank: String,
    pub account_number: String,
}

//
// ================= Pending Authorization =================
//

/// The single in-flight transfer awaiting biometric confirmation.
/// At most one per session; mutated only by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub session_id: String,
    pub intent: Option<TransferIntent>,
    pub created_at: DateTime<Utc>,
}

//
// ================= Biometric Attempt =================
//

/// One live verification attempt; destroyed when the challenge closes.
///
/// `token` is monotonic per session so a late verdict can be told apart
/// from the attempt it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiometricAttempt {
    pub token: u64,
    pub status: AttemptStatus,
    pub failure_reason: Option<String>,
    /// Captured still image (data-URL); held between capture and submit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<String>,
}

impl BiometricAttempt {
    pub fn is_retryable(&self) -> bool {
        self.status == AttemptStatus::Failed
    }
}

//
// ================= Verification Verdict =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferResult {
    pub status: TransferStatus,
    pub message: String,
    pub new_balance_display: String,
}

/// Backend verification decision; read-only to the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationVerdict {
    pub verified: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub transfer: Option<TransferResult>,
}

impl VerificationVerdict {
    /// Retryable denial with the given reason (capture/network/denied paths)
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            verified: false,
            reason: Some(reason.into()),
            transfer: None,
        }
    }
}

//
// ================= Formatting =================
//

/// Render minor units (kobo) as a naira display string, e.g. 500000 → "₦5,000"
pub fn format_naira(minor_units: i64) -> String {
    let major = minor_units / 100;
    let kobo = (minor_units % 100).abs();

    let mut digits = major.abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    while digits.len() > 3 {
        let rest = digits.split_off(digits.len() - 3);
        grouped = if grouped.is_empty() {
            rest
        } else {
            format!("{},{}", rest, grouped)
        };
    }
    grouped = if grouped.is_empty() {
        digits
    } else {
        format!("{},{}", digits, grouped)
    };

    let sign = if major < 0 { "-" } else { "" };
    if kobo == 0 {
        format!("{}₦{}", sign, grouped)
    } else {
        format!("{}₦{}.{:02}", sign, grouped, kobo)
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttemptStatus::Idle => "idle",
            AttemptStatus::Capturing => "capturing",
            AttemptStatus::Verifying => "verifying",
            AttemptStatus::Success => "success",
            AttemptStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransferStatus::Success => "success",
            TransferStatus::Failed => "failed",
            TransferStatus::None => "none",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_naira_grouping() {
        assert_eq!(format_naira(500_000), "₦5,000");
        assert_eq!(format_naira(4_500_000), "₦45,000");
        assert_eq!(format_naira(123_456_789_00), "₦123,456,789");
        assert_eq!(format_naira(150), "₦1.50");
        assert_eq!(format_naira(99), "₦0.99");
    }

    #[test]
    fn test_verdict_wire_shape() {
        let json = r#"{"verified":true,"transfer":{"status":"success","message":"Sent","new_balance_display":"₦45,000"}}"#;
        let verdict: VerificationVerdict = serde_json::from_str(json).unwrap();
        assert!(verdict.verified);
        assert!(verdict.reason.is_none());
        let transfer = verdict.transfer.unwrap();
        assert_eq!(transfer.status, TransferStatus::Success);
        assert_eq!(transfer.new_balance_display, "₦45,000");
    }

    #[test]
    fn test_verdict_denied_shape() {
        let json = r#"{"verified":false,"reason":"face mismatch"}"#;
        let verdict: VerificationVerdict = serde_json::from_str(json).unwrap();
        assert!(!verdict.verified);
        assert_eq!(verdict.reason.as_deref(), Some("face mismatch"));
        assert!(verdict.transfer.is_none());
    }
}
