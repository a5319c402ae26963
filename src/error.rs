//! Error types for the authorization core

use thiserror::Error;

/// Result type alias for authorization-flow operations
pub type Result<T> = std::result::Result<T, AuthorizationError>;

#[derive(Error, Debug)]
pub enum AuthorizationError {

    // =============================
    // Authorization Flow Errors
    // =============================

    #[error("Challenge already open for session {0}")]
    ChallengeAlreadyOpen(String),

    #[error("No pending authorization for session {0}")]
    NoPendingAuthorization(String),

    #[error("No biometric attempt is open")]
    NoOpenAttempt,

    #[error("Verification error: {0}")]
    VerificationError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Completions error: {0}")]
    CompletionsError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Session error: {0}")]
    SessionError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("UUID parse error: {0}")]
    UuidError(#[from] uuid::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
