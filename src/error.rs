//! Error types for the Python debug attach server

use thiserror::Error;

/// Main error type for the Python debug attach server
#[derive(Error, Debug)]
pub enum DebuggerError {
    #[error("No command service available for {0}")]
    ServiceUnavailable(String),

    #[error("A remote service resolver is already registered")]
    AlreadyRegistered,

    #[error("Invalid root location: {0}")]
    InvalidRoot(String),

    #[error("Stream failed: {0}")]
    StreamFailed(String),

    #[error("Debug session launch failed: {0}")]
    LaunchFailed(String),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("Attach controller is shut down")]
    ControllerShutDown,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, DebuggerError>;
