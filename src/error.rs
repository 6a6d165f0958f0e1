//! Error types for mailroom.

use uuid::Uuid;

/// Top-level error type for the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Campaign error: {0}")]
    Campaign(#[from] CampaignError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Transport-level errors, raised by the SMTP senders themselves.
///
/// The dispatch engine wraps these into [`DispatchError`] variants that
/// say which path (account or relay) failed.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("SMTP connection setup failed: {0}")]
    Connect(String),

    #[error("Failed to build message: {0}")]
    Message(String),

    #[error("SMTP send failed: {0}")]
    Send(String),
}

/// Errors surfaced to callers of a single dispatch.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Every account is at quota and no relay is configured. Terminal for
    /// this dispatch; there is no automatic retry.
    #[error("All sending capacity exhausted: every account is at its daily quota and no relay is configured")]
    AllCapacityExhausted,

    #[error("Account {address} failed to send: {reason}")]
    AccountTransport { address: String, reason: String },

    #[error("Relay failed to send: {reason}")]
    RelayTransport { reason: String },

    #[error("Invalid send request: {0}")]
    InvalidMessage(String),
}

/// Campaign scheduling errors.
#[derive(Debug, thiserror::Error)]
pub enum CampaignError {
    #[error("Campaign {0} not found")]
    NotFound(Uuid),

    #[error("Campaign store error: {0}")]
    Store(#[from] StoreError),
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open store: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for the orchestrator.
pub type Result<T> = std::result::Result<T, Error>;
