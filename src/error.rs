use thiserror::Error;

/// Errors that can occur while issuing or serving RPC calls over a transport.
#[derive(Error, Debug)]
pub enum RpcError {
    /// No reply arrived before the call's deadline.
    #[error("request timed out")]
    Timeout,

    /// Publishing failed, or the reply path is gone.
    #[error("transport error: {0}")]
    Transport(String),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The remote side answered with an error indicator instead of a payload.
    #[error("remote error: {0}")]
    Remote(String),

    /// Required configuration value was not provided.
    #[error("missing configuration: {0}")]
    MissingConfig(String),
}

/// Result type alias for RPC operations.
pub type Result<T> = std::result::Result<T, RpcError>;
