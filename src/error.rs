//! Error types for the place-controller gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Error taxonomy for the gateway engine
///
/// Every inbound-message error is contained locally: a malformed payload
/// or a failed publish never tears down the gateway, only an explicit
/// cancellation does.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Connection errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// Transport publish/subscribe failures
    #[error("Transport error: {0}")]
    Transport(String),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload did not match the expected structure
    #[error("Decode error: {0}")]
    Decode(String),

    /// Response referenced an unknown correlation handle or lookup key
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Discovery sequence errors
    #[error("Discovery failed: {0}")]
    Discovery(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Not found errors (devices, rooms, scenes)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation cancelled by shutdown signal
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Generic errors
    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl GatewayError {
    /// Create a connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a protocol error
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a discovery error
    pub fn discovery<S: Into<String>>(msg: S) -> Self {
        Self::Discovery(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a cancellation error
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Check if error is retryable by the connection monitor
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Connection(_)
                | GatewayError::Transport(_)
                | GatewayError::Timeout(_)
                | GatewayError::Discovery(_)
        )
    }
}
