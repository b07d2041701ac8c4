//! Error types for kapso-bridge

use thiserror::Error;

/// Bridge error type
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Kapso API rejected a request
    #[error("kapso API error (status {status}): {body}")]
    Provider {
        /// HTTP status code returned by the API
        status: u16,
        /// Raw response body
        body: String,
    },

    /// Network / transport error
    #[error("network error: {0}")]
    Network(String),

    /// Gateway connection or protocol error
    #[error("gateway error: {0}")]
    Gateway(String),

    /// Webhook receiver error
    #[error("webhook error: {0}")]
    Webhook(String),

    /// Reply relay error
    #[error("relay error: {0}")]
    Relay(String),

    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
