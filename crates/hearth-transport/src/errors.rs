//! Transport error type.

use thiserror::Error;

/// Errors raised by a delivery attempt.
///
/// Any of these means the whole batch failed; the delivery engine requeues
/// the batch and retries with backoff. Nothing here reaches product code.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be sent or the connection failed.
    #[error("collector request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The collector answered with a non-success status.
    #[error("collector rejected batch with status {0}")]
    Status(u16),

    /// The configured endpoint could not be parsed into a URL.
    #[error("invalid collector endpoint: {0}")]
    InvalidEndpoint(String),
}
