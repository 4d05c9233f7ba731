use thiserror::Error;

use crate::models::Field;

/// Application-wide error types for metascrape.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed or returned an error status.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// A document could not be parsed (invalid JSON, bad selector, ...).
    #[error("Parse error: {0}")]
    ParseError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// An expected element or JSON path is absent from the document.
    #[error("{0} not found")]
    Missing(String),

    /// The document was well formed but no entry matched a known key.
    #[error("no entry matched {0}")]
    NoMatch(String),

    /// The adapter does not implement this capability.
    #[error("{0} is not supported by this site")]
    Unsupported(Field),

    /// The scripted browser failed (launch, navigation, click, protocol call).
    #[error("Browser error: {0}")]
    BrowserError(String),

    /// The capture session ran past its deadline.
    #[error("Capture deadline of {0} seconds exceeded")]
    CaptureDeadline(u64),

    /// The capture listener went away without delivering an artifact.
    #[error("Capture listener closed before delivering an artifact")]
    ListenerClosed,

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true for failures of the transport itself, as opposed to
    /// failures to find data in a document that was fetched successfully.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AppError::HttpError(_) | AppError::NetworkError(_) | AppError::Timeout(_)
        )
    }

    /// Returns true for errors raised by the browser capture bridge.
    pub fn is_capture(&self) -> bool {
        matches!(
            self,
            AppError::BrowserError(_) | AppError::CaptureDeadline(_) | AppError::ListenerClosed
        )
    }
}
