//! Error types for relsync ingestion

use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors raised while extracting, flattening, or loading one entity.
///
/// Any of these aborts the current entity run and leaves its watermark
/// untouched; sibling entities are unaffected.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The source answered with a non-success status
    #[error("Source returned HTTP {status} for {url}")]
    Source { status: u16, url: String },

    /// Transport-level failure talking to the source or the sink
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A page or record did not have the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The watermark store could not be read or written
    #[error("Watermark store error: {0}")]
    Watermark(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The destination store rejected a batch or a bootstrap command
    #[error("Sink error: {0}")]
    Sink(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// An entity task panicked or was cancelled
    #[error("Pipeline task failed: {0}")]
    Task(String),
}

impl IngestError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn watermark(msg: impl Into<String>) -> Self {
        Self::Watermark(msg.into())
    }

    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Throttling (429), server errors, timeouts and connection failures are
    /// transient; everything else is a property of the request or the data.
    pub fn is_transient(&self) -> bool {
        match self {
            IngestError::Source { status, .. } => *status == 429 || *status >= 500,
            IngestError::Http(err) => {
                err.is_timeout()
                    || err.is_connect()
                    || err
                        .status()
                        .map(|s| s.as_u16() == 429 || s.is_server_error())
                        .unwrap_or(false)
            },
            _ => false,
        }
    }
}
