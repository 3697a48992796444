//! Error types for Vizor.
//!
//! Every failure that can cross the [`Model`](crate::Model) boundary is one of
//! these variants. Cache failures never show up here: the cache degrades to a
//! miss instead of raising.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the Vizor core.
#[derive(Debug, Error)]
pub enum VizorError {
    // Caller errors
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    // Source resolution errors
    #[error("Unable to decode image from {source_ref}: {message}")]
    SourceDecode { source_ref: String, message: String },

    #[error("Unable to fetch image from {source_ref}: {message}")]
    SourceFetch { source_ref: String, message: String },

    // Backend errors
    #[error("Backend {kind} unavailable: {message}")]
    BackendUnavailable { kind: String, message: String },

    #[error("Model artifact fetch failed for {url}: {message}")]
    ArtifactFetch { url: String, message: String },

    #[error("Inference failed: {message}")]
    Inference { message: String },

    // Remote delegation errors
    #[error("{reason}")]
    RemoteInference { reason: String },

    #[error("Network error: {message}")]
    Network { message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },
}

/// Result type alias for Vizor operations.
pub type Result<T> = std::result::Result<T, VizorError>;

impl From<std::io::Error> for VizorError {
    fn from(err: std::io::Error) -> Self {
        VizorError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for VizorError {
    fn from(err: serde_json::Error) -> Self {
        VizorError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for VizorError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {}", err)
        } else {
            err.to_string()
        };
        VizorError::Network { message }
    }
}

impl VizorError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        VizorError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Shorthand for [`VizorError::InvalidArgument`].
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        VizorError::InvalidArgument {
            message: message.into(),
        }
    }

    /// HTTP status the front door answers with for this error.
    ///
    /// Malformed requests and undecodable sources are the caller's fault
    /// (400); everything else is reported as a server failure (500).
    pub fn status_code(&self) -> u16 {
        match self {
            VizorError::InvalidArgument { .. }
            | VizorError::SourceDecode { .. }
            | VizorError::Json { .. } => 400,
            _ => 500,
        }
    }

    /// Message forwarded verbatim to remote callers as `reason`.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}
