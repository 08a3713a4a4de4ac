//! Error types and result aliases for npmcdn operations.
//!
//! Every failure in the request pipeline is mapped exactly once to one of
//! these variants; the HTTP layer only needs `status_code()` and `Display`.

use thiserror::Error;

/// Unified error type for all npmcdn operations
#[derive(Error, Debug)]
pub enum CdnError {
    // Request errors
    #[error("Invalid URL: {url}")]
    InvalidUrl { url: String },

    #[error("Package {name} is blacklisted")]
    Blacklisted { name: String },

    #[error("Not found: package {name}")]
    PackageNotFound { name: String },

    #[error("Not found: {what}")]
    FileNotFound { what: String },

    // Config errors
    #[error("Configuration field '{field}' is invalid: {reason}")]
    ConfigValidation { field: String, reason: String },

    // Server errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{message}")]
    JsonParse { message: String },

    #[error("Extraction failed: {message}")]
    Extraction { message: String },

    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{message}")]
    Server { message: String },
}

/// Result type alias for npmcdn operations
pub type CdnResult<T> = Result<T, CdnError>;

impl CdnError {
    /// Create a network error from any error type
    pub fn network<E>(message: String, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Network {
            message,
            source: Some(Box::new(source)),
        }
    }

    /// Create an IO error from std::io::Error
    pub fn io(message: String, source: std::io::Error) -> Self {
        Self::Io { message, source }
    }

    /// Create a generic server error
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// HTTP status this error is reported with
    pub fn status_code(&self) -> u16 {
        match self {
            CdnError::InvalidUrl { .. } | CdnError::Blacklisted { .. } => 403,
            CdnError::PackageNotFound { .. } | CdnError::FileNotFound { .. } => 404,
            _ => 500,
        }
    }

    /// Whether this error is the server's fault rather than the request's
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}
