//! Common error types for oaiharvest.

use std::path::PathBuf;
use thiserror::Error;

/// Common error type for harvest operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed XML: {0}")]
    MalformedXml(String),

    #[error("No namespace URI given and no default namespace map configured")]
    ConfigurationMissing,

    #[error("Failed to write {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to find harvest configuration with name {0}")]
    ConfigNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Certificate error: {0}")]
    Certificate(String),
}

/// Result type alias using common Error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap an IO error raised while writing `path`.
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means a named configuration was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ConfigNotFound(_))
    }
}
