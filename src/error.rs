//! Error types for scl-validation
//!
//! Only failures that abort a validation attempt are errors. Everything a
//! document does wrong is reported as an [`Issue`](crate::issues::Issue).

use std::fmt;
use thiserror::Error;

/// Result type alias using the crate [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for scl-validation operations
#[derive(Error, Debug)]
pub enum Error {
    /// XML parsing/building error
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Malformed XML text
    #[error("XML error: {0}")]
    Xml(String),

    /// Resource loading error (NSD files, documents)
    #[error("resource error: {0}")]
    Resource(String),

    /// Limit exceeded error
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// The host cannot start a background worker
    #[error("schema validation worker unavailable: {0}")]
    WorkerUnavailable(String),

    /// The worker refused to load a schema
    #[error("schema '{schema}' could not be loaded: {reason}")]
    SchemaLoad {
        /// Schema cache key, e.g. `SCL2007B4.xsd`
        schema: String,
        /// Reason reported by the worker
        reason: String,
    },

    /// The worker channel closed while a request was in flight
    #[error("schema validation worker for '{0}' disconnected")]
    WorkerDisconnected(String),

    /// An NSD `base` chain visits the same class twice
    #[error("cyclic base chain in NSD logical node classes: {0}")]
    BaseCycle(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// XML parsing error with position information
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Error message
    pub message: String,
    /// Location in the source, e.g. `project.scd:42`
    pub location: Option<String>,
    /// Source snippet that caused the error
    pub source: Option<String>,
}

impl ParseError {
    /// Create a new parse error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
            source: None,
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the source
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(ref loc) = self.location {
            write!(f, "\n\nLocation: {}", loc)?;
        }

        if let Some(ref src) = self.source {
            write!(f, "\n\nSource:\n{}", src)?;
        }

        Ok(())
    }
}

impl std::error::Error for ParseError {}
