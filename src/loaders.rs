//! Resource loading utilities
//!
//! Reads NSD reference documents and SCL projects from a [`Location`].

use crate::documents::Document;
use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::locations::Location;
use std::fs;
use tracing::debug;

/// Resource loader for NSD and SCL documents
#[derive(Debug, Clone, Default)]
pub struct Loader {
    /// Resource limits
    limits: Limits,
}

impl Loader {
    /// Create a new loader with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Load a resource as a string
    pub fn load(&self, location: &Location) -> Result<String> {
        match location {
            Location::Path(path) => {
                let content = fs::read_to_string(path).map_err(|e| {
                    Error::Resource(format!("Failed to read file '{}': {}", path.display(), e))
                })?;

                self.limits.check_xml_size(content.len())?;

                Ok(content)
            }
            Location::String(s) => {
                self.limits.check_xml_size(s.len())?;
                Ok(s.clone())
            }
        }
    }

    /// Load and parse a resource as an XML document
    pub fn load_document(&self, location: &Location) -> Result<Document> {
        let text = self.load(location)?;
        let doc = Document::parse(text.as_bytes(), &self.limits).map_err(|e| {
            Error::Resource(format!("Failed to parse '{}': {}", location.as_str(), e))
        })?;
        debug!(location = %location.as_str(), bytes = text.len(), "loaded XML document");
        Ok(doc)
    }
}
