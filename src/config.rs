//! Validation configuration
//!
//! Built in code with the `with_*` methods or read from a JSON file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::locations::{Location, NSD_7_3_ENDPOINT, NSD_7_4_ENDPOINT, NSD_8_1_ENDPOINT};

/// Configuration shared by the schema dispatcher and the NSD store
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Directory the fixed NSD endpoint paths are resolved against
    pub nsd_root: PathBuf,
    /// Resource limits
    pub limits: Limits,
    /// Thread name prefix for schema validation workers
    pub worker_name_prefix: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            nsd_root: PathBuf::from("."),
            limits: Limits::default(),
            worker_name_prefix: "scl-xsd".to_string(),
        }
    }
}

impl ValidationConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a configuration from a JSON file; missing keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.check()?;
        Ok(config)
    }

    /// Set the NSD root directory
    pub fn with_nsd_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.nsd_root = root.into();
        self
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the worker thread name prefix
    pub fn with_worker_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.worker_name_prefix = prefix.into();
        self
    }

    /// Reject values no validation run could work with
    pub fn check(&self) -> Result<()> {
        if self.worker_name_prefix.is_empty() {
            return Err(Error::Config("worker_name_prefix must not be empty".to_string()));
        }
        if self.limits.max_base_chain == 0 {
            return Err(Error::Config("limits.max_base_chain must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Locations of the 7-4, 7-3 and 8-1 NSD documents under `nsd_root`
    pub fn nsd_locations(&self) -> NsdLocations {
        NsdLocations {
            part_7_4: Location::endpoint(&self.nsd_root, NSD_7_4_ENDPOINT),
            part_7_3: Location::endpoint(&self.nsd_root, NSD_7_3_ENDPOINT),
            part_8_1: Location::endpoint(&self.nsd_root, NSD_8_1_ENDPOINT),
        }
    }
}

/// Where each NSD reference document is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsdLocations {
    /// Logical node classes and their data objects
    pub part_7_4: Location,
    /// Common data classes and constructed attributes
    pub part_7_3: Location,
    /// Service CDCs and service constructed attributes
    pub part_8_1: Location,
}

impl NsdLocations {
    /// Use in-memory NSD texts
    pub fn inline(
        part_7_4: impl Into<String>,
        part_7_3: impl Into<String>,
        part_8_1: impl Into<String>,
    ) -> Self {
        Self {
            part_7_4: Location::String(part_7_4.into()),
            part_7_3: Location::String(part_7_3.into()),
            part_8_1: Location::String(part_8_1.into()),
        }
    }
}
