//! Limits and constraints for SCL processing
//!
//! Bounds applied while reading documents and while walking NSD
//! inheritance chains.

use crate::error::{Error, Result};
use serde::Deserialize;

/// Global limits configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum element nesting depth of a parsed document
    pub max_xml_depth: usize,

    /// Maximum XML text size in bytes
    pub max_xml_size: usize,

    /// Maximum length of an NSD `base` chain
    pub max_base_chain: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_xml_depth: 1000,
            max_xml_size: 256 * 1024 * 1024, // SCD files get big
            max_base_chain: 64,
        }
    }
}

impl Limits {
    /// Create a new Limits with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create strict limits (more restrictive)
    pub fn strict() -> Self {
        Self {
            max_xml_depth: 100,
            max_xml_size: 10 * 1024 * 1024, // 10 MB
            max_base_chain: 16,
        }
    }

    /// Check if XML depth is within limits
    pub fn check_xml_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_xml_depth {
            Err(Error::LimitExceeded(format!(
                "XML depth {} exceeds maximum {}",
                depth, self.max_xml_depth
            )))
        } else {
            Ok(())
        }
    }

    /// Check if XML size is within limits
    pub fn check_xml_size(&self, size: usize) -> Result<()> {
        if size > self.max_xml_size {
            Err(Error::LimitExceeded(format!(
                "XML size {} bytes exceeds maximum {} bytes",
                size, self.max_xml_size
            )))
        } else {
            Ok(())
        }
    }

    /// Check if an NSD base chain length is within limits
    pub fn check_base_chain(&self, length: usize) -> Result<()> {
        if length > self.max_base_chain {
            Err(Error::LimitExceeded(format!(
                "NSD base chain length {} exceeds maximum {}",
                length, self.max_base_chain
            )))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.max_xml_depth, 1000);
        assert!(limits.check_xml_depth(500).is_ok());
        assert!(limits.check_xml_depth(1500).is_err());
    }

    #[test]
    fn test_strict_limits() {
        let limits = Limits::strict();
        assert!(limits.max_xml_depth < Limits::default().max_xml_depth);
        assert!(limits.check_xml_size(11 * 1024 * 1024).is_err());
    }

    #[test]
    fn test_check_base_chain() {
        let limits = Limits::default();
        assert!(limits.check_base_chain(3).is_ok());
        assert!(limits.check_base_chain(65).is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let limits: Limits = serde_json::from_str(r#"{"max_base_chain": 8}"#).unwrap();
        assert_eq!(limits.max_base_chain, 8);
        assert_eq!(limits.max_xml_depth, 1000);
    }
}
