//! Resource location resolution
//!
//! NSD reference documents are published under fixed endpoint paths. This
//! module maps those endpoints onto a local directory, or lets callers hand
//! the text over directly.

use std::path::{Path, PathBuf};

/// Endpoint of the IEC 61850-7-4 NSD (logical node classes)
pub const NSD_7_4_ENDPOINT: &str = "/public/xml/IEC_61850-7-4_2007B3.nsd";

/// Endpoint of the IEC 61850-7-3 NSD (common data classes)
pub const NSD_7_3_ENDPOINT: &str = "/public/xml/IEC_61850-7-3_2007B3.nsd";

/// Endpoint of the IEC 61850-8-1 NSD (service mappings)
pub const NSD_8_1_ENDPOINT: &str = "/public/xml/IEC_61850-8-1_2003A2.nsd";

/// Resource location - a file path or in-memory text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// File system path
    Path(PathBuf),
    /// Inline document text
    String(String),
}

impl Location {
    /// Resolve an endpoint path (e.g. [`NSD_7_4_ENDPOINT`]) under a root directory
    pub fn endpoint(root: impl AsRef<Path>, endpoint: &str) -> Self {
        Location::Path(root.as_ref().join(endpoint.trim_start_matches('/')))
    }

    /// Get the location as a string, for diagnostics
    pub fn as_str(&self) -> String {
        match self {
            Location::Path(p) => p.to_string_lossy().to_string(),
            Location::String(_) => "<inline>".to_string(),
        }
    }

    /// Check if this is a local file
    pub fn is_file(&self) -> bool {
        matches!(self, Location::Path(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_strips_leading_slash() {
        let loc = Location::endpoint("/srv/openscd", NSD_7_3_ENDPOINT);
        assert_eq!(
            loc,
            Location::Path(PathBuf::from(
                "/srv/openscd/public/xml/IEC_61850-7-3_2007B3.nsd"
            ))
        );
        assert!(loc.is_file());
    }

    #[test]
    fn test_inline_as_str() {
        let loc = Location::String("<NS/>".to_string());
        assert_eq!(loc.as_str(), "<inline>");
        assert!(!loc.is_file());
    }
}
