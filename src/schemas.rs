//! SCL schema registry
//!
//! Holds the embedded XSD text of each supported SCL edition and picks the
//! one matching a document's declared `version`/`revision`/`release`.
//! Unknown declarations fall back to 2007B; that is a silent downgrade, not an
//! error.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

const SCL_2003: &str = include_str!("../schemas/SCL2003.xsd");
const SCL_2007B: &str = include_str!("../schemas/SCL2007B.xsd");
const SCL_2007B4: &str = include_str!("../schemas/SCL2007B4.xsd");
const SCL_DEFAULT: &str = include_str!("../schemas/SCLDefault.xsd");

/// Declared `version + revision + release` keys and the edition they select
const LOOKUP: &[(&str, SchemaVariant)] = &[
    ("", SchemaVariant::Scl2003),
    ("2007", SchemaVariant::Scl2007B),
    ("2007A", SchemaVariant::Scl2007B),
    ("2007B", SchemaVariant::Scl2007B),
    ("2007B1", SchemaVariant::Scl2007B),
    ("2007B2", SchemaVariant::Scl2007B4),
    ("2007B3", SchemaVariant::Scl2007B4),
    ("2007B4", SchemaVariant::Scl2007B4),
];

/// One embedded SCL schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaVariant {
    /// Edition 1 (2003)
    Scl2003,
    /// Edition 2 (2007 revision B)
    Scl2007B,
    /// Edition 2.1 (2007 revision B release 4)
    Scl2007B4,
    /// Permissive schema that accepts any version declaration
    Default,
}

impl SchemaVariant {
    /// All variants, oldest first
    pub const ALL: [SchemaVariant; 4] = [
        SchemaVariant::Scl2003,
        SchemaVariant::Scl2007B,
        SchemaVariant::Scl2007B4,
        SchemaVariant::Default,
    ];

    /// Short name, as accepted by [`FromStr`]
    pub fn name(&self) -> &'static str {
        match self {
            SchemaVariant::Scl2003 => "2003",
            SchemaVariant::Scl2007B => "2007B",
            SchemaVariant::Scl2007B4 => "2007B4",
            SchemaVariant::Default => "default",
        }
    }

    /// Full XSD text
    pub fn text(&self) -> &'static str {
        match self {
            SchemaVariant::Scl2003 => SCL_2003,
            SchemaVariant::Scl2007B => SCL_2007B,
            SchemaVariant::Scl2007B4 => SCL_2007B4,
            SchemaVariant::Default => SCL_DEFAULT,
        }
    }
}

impl fmt::Display for SchemaVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SchemaVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SchemaVariant::ALL
            .into_iter()
            .find(|variant| variant.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::Config(format!("unknown schema variant '{}'", s)))
    }
}

/// Edition selected by a declared version triple; unknown keys give 2007B
pub fn lookup_variant(version: &str, revision: &str, release: &str) -> SchemaVariant {
    let key = format!("{}{}{}", version, revision, release);
    LOOKUP
        .iter()
        .find(|(known, _)| *known == key)
        .map(|(_, variant)| *variant)
        .unwrap_or(SchemaVariant::Scl2007B)
}

/// XSD text for a declared version triple
pub fn get_schema(version: &str, revision: &str, release: &str) -> &'static str {
    lookup_variant(version, revision, release).text()
}

/// Name under which the worker for this triple is cached, e.g. `SCL2007B4.xsd`
pub fn schema_cache_key(version: &str, revision: &str, release: &str) -> String {
    format!("SCL{}{}{}.xsd", version, revision, release)
}
