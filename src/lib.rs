//! # scl-validation
//!
//! Validation engine for IEC 61850 SCL (Substation Configuration Language)
//! projects.
//!
//! Two independent checks are provided:
//!
//! - Schema validation against the SCL XSD matching the project's declared
//!   `version`/`revision`/`release`, run on a background worker per schema
//! - Template validation of the `DataTypeTemplates` section against the
//!   IEC 61850-7-4, 7-3 and 8-1 NSD documents
//!
//! ## Example
//!
//! ```rust,ignore
//! use scl_validation::{NsdStore, SchemaValidationDispatcher, SclDocument};
//! use scl_validation::validators::validate_templates;
//!
//! let doc = SclDocument::from_string(&std::fs::read_to_string("project.scd")?)?;
//!
//! // Schema issues, ending with "Project is schema valid" when valid
//! let issues = SchemaValidationDispatcher::global().validate_schema(&doc, "project.scd")?;
//!
//! // Template issues, one batch per top-level template
//! let nsd = NsdStore::global();
//! for batch in validate_templates(&nsd, &doc) {
//!     for issue in batch? {
//!         println!("{}", issue);
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Foundation
pub mod error;
pub mod limits;
pub mod config;

// Resource loading
pub mod locations;
pub mod loaders;
pub mod documents;

// Results
pub mod issues;

// Schema validation
pub mod schemas;
pub mod dispatch;
pub mod validators;

// Template validation
pub mod nsd;

pub mod panel;

// Re-exports for convenience
pub use config::ValidationConfig;
pub use dispatch::{SchemaValidationDispatcher, SCHEMA_VALID_TITLE};
pub use documents::{Document, Element, SclDocument};
pub use error::{Error, Result};
pub use issues::{Issue, IssueList};
pub use nsd::{NsdStore, TemplateResolver};
pub use panel::ValidationPanel;
pub use schemas::{get_schema, schema_cache_key, SchemaVariant};

/// Version of the scl-validation library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// SCL namespace
pub const SCL_NAMESPACE: &str = "http://www.iec.ch/61850/2003/SCL";
