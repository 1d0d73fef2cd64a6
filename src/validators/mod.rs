//! Validators
//!
//! [`xsd_validation`] is the XSD engine run inside schema workers. It walks
//! documents against the schema compiled by [`xsd_model`], matching content
//! models with [`xsd_content`], lexical values with [`xsd_builtins`] and
//! identity constraints with [`xsd_identity`]. [`templates`] checks the
//! `DataTypeTemplates` section against the NSD documents.

pub mod templates;
pub mod xsd_builtins;
pub mod xsd_content;
pub mod xsd_identity;
pub mod xsd_model;
pub mod xsd_validation;

pub use templates::{validate_templates, TemplateIssues, TemplateTag, TemplateValidator};
pub use xsd_model::XsdModel;
pub use xsd_validation::{CompiledSchema, LoadedSchema, StructuralXsdEngine, Violation, XsdEngine};
