//! Messages exchanged with a schema validation worker
//!
//! Loading a schema and validating a document are separate request types, so
//! the worker never has to guess what a payload is. The JSON form uses a
//! `type` tag, e.g. `{"type":"schemaLoaded","file":"SCL.xsd","loaded":true}`.

use serde::{Deserialize, Serialize};

/// Host to worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerRequest {
    /// Compile `content` as the worker's schema, named by its cache key
    LoadSchema {
        /// Schema cache key, e.g. `SCL2007B4.xsd`
        name: String,
        /// XSD text
        content: String,
    },
    /// Validate `content` against the loaded schema
    ValidateDocument {
        /// Display name of the document
        name: String,
        /// Serialized document
        content: String,
    },
}

/// Worker to host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerReply {
    /// Acknowledges a [`WorkerRequest::LoadSchema`]
    SchemaLoaded {
        /// Schema cache key
        file: String,
        /// Whether the schema compiled
        loaded: bool,
    },
    /// Final message for one validated document
    ValidationResult {
        /// Document display name
        file: String,
        /// No violations were found
        valid: bool,
    },
    /// One schema violation
    ValidationError {
        /// Document display name
        file: String,
        /// 1-based line, 0 when unknown
        line: u32,
        /// Offending element
        node: String,
        /// Error class, e.g. `Schemas validity error`
        part: String,
        /// `context: description`
        message: String,
    },
}

impl WorkerReply {
    /// Name of the schema or document the reply is about
    pub fn file(&self) -> &str {
        match self {
            WorkerReply::SchemaLoaded { file, .. }
            | WorkerReply::ValidationResult { file, .. }
            | WorkerReply::ValidationError { file, .. } => file,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_wire_form() {
        let reply = WorkerReply::SchemaLoaded {
            file: "SCL.xsd".to_string(),
            loaded: true,
        };
        assert_eq!(
            serde_json::to_string(&reply).unwrap(),
            r#"{"type":"schemaLoaded","file":"SCL.xsd","loaded":true}"#
        );
    }

    #[test]
    fn test_request_kinds_are_distinct() {
        let json = r#"{"type":"validateDocument","name":"SCL.xsd","content":"<SCL/>"}"#;
        let request: WorkerRequest = serde_json::from_str(json).unwrap();
        // A document may be called anything, even a schema-like name
        assert!(matches!(request, WorkerRequest::ValidateDocument { .. }));
    }

    #[test]
    fn test_error_reply_file() {
        let reply: WorkerReply = serde_json::from_str(
            r#"{"type":"validationError","file":"a.scd","line":3,"node":"DO","part":"Schemas validity error","message":"Element 'DO': x"}"#,
        )
        .unwrap();
        assert_eq!(reply.file(), "a.scd");
    }
}
