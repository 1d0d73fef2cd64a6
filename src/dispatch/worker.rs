//! Schema validation worker thread
//!
//! Each worker owns one compiled schema and answers requests in order. It
//! exits when the host drops its request sender.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::validators::xsd_validation::{LoadedSchema, XsdEngine};

use super::protocol::{WorkerReply, WorkerRequest};

/// `part` of the error sent when a document arrives before any schema
const WORKER_ERROR: &str = "Worker error";

/// Host side of a running worker
#[derive(Debug)]
pub struct WorkerHandle {
    /// Request channel
    pub requests: Sender<WorkerRequest>,
    /// Reply channel
    pub replies: Receiver<WorkerReply>,
}

/// Start a worker thread running `engine`
pub fn spawn_worker(thread_name: String, engine: Arc<dyn XsdEngine>) -> Result<WorkerHandle> {
    let (request_tx, request_rx) = mpsc::channel();
    let (reply_tx, reply_rx) = mpsc::channel();

    thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || run(engine, request_rx, reply_tx))
        .map_err(|e| Error::WorkerUnavailable(format!("{}: {}", thread_name, e)))?;

    debug!(worker = %thread_name, "spawned schema validation worker");
    Ok(WorkerHandle {
        requests: request_tx,
        replies: reply_rx,
    })
}

fn run(engine: Arc<dyn XsdEngine>, requests: Receiver<WorkerRequest>, replies: Sender<WorkerReply>) {
    let mut schema: Option<Box<dyn LoadedSchema>> = None;

    for request in requests {
        let sent = match request {
            WorkerRequest::LoadSchema { name, content } => {
                let loaded = match engine.load(&name, &content) {
                    Ok(compiled) => {
                        schema = Some(compiled);
                        true
                    }
                    Err(e) => {
                        warn!(schema = %name, error = %e, "failed to load schema");
                        false
                    }
                };
                replies
                    .send(WorkerReply::SchemaLoaded { file: name, loaded })
                    .is_ok()
            }
            WorkerRequest::ValidateDocument { name, content } => {
                validate(schema.as_deref(), name, &content, &replies)
            }
        };

        if !sent {
            // Host is gone
            break;
        }
    }
}

fn validate(
    schema: Option<&dyn LoadedSchema>,
    file: String,
    content: &str,
    replies: &Sender<WorkerReply>,
) -> bool {
    let Some(schema) = schema else {
        let error = WorkerReply::ValidationError {
            file: file.clone(),
            line: 0,
            node: "document".to_string(),
            part: WORKER_ERROR.to_string(),
            message: "Document: No schema loaded".to_string(),
        };
        return replies.send(error).is_ok()
            && replies
                .send(WorkerReply::ValidationResult { file, valid: false })
                .is_ok();
    };

    let violations = schema.validate(content);
    let valid = violations.is_empty();
    for violation in violations {
        let error = WorkerReply::ValidationError {
            file: file.clone(),
            line: violation.line,
            node: violation.node,
            part: violation.part,
            message: violation.message,
        };
        if replies.send(error).is_err() {
            return false;
        }
    }
    replies
        .send(WorkerReply::ValidationResult { file, valid })
        .is_ok()
}
