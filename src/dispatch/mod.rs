//! Schema validation dispatch
//!
//! Validating a project against its SCL schema runs on a background worker,
//! one per schema cache key. The first request for a key spawns the worker,
//! loads the schema and waits for the acknowledgement; later requests reuse
//! it. A schema that fails to load is never cached, and neither is a worker
//! that went away, so the next request starts over.

pub mod protocol;
pub mod worker;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use once_cell::sync::{Lazy, OnceCell};
use tracing::{debug, info, trace, warn};

use crate::config::ValidationConfig;
use crate::documents::SclDocument;
use crate::error::{Error, Result};
use crate::issues::Issue;
use crate::schemas::{get_schema, schema_cache_key, SchemaVariant};
use crate::validators::xsd_validation::{StructuralXsdEngine, XsdEngine};

pub use protocol::{WorkerReply, WorkerRequest};
pub use worker::{spawn_worker, WorkerHandle};

/// Title of the issue appended when a document has no schema violations
pub const SCHEMA_VALID_TITLE: &str = "Project is schema valid";

static GLOBAL: Lazy<Mutex<Option<Arc<SchemaValidationDispatcher>>>> =
    Lazy::new(|| Mutex::new(None));

/// A loaded schema and the worker holding it
#[derive(Debug)]
pub struct SchemaValidator {
    schema_name: String,
    handle: Mutex<WorkerHandle>,
}

impl SchemaValidator {
    /// Spawn a worker and load `schema_text` into it
    fn start(
        thread_name: String,
        engine: Arc<dyn XsdEngine>,
        schema_name: &str,
        schema_text: &str,
    ) -> Result<Self> {
        let handle = spawn_worker(thread_name, engine)?;
        handle
            .requests
            .send(WorkerRequest::LoadSchema {
                name: schema_name.to_string(),
                content: schema_text.to_string(),
            })
            .map_err(|_| Error::WorkerDisconnected(schema_name.to_string()))?;

        loop {
            let reply = handle
                .replies
                .recv()
                .map_err(|_| Error::WorkerDisconnected(schema_name.to_string()))?;
            match reply {
                WorkerReply::SchemaLoaded { file, loaded } if file == schema_name => {
                    if !loaded {
                        return Err(Error::SchemaLoad {
                            schema: schema_name.to_string(),
                            reason: "worker reported loaded: false".to_string(),
                        });
                    }
                    break;
                }
                other => trace!(reply = ?other, "ignoring reply while waiting for schema"),
            }
        }

        Ok(Self {
            schema_name: schema_name.to_string(),
            handle: Mutex::new(handle),
        })
    }

    /// Cache key of the loaded schema
    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    /// Validate `content`, reported under `doc_name`
    ///
    /// Violations become issues in arrival order; a valid document yields the
    /// single [`SCHEMA_VALID_TITLE`] issue.
    pub fn validate(&self, content: impl Into<String>, doc_name: &str) -> Result<Vec<Issue>> {
        let handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        let disconnected = || Error::WorkerDisconnected(self.schema_name.clone());

        handle
            .requests
            .send(WorkerRequest::ValidateDocument {
                name: doc_name.to_string(),
                content: content.into(),
            })
            .map_err(|_| disconnected())?;

        let mut issues = Vec::new();
        loop {
            match handle.replies.recv().map_err(|_| disconnected())? {
                WorkerReply::ValidationError {
                    file,
                    line,
                    node,
                    part,
                    message,
                } if file == doc_name => {
                    issues.push(violation_issue(&file, line, &node, &part, &message));
                }
                WorkerReply::ValidationResult { file, valid } if file == doc_name => {
                    if valid {
                        issues.push(Issue::new(SCHEMA_VALID_TITLE));
                    }
                    return Ok(issues);
                }
                other => trace!(reply = ?other, "ignoring reply for another file"),
            }
        }
    }
}

/// Turn one worker error into an issue
///
/// `message` is split at its first `": "`: the part after it becomes the
/// title, the part before it the parenthesized context. Without a separator
/// the whole message is the title.
pub fn violation_issue(file: &str, line: u32, node: &str, part: &str, message: &str) -> Issue {
    match message.split_once(": ") {
        Some((context, description)) => Issue::new(description)
            .with_message(format!("{}:{} {} {} ({})", file, line, node, part, context)),
        None => Issue::new(message).with_message(format!("{}:{} {} {}", file, line, node, part)),
    }
}

/// Cache entry for one key, filled by whichever caller starts the worker
type ValidatorSlot = Arc<OnceCell<Arc<SchemaValidator>>>;

/// Routes documents to the schema worker matching their declared version
pub struct SchemaValidationDispatcher {
    engine: Arc<dyn XsdEngine>,
    worker_name_prefix: String,
    validators: Mutex<HashMap<String, ValidatorSlot>>,
}

impl std::fmt::Debug for SchemaValidationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidationDispatcher")
            .field("worker_name_prefix", &self.worker_name_prefix)
            .field("schemas", &self.cached_schemas())
            .finish()
    }
}

impl Default for SchemaValidationDispatcher {
    fn default() -> Self {
        Self::new(&ValidationConfig::default())
    }
}

impl SchemaValidationDispatcher {
    /// Create a dispatcher using the built-in XSD engine
    pub fn new(config: &ValidationConfig) -> Self {
        Self::with_engine(config, Arc::new(StructuralXsdEngine))
    }

    /// Create a dispatcher using a custom XSD engine
    pub fn with_engine(config: &ValidationConfig, engine: Arc<dyn XsdEngine>) -> Self {
        Self {
            engine,
            worker_name_prefix: config.worker_name_prefix.clone(),
            validators: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide dispatcher, created with defaults on first use
    pub fn global() -> Arc<Self> {
        let mut global = GLOBAL.lock().unwrap_or_else(PoisonError::into_inner);
        global.get_or_insert_with(|| Arc::new(Self::default())).clone()
    }

    /// Replace the process-wide dispatcher
    pub fn install_global(config: &ValidationConfig) -> Arc<Self> {
        let dispatcher = Arc::new(Self::new(config));
        *GLOBAL.lock().unwrap_or_else(PoisonError::into_inner) = Some(dispatcher.clone());
        dispatcher
    }

    /// Drop the process-wide dispatcher; its workers exit once unused
    pub fn reset_global() {
        GLOBAL.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    fn lock_validators(&self) -> MutexGuard<'_, HashMap<String, ValidatorSlot>> {
        self.validators.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cache keys with a live worker, sorted
    pub fn cached_schemas(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .lock_validators()
            .iter()
            .filter(|(_, slot)| slot.get().is_some())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// The validator for `schema_name`, starting it if needed
    ///
    /// The cache lock only guards fetching the key's slot. Starting a worker
    /// happens outside it: callers for other keys proceed, callers for the
    /// same key wait on the slot and share its single load.
    pub fn validator_for(&self, schema_name: &str, schema_text: &str) -> Result<Arc<SchemaValidator>> {
        let slot = self
            .lock_validators()
            .entry(schema_name.to_string())
            .or_default()
            .clone();

        let started = slot.get_or_try_init(|| {
            let thread_name = format!("{}-{}", self.worker_name_prefix, schema_name);
            let validator = SchemaValidator::start(thread_name, self.engine.clone(), schema_name, schema_text)?;
            info!(schema = %schema_name, "schema loaded");
            Ok::<_, Error>(Arc::new(validator))
        });

        match started {
            Ok(validator) => Ok(validator.clone()),
            Err(e) => {
                warn!(schema = %schema_name, error = %e, "schema validator not started");
                let mut validators = self.lock_validators();
                let unfilled = validators
                    .get(schema_name)
                    .map_or(false, |cached| Arc::ptr_eq(cached, &slot) && cached.get().is_none());
                if unfilled {
                    validators.remove(schema_name);
                }
                Err(e)
            }
        }
    }

    /// Drop `validator` from the cache if it still serves `schema_name`
    fn evict(&self, schema_name: &str, validator: &Arc<SchemaValidator>) {
        let mut validators = self.lock_validators();
        let current = validators
            .get(schema_name)
            .and_then(|slot| slot.get())
            .map_or(false, |cached| Arc::ptr_eq(cached, validator));
        if current {
            validators.remove(schema_name);
            warn!(schema = %schema_name, "schema worker disconnected, evicted");
        }
    }

    fn run(&self, key: &str, schema_text: &str, doc: &SclDocument, doc_name: &str) -> Result<Vec<Issue>> {
        let validator = self.validator_for(key, schema_text)?;
        let result = validator.validate(doc.xml_text()?.into_owned(), doc_name);
        if let Err(Error::WorkerDisconnected(_)) = &result {
            self.evict(key, &validator);
        }
        result
    }

    /// Validate `doc` against the schema its version declaration selects
    pub fn validate_schema(&self, doc: &SclDocument, doc_name: &str) -> Result<Vec<Issue>> {
        let (version, revision, release) = (doc.version(), doc.revision(), doc.release());
        let key = schema_cache_key(version, revision, release);
        debug!(document = %doc_name, schema = %key, "validating against schema");
        self.run(&key, get_schema(version, revision, release), doc, doc_name)
    }

    /// Validate `doc` against an explicitly chosen schema
    pub fn validate_with_variant(
        &self,
        doc: &SclDocument,
        doc_name: &str,
        variant: SchemaVariant,
    ) -> Result<Vec<Issue>> {
        // Distinct from every version-derived key
        let key = format!("SCL-{}.xsd", variant.name());
        debug!(document = %doc_name, schema = %key, "validating against chosen schema");
        self.run(&key, variant.text(), doc, doc_name)
    }
}
