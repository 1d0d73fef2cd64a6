//! User-facing diagnostics
//!
//! An [`Issue`] is one line in a result panel. An [`IssueList`] accumulates
//! the issues of the most recent validation run; every run gets a fresh
//! generation and appends from older runs are dropped.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::trace;

/// One diagnostic line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    /// Short description
    pub title: String,
    /// Where the problem is, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Issue {
    /// Create an issue with only a title
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: None,
        }
    }

    /// Attach a message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)?;
        if let Some(ref message) = self.message {
            write!(f, " ({})", message)?;
        }
        Ok(())
    }
}

/// Identifies one validation run against an [`IssueList`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunToken(u64);

impl RunToken {
    /// Generation number of the run
    pub fn generation(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
struct IssueListInner {
    generation: u64,
    issues: Vec<Issue>,
}

/// Shared, ordered list of issues owned by the latest run
#[derive(Debug, Clone, Default)]
pub struct IssueList {
    inner: Arc<Mutex<IssueListInner>>,
}

impl IssueList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, IssueListInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear the list and hand out the token of a new run
    pub fn start_run(&self) -> RunToken {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.issues.clear();
        RunToken(inner.generation)
    }

    /// Append issues for `token`'s run; returns `false` if that run is stale
    pub fn extend(&self, token: RunToken, issues: impl IntoIterator<Item = Issue>) -> bool {
        let mut inner = self.lock();
        if inner.generation != token.0 {
            trace!(
                stale = token.0,
                current = inner.generation,
                "discarding issues of superseded run"
            );
            return false;
        }
        inner.issues.extend(issues);
        true
    }

    /// Copy of the current issues
    pub fn snapshot(&self) -> Vec<Issue> {
        self.lock().issues.clone()
    }

    /// Number of current issues
    pub fn len(&self) -> usize {
        self.lock().issues.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.lock().issues.is_empty()
    }
}
