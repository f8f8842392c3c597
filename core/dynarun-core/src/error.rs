//! Error types for dynarun-core operations.

use std::path::PathBuf;

/// All errors that can occur while orchestrating a session.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    // ─────────────────────────────────────────────────────────────────────
    // Entry Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Invalid entry {entry:?}: {reason}")]
    InvalidEntry { entry: String, reason: String },

    #[error("Could not find entry {entry}")]
    EntryNotFound { entry: String },

    // ─────────────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Interpreter {interpreter} could not be started: {source}")]
    InterpreterUnavailable {
        interpreter: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Interpreter failed: {details}")]
    InterpreterFailed { details: String },

    /// The target program's top-level code raised; its traceback has already
    /// been written to the inherited stderr.
    #[error("Target {entry} exited with {}", describe_exit(.code))]
    TargetFailed { entry: String, code: Option<i32> },

    // ─────────────────────────────────────────────────────────────────────
    // Coverage Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Malformed coverage fragment: {path}: {details}")]
    MalformedFragment { path: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}

impl RunError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        RunError::Io {
            context: context.into(),
            source,
        }
    }

    /// True for errors raised while resolving the entry, before any session
    /// artifact exists.
    pub fn is_entry_error(&self) -> bool {
        matches!(
            self,
            RunError::InvalidEntry { .. } | RunError::EntryNotFound { .. }
        )
    }
}

/// Convenience type alias for Results using RunError.
pub type Result<T> = std::result::Result<T, RunError>;
