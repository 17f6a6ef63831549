//! Library-wide error type for cardo operations.
//!
//! Every failure carries a single-line human message; `kind()` groups
//! variants into the coarse taxonomy the status-code mapping relies on.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Coarse error grouping used by callers that map failures to statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or out-of-range input.
    Input,
    /// A referenced entity does not exist.
    NotFound,
    /// The operation collides with existing state.
    Conflict,
    /// The operation is forbidden by policy.
    Policy,
    /// Content failed schema validation.
    Schema,
    /// The logic engine failed or returned no answer.
    Engine,
    /// Filesystem or git failure.
    Io,
    /// Cancellation or timeout.
    Concurrency,
    /// Project schema-version mismatch or migration failure.
    Version,
}

/// Canonical error type for all cardo operations.
#[derive(Debug, Error)]
pub enum CardoError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Resource name '{0}' does not match 'prefix/type/identifier'")]
    InvalidResourceName(String),
    #[error("Index {index} is out of range (array has {len} items)")]
    InvalidTargetIndex { index: usize, len: usize },

    #[error("Card '{0}' does not exist in the project")]
    CardNotFound(String),
    #[error("Resource '{0}' does not exist in the project")]
    ResourceNotFound(String),
    #[error("Attachment '{file}' does not exist on card '{card}'")]
    AttachmentNotFound { card: String, file: String },
    #[error("Module '{0}' is not imported")]
    ModuleNotImported(String),
    #[error("Template '{0}' does not exist in the project")]
    TemplateNotFound(String),
    #[error("Item '{0}' was not found in the array")]
    ItemNotFound(String),

    #[error("Card '{0}' already exists")]
    CardExists(String),
    #[error("Resource '{0}' already exists")]
    ResourceExists(String),
    #[error("Attachment '{file}' already exists on card '{card}'")]
    AttachmentExists { card: String, file: String },
    #[error("Module '{0}' is already imported")]
    ModuleAlreadyImported(String),
    #[error("Prefix '{0}' is already in use")]
    PrefixCollision(String),
    #[error("Item '{0}' already exists in the array")]
    ItemAlreadyExists(String),

    #[error("Cannot modify read-only module content '{0}'")]
    ReadOnlyModule(String),
    #[error("Transition '{transition}' is not allowed from state '{state}' on card '{card}'")]
    IllegalTransition { card: String, transition: String, state: String },
    #[error("Cannot move card '{card}' under '{target}': would create a cycle")]
    CycleForbidden { card: String, target: String },
    #[error("Operation denied: {0}")]
    OperationDenied(String),
    #[error("Resource '{name}' is still in use: {usage}")]
    ResourceInUse { name: String, usage: String },

    #[error("Schema validation failed:\n{0}")]
    SchemaViolation(String),
    #[error("Invalid parameter schema: {0}")]
    InvalidParameterSchema(String),
    #[error("Failed to parse JSON at {path}: {detail}")]
    JsonParse { path: PathBuf, detail: String },

    #[error("Logic solver failed: {0}")]
    SolverFailure(String),
    #[error("Query '{0}' returned no answer")]
    NoAnswer(String),

    #[error("Cannot read '{path}': {source}")]
    FileNotReadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Cannot write '{path}': {source}")]
    FileNotWritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Content watcher failed: {0}")]
    WatcherFailed(String),
    #[error("Git {operation} failed: {details}")]
    Git { operation: String, details: String },
    #[error("Edit session '{0}' does not exist")]
    SessionNotFound(String),

    #[error("Operation '{0}' was cancelled")]
    Cancelled(String),
    #[error("Operation '{0}' timed out")]
    Timeout(String),

    #[error("{0}")]
    IncompatibleVersion(String),
    #[error("Migration to version {version} failed: {message}")]
    MigrationFailed { version: u32, message: String },
    #[error("Downgrade from schema version {from} to {to} is not supported")]
    DowngradeRefused { from: u32, to: u32 },
    #[error("Cannot migrate from schema version {from} directly to {to}: intermediate versions would be skipped")]
    VersionSkipped { from: u32, to: u32 },
}

impl CardoError {
    /// Group this error into the coarse taxonomy.
    pub fn kind(&self) -> ErrorKind {
        use CardoError::*;
        match self {
            InvalidInput(_) | InvalidResourceName(_) | InvalidTargetIndex { .. } => {
                ErrorKind::Input
            }
            CardNotFound(_) | ResourceNotFound(_) | AttachmentNotFound { .. }
            | ModuleNotImported(_) | TemplateNotFound(_) | ItemNotFound(_)
            | SessionNotFound(_) => ErrorKind::NotFound,
            CardExists(_) | ResourceExists(_) | AttachmentExists { .. }
            | ModuleAlreadyImported(_) | PrefixCollision(_) | ItemAlreadyExists(_) => {
                ErrorKind::Conflict
            }
            ReadOnlyModule(_) | IllegalTransition { .. } | CycleForbidden { .. }
            | OperationDenied(_) | ResourceInUse { .. } => ErrorKind::Policy,
            SchemaViolation(_) | InvalidParameterSchema(_) | JsonParse { .. } => ErrorKind::Schema,
            SolverFailure(_) | NoAnswer(_) => ErrorKind::Engine,
            FileNotReadable { .. } | FileNotWritable { .. } | WatcherFailed(_) | Git { .. } => {
                ErrorKind::Io
            }
            Cancelled(_) | Timeout(_) => ErrorKind::Concurrency,
            IncompatibleVersion(_) | MigrationFailed { .. } | DowngradeRefused { .. }
            | VersionSkipped { .. } => ErrorKind::Version,
        }
    }

    /// HTTP-ish status used by the synchronous command wrapper.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Input
            | ErrorKind::NotFound
            | ErrorKind::Conflict
            | ErrorKind::Schema
            | ErrorKind::Version => 400,
            ErrorKind::Policy => 403,
            ErrorKind::Engine | ErrorKind::Io | ErrorKind::Concurrency => 500,
        }
    }

    pub(crate) fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CardoError::FileNotReadable { path: path.into(), source }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CardoError::FileNotWritable { path: path.into(), source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn illegal_transition_renders_single_line() {
        let err = CardoError::IllegalTransition {
            card: "demo_1".into(),
            transition: "Approve".into(),
            state: "Deprecated".into(),
        };
        assert_eq!(
            err.to_string(),
            "Transition 'Approve' is not allowed from state 'Deprecated' on card 'demo_1'"
        );
        assert_eq!(err.kind(), ErrorKind::Policy);
        assert_eq!(err.status_code(), 403);
    }

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(CardoError::CardNotFound("x_1".into()).status_code(), 400);
        assert_eq!(CardoError::SolverFailure("boom".into()).status_code(), 500);
        assert_eq!(CardoError::ReadOnlyModule("test".into()).status_code(), 403);
    }
}
