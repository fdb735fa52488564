//! Error types for streaming, schema declaration, construction and path resolution.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised by the forward-only JSON cursor.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    #[error("cannot read document: {source}")]
    Io {
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("invalid JSON at byte {offset}: {message}")]
    Syntax { offset: u64, message: String },

    /// The branch lies behind the current stream position.
    #[error("branch is not reachable without restarting the stream")]
    TransientAccess,

    /// The cursor names a container that was closed or read in an earlier pass.
    #[error("cursor refers to a container that is no longer open")]
    StaleCursor,

    #[error("key \"{key}\" is not present")]
    MissingKey { key: String },

    #[error("index {index} is out of range for a sequence of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("expected {expected}, found {found}")]
    UnexpectedShape {
        expected: &'static str,
        found: &'static str,
    },

    #[error("stream does not support seeking back to its start")]
    RewindUnsupported,
}

impl StreamError {
    pub(crate) fn io(source: std::io::Error) -> Self {
        StreamError::Io {
            source: Arc::new(source),
        }
    }

    /// True when the requested member was already passed in the current pass.
    pub fn is_transient(&self) -> bool {
        matches!(self, StreamError::TransientAccess)
    }

    /// True when the cursor itself can no longer be used.
    pub fn is_stale(&self) -> bool {
        matches!(self, StreamError::StaleCursor)
    }

    /// True when only a restart of the stream can reach the requested branch.
    pub fn needs_restart(&self) -> bool {
        self.is_transient() || self.is_stale()
    }

    /// True when the requested key or index is definitively absent.
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            StreamError::MissingKey { .. } | StreamError::IndexOutOfRange { .. }
        )
    }
}

/// Errors in a schema declaration.
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    #[error("root record '{root}' is not declared")]
    UnknownRoot { root: String },

    #[error("record '{record}' referenced by {referenced_by} is not declared")]
    UnknownRecord {
        record: String,
        referenced_by: String,
    },

    #[error("record '{record}' is declared twice")]
    DuplicateRecord { record: String },

    #[error("field '{field}' is declared twice in record '{record}'")]
    DuplicateField { record: String, field: String },

    #[error("fields of record '{record}' share the wire key '{wire_key}'")]
    DuplicateWireKey { record: String, wire_key: String },

    #[error("invalid type expression \"{expr}\": {message}")]
    InvalidType { expr: String, message: String },

    #[error("invalid schema definition at {path}: {message}")]
    InvalidDefinition { path: String, message: String },
}

/// Failure to map a key onto the schema at some type context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("the schema declares no sequence here")]
    NotSequence,

    #[error("unknown field \"{0}\"")]
    UnknownField(String),
}

/// Single validation violation with path context.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Violation {
    /// JSON Pointer (RFC 6901) to the invalid value, relative to the constructed value.
    pub path: String,
    /// Human-readable error message.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Errors raised by a [`Materializer`](crate::Materializer).
#[derive(Debug, Clone, Error)]
pub enum ConstructionError {
    #[error("validation failed with {} error(s)", violations.len())]
    Invalid { violations: Vec<Violation> },

    #[error("cannot compile validator for {type_ref}: {message}")]
    InvalidDescriptor { type_ref: String, message: String },

    #[error("cannot convert into the requested type: {message}")]
    Deserialize { message: String },
}

/// Errors while navigating or resolving a streamed document.
///
/// Every variant carries the logical path of the failing node as a JSON Pointer.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("cannot index {path:?}: the schema declares no sequence there")]
    NotSequence { path: String },

    #[error("unknown field \"{field}\" at {path:?}")]
    UnknownField { path: String, field: String },

    #[error("{path:?} lies behind the stream position and rewind is disabled")]
    TransientAccess { path: String },

    #[error("cannot construct {type_ref} at {path:?}: {source}")]
    Construction {
        path: String,
        type_ref: String,
        #[source]
        source: ConstructionError,
    },

    #[error("{path:?} is detached from the stream but declares no default")]
    Configuration { path: String },

    #[error("stream error at {path:?}: {source}")]
    Stream {
        path: String,
        #[source]
        source: StreamError,
    },

    #[error("replaying {path:?} after a rewind failed: {source}")]
    Replay {
        path: String,
        #[source]
        source: StreamError,
    },
}

impl ResolveError {
    /// Logical path of the node the error belongs to.
    pub fn path(&self) -> &str {
        match self {
            ResolveError::NotSequence { path }
            | ResolveError::UnknownField { path, .. }
            | ResolveError::TransientAccess { path }
            | ResolveError::Construction { path, .. }
            | ResolveError::Configuration { path }
            | ResolveError::Stream { path, .. }
            | ResolveError::Replay { path, .. } => path,
        }
    }

    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ResolveError::Construction { .. } => 1,
            ResolveError::Stream {
                source: StreamError::Io { .. },
                ..
            }
            | ResolveError::Replay {
                source: StreamError::Io { .. },
                ..
            } => 3,
            _ => 2,
        }
    }
}

/// Errors while opening documents or loading schema definitions.
#[derive(Debug, Error)]
pub enum LoadError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. } | LoadError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            LoadError::NetworkError { .. } => 3,
            _ => 2,
        }
    }
}
