//! Core types for streamed traversals.

use serde_json::Value;

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Options for one [`stream_model`](crate::stream_model) traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    /// Whether the stream may be rewound to its start to reach branches that
    /// lie behind the current position. Ignored (with a warning) for streams
    /// that cannot seek.
    pub allow_rewind: bool,
}

impl StreamOptions {
    /// Create options with rewind enabled (default).
    pub fn new() -> Self {
        Self { allow_rewind: true }
    }

    /// Set whether rewinding is allowed.
    pub fn allow_rewind(mut self, allow_rewind: bool) -> Self {
        self.allow_rewind = allow_rewind;
        self
    }
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self::new()
    }
}
