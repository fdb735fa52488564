//! Stream Model
//!
//! Lazy, schema-shaped navigation of large JSON documents.
//!
//! A schema declares records, sequences, mappings, unions and fields with aliases or
//! defaults. [`stream_model`] binds that schema to a byte stream and returns a root
//! [`PathNode`]. Field and index access on nodes is resolved against the schema and
//! moves a forward-only cursor through the document; nothing is decoded until
//! [`resolve`] is called, and then only the chosen subtree.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use stream_model::{resolve, stream_model, FieldDescriptor, Schema, Source, StreamOptions, TypeRef};
//!
//! let schema = Schema::builder("Model")
//!     .record("Model", |r| {
//!         r.field("count", FieldDescriptor::new(TypeRef::integer()).alias("$count"))
//!             .field(
//!                 "results",
//!                 FieldDescriptor::new(TypeRef::sequence(TypeRef::string()))
//!                     .alias("$results")
//!                     .default_factory(|| json!(["a", "b", "c"])),
//!             )
//!     })
//!     .build()
//!     .unwrap();
//!
//! let doc = Source::from_string(r#"{"$count": 3}"#);
//! let root = stream_model(Arc::new(schema), doc, &StreamOptions::default()).unwrap();
//!
//! let count = root.field("count").unwrap();
//! assert_eq!(resolve(&count).unwrap(), json!(3));
//!
//! // Absent from the document: the default factory supplies the value
//! let results = root.field("results").unwrap();
//! assert_eq!(resolve(&results).unwrap(), json!(["a", "b", "c"]));
//! ```
//!
//! # Rewind
//!
//! | Source | `allow_rewind` | Access behind the cursor |
//! |--------|----------------|--------------------------|
//! | seekable | `true` | default if declared, else restart and replay the path |
//! | seekable | `false` | `TransientAccess` |
//! | forward-only | either | `TransientAccess` (rewind is disabled with a warning) |
//!
//! # Schema Definition Format
//!
//! Schemas can also be loaded from JSON with [`load_schema`]:
//! ```json
//! { "root": "Model",
//!   "records": { "Model": { "count": "integer",
//!                           "results": { "type": "sequence<string>", "alias": "$results", "default": [] } } } }
//! ```

mod error;
mod instance;
mod loader;
mod materializer;
mod node;
mod path;
mod rewind;
mod schema;
mod stream;
mod types;

pub use error::{
    ConstructionError, LoadError, LookupError, ResolveError, SchemaError, StreamError, Violation,
};
pub use instance::{Instance, Record};
pub use loader::{
    is_url, load_schema, load_schema_auto, load_schema_str, open_document, open_document_auto,
    open_document_str, open_reader,
};
pub use materializer::{Materializer, SchemaMaterializer};
pub use node::{resolve, stream_model, stream_model_with, PathNode, ResolutionState};
pub use path::{pointer_segments, to_pointer, PathKey};
pub use rewind::RewindController;
pub use schema::{
    FieldDefault, FieldDescriptor, RecordBuilder, RecordShape, ScalarKind, Schema, SchemaBuilder,
    TypeRef, JSON_SCHEMA_DRAFT,
};
pub use stream::{ContainerHandle, ContainerKind, Cursor, JsonStream, Source, StreamStats};
pub use types::{json_type_name, StreamOptions};

#[cfg(feature = "remote")]
pub use loader::{load_schema_url, open_document_url};
