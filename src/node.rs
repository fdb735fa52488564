//! Lazy, schema-shaped navigation over a streamed document.
//!
//! [`stream_model`] opens a traversal and returns the root [`PathNode`]. Accessing a
//! field or index yields another node without decoding anything; [`PathNode::resolve`]
//! decodes just that node's subtree and constructs a validated [`Instance`].
//!
//! One traversal owns one stream. Nodes share it through an `Rc`, so they are
//! confined to the thread that created them.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ConstructionError, LookupError, ResolveError, StreamError};
use crate::instance::Instance;
use crate::materializer::{Materializer, SchemaMaterializer};
use crate::path::{pointer_segments, to_pointer, PathKey};
use crate::rewind::RewindController;
use crate::schema::{FieldDescriptor, Schema, TypeRef};
use crate::stream::{Cursor, JsonStream, Source, StreamStats};
use crate::types::StreamOptions;

/// State shared by every node of one traversal. Never mutated after creation,
/// apart from the stream position itself.
struct Traversal {
    stream: RefCell<JsonStream>,
    schema: Arc<Schema>,
    rewind: RewindController,
    materializer: Box<dyn Materializer>,
}

impl fmt::Debug for Traversal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Traversal")
            .field("root", &self.schema.root())
            .field("rewind", &self.rewind.is_enabled())
            .finish_non_exhaustive()
    }
}

/// Outcome of resolving a node. Moves out of `Unresolved` at most once.
#[derive(Debug, Clone)]
pub enum ResolutionState {
    Unresolved,
    Resolved(Instance),
    Failed(ResolveError),
}

impl ResolutionState {
    fn outcome(&self) -> Option<Result<Instance, ResolveError>> {
        match self {
            ResolutionState::Unresolved => None,
            ResolutionState::Resolved(instance) => Some(Ok(instance.clone())),
            ResolutionState::Failed(error) => Some(Err(error.clone())),
        }
    }
}

/// Build the error for a failed schema lookup below `parent`.
pub(crate) fn lookup_error(error: LookupError, parent: &[PathKey]) -> ResolveError {
    let path = to_pointer(parent);
    match error {
        LookupError::NotSequence => ResolveError::NotSequence { path },
        LookupError::UnknownField(field) => ResolveError::UnknownField { path, field },
    }
}

/// Open a traversal of `source` shaped by `schema` and return its root node.
///
/// Only the first token of the document is read.
///
/// # Errors
///
/// Returns `ResolveError::Stream` if the document does not start with a JSON value.
pub fn stream_model(
    schema: Arc<Schema>,
    source: Source,
    options: &StreamOptions,
) -> Result<PathNode, ResolveError> {
    stream_model_with(schema, source, options, Box::new(SchemaMaterializer::new()))
}

/// Like [`stream_model`], constructing values with a custom [`Materializer`].
pub fn stream_model_with(
    schema: Arc<Schema>,
    source: Source,
    options: &StreamOptions,
    materializer: Box<dyn Materializer>,
) -> Result<PathNode, ResolveError> {
    let mut stream = JsonStream::new(source);
    let rewind = RewindController::negotiate(options.allow_rewind, &mut stream);
    let root = stream.load().map_err(|source| ResolveError::Stream {
        path: String::new(),
        source,
    })?;
    let context = Rc::new(Traversal {
        stream: RefCell::new(stream),
        schema,
        rewind,
        materializer,
    });
    Ok(PathNode {
        context,
        cursor: Some(root),
        path: Vec::new(),
        field: None,
        state: RefCell::new(ResolutionState::Unresolved),
    })
}

/// Resolve `node` into a concrete instance. See [`PathNode::resolve`].
pub fn resolve(node: &PathNode) -> Result<Instance, ResolveError> {
    node.resolve()
}

/// A lazy proxy for one location in the document.
///
/// `cursor` is `None` for a detached node, backed only by its field default. `field`
/// is `None` only for the root, which denotes the whole document.
#[derive(Debug, Clone)]
pub struct PathNode {
    context: Rc<Traversal>,
    cursor: Option<Cursor>,
    path: Vec<PathKey>,
    field: Option<FieldDescriptor>,
    state: RefCell<ResolutionState>,
}

impl PathNode {
    /// Logical path from the document root.
    pub fn path(&self) -> &[PathKey] {
        &self.path
    }

    /// Logical path as a JSON Pointer.
    pub fn location(&self) -> String {
        to_pointer(&self.path)
    }

    /// Field descriptor; `None` at the root.
    pub fn descriptor(&self) -> Option<&FieldDescriptor> {
        self.field.as_ref()
    }

    /// Declared type of this node.
    pub fn type_ref(&self) -> TypeRef {
        match &self.field {
            Some(field) => field.type_ref().clone(),
            None => self.context.schema.root_type(),
        }
    }

    /// True for the node returned by `stream_model`.
    pub fn is_root(&self) -> bool {
        self.field.is_none()
    }

    /// True when the node is backed by a default rather than the stream.
    pub fn is_detached(&self) -> bool {
        self.cursor.is_none()
    }

    /// True once `resolve` has produced a value or an error.
    pub fn is_resolved(&self) -> bool {
        !matches!(*self.state.borrow(), ResolutionState::Unresolved)
    }

    /// Whether the traversal may restart the stream to reach earlier branches.
    pub fn rewind_enabled(&self) -> bool {
        self.context.rewind.is_enabled()
    }

    /// Work done so far by the stream shared with every node of this traversal.
    pub fn stream_stats(&self) -> StreamStats {
        self.context.stream.borrow().stats()
    }

    fn child(&self, cursor: Option<Cursor>, path: Vec<PathKey>, field: FieldDescriptor) -> PathNode {
        PathNode {
            context: Rc::clone(&self.context),
            cursor,
            path,
            field: Some(field),
            state: RefCell::new(ResolutionState::Unresolved),
        }
    }

    /// Navigate to a field or element.
    ///
    /// Consults the schema, translates aliases and advances the stream as far as
    /// needed to reach the child, skipping but not decoding siblings. A child that
    /// lies behind the stream position is recovered from its default when it has
    /// one, otherwise by rewinding (if enabled). A parent cursor invalidated by an
    /// earlier rewind is always replayed.
    ///
    /// # Errors
    ///
    /// `NotSequence`/`UnknownField` when the schema has no such child,
    /// `TransientAccess` when the child is behind the stream position and rewind is
    /// disabled, `Configuration` for a detached child without a default, and
    /// `Stream` for data and I/O failures.
    pub fn access(&self, key: impl Into<PathKey>) -> Result<PathNode, ResolveError> {
        let key = key.into();
        let schema = &self.context.schema;
        let field = schema
            .resolve_field(self.field.as_ref(), &key)
            .map_err(|e| lookup_error(e, &self.path))?;
        let wire_key = field.wire_key(&key);
        let mut path = self.path.clone();
        path.push(key);

        let Some(cursor) = &self.cursor else {
            if !field.has_default() {
                return Err(ResolveError::Configuration {
                    path: to_pointer(&path),
                });
            }
            return Ok(self.child(None, path, field));
        };

        let descended = self.context.stream.borrow_mut().descend(cursor, &wire_key);
        match descended {
            Ok(child) => Ok(self.child(Some(child), path, field)),
            Err(e) if e.needs_restart() && !self.rewind_enabled() => {
                Err(ResolveError::TransientAccess {
                    path: to_pointer(&path),
                })
            }
            Err(e) if (e.is_transient() || e.is_absent()) && field.has_default() => {
                tracing::debug!(path = %to_pointer(&path), reason = %e, "falling back to field default");
                Ok(self.child(None, path, field))
            }
            Err(e) if e.needs_restart() => {
                let mut stream = self.context.stream.borrow_mut();
                let replayed = self.context.rewind.rewind_and_replay(&mut stream, schema, &path);
                drop(stream);
                match replayed {
                    Ok(cursor) => Ok(self.child(Some(cursor), path, field)),
                    Err(ResolveError::Stream { source, .. })
                        if source.is_absent() && field.has_default() =>
                    {
                        tracing::debug!(path = %to_pointer(&path), reason = %source, "falling back to field default");
                        Ok(self.child(None, path, field))
                    }
                    Err(e) => Err(e),
                }
            }
            Err(source) => Err(ResolveError::Stream {
                path: to_pointer(&path),
                source,
            }),
        }
    }

    /// Shorthand for `access` with a field name.
    pub fn field(&self, name: &str) -> Result<PathNode, ResolveError> {
        self.access(name)
    }

    /// Shorthand for `access` with a sequence index.
    pub fn index(&self, index: usize) -> Result<PathNode, ResolveError> {
        self.access(index)
    }

    /// Walk a JSON Pointer of logical keys, e.g. `/quiz/sport/q1`.
    ///
    /// A segment is taken as an index when it is numeric and the current node's type
    /// is sequence-capable; otherwise it names a field.
    pub fn pointer(&self, pointer: &str) -> Result<PathNode, ResolveError> {
        let mut node = self.clone();
        for segment in pointer_segments(pointer) {
            let sequence = node
                .field
                .as_ref()
                .map_or(false, |field| field.type_ref().is_sequence_capable());
            let key = match segment.parse::<usize>() {
                Ok(index) if sequence => PathKey::Index(index),
                _ => PathKey::Field(segment),
            };
            node = node.access(key)?;
        }
        Ok(node)
    }

    /// Decode this node's subtree and construct its declared type.
    ///
    /// The outcome, success or failure, is stored on the node; later calls return it
    /// without touching the stream.
    pub fn resolve(&self) -> Result<Instance, ResolveError> {
        if let Some(outcome) = self.state.borrow().outcome() {
            return outcome;
        }
        let outcome = self.compute();
        *self.state.borrow_mut() = match &outcome {
            Ok(instance) => ResolutionState::Resolved(instance.clone()),
            Err(error) => ResolutionState::Failed(error.clone()),
        };
        outcome
    }

    /// Resolve and convert into `T`.
    pub fn resolve_as<T: DeserializeOwned>(&self) -> Result<T, ResolveError> {
        self.resolve()?
            .deserialize()
            .map_err(|e| ResolveError::Construction {
                path: self.location(),
                type_ref: self.type_ref().to_string(),
                source: ConstructionError::Deserialize {
                    message: e.to_string(),
                },
            })
    }

    fn compute(&self) -> Result<Instance, ResolveError> {
        let context = &self.context;
        let Some(field) = &self.field else {
            let raw = self.decode_root()?;
            return self.construct(&context.schema.root_type(), raw);
        };
        let Some(cursor) = &self.cursor else {
            let default = field
                .produce_default()
                .ok_or_else(|| ResolveError::Configuration {
                    path: self.location(),
                })?;
            return Ok(context
                .materializer
                .echo(&context.schema, field.type_ref(), default));
        };
        let raw = self.decode(cursor)?;
        self.construct(field.type_ref(), raw)
    }

    fn decode_root(&self) -> Result<Value, ResolveError> {
        let mut stream = self.context.stream.borrow_mut();
        let decoded = if self.rewind_enabled() {
            stream.restart().and_then(|root| stream.materialize(&root))
        } else {
            let cursor = self.cursor.as_ref().ok_or_else(|| ResolveError::Configuration {
                path: String::new(),
            })?;
            stream.materialize(cursor)
        };
        decoded.map_err(|source| self.stream_error(source))
    }

    fn decode(&self, cursor: &Cursor) -> Result<Value, ResolveError> {
        let mut stream = self.context.stream.borrow_mut();
        match stream.materialize(cursor) {
            Ok(raw) => Ok(raw),
            Err(e) if e.needs_restart() && self.rewind_enabled() => {
                let fresh = self
                    .context
                    .rewind
                    .rewind_and_replay(&mut stream, &self.context.schema, &self.path)?;
                stream.materialize(&fresh).map_err(|source| match source {
                    source if source.needs_restart() => ResolveError::Replay {
                        path: self.location(),
                        source,
                    },
                    other => self.stream_error(other),
                })
            }
            Err(source) => Err(self.stream_error(source)),
        }
    }

    fn stream_error(&self, source: StreamError) -> ResolveError {
        match source {
            source if source.needs_restart() => ResolveError::TransientAccess {
                path: self.location(),
            },
            source => ResolveError::Stream {
                path: self.location(),
                source,
            },
        }
    }

    fn construct(&self, type_ref: &TypeRef, raw: Value) -> Result<Instance, ResolveError> {
        tracing::debug!(path = %self.location(), type_ref = %type_ref, "constructing resolved value");
        self.context
            .materializer
            .construct(&self.context.schema, type_ref, raw)
            .map_err(|source| ResolveError::Construction {
                path: self.location(),
                type_ref: type_ref.to_string(),
                source,
            })
    }
}
