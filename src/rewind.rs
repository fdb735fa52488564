//! Recovery from branches that lie behind the stream position.

use crate::error::{ResolveError, StreamError};
use crate::node::lookup_error;
use crate::path::{to_pointer, PathKey};
use crate::schema::{FieldDescriptor, Schema};
use crate::stream::{Cursor, JsonStream};

/// Decides once whether a traversal may rewind, then rebuilds cursors by replaying
/// logical paths from the document start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewindController {
    enabled: bool,
}

impl RewindController {
    /// Probe the stream. A requested rewind on a stream that cannot seek is
    /// disabled for the whole traversal.
    pub fn negotiate(requested: bool, stream: &mut JsonStream) -> Self {
        if !requested {
            return Self { enabled: false };
        }
        if !stream.source_mut().supports_rewind() {
            tracing::warn!("rewind requested on a stream that does not support seeking; disabling rewind");
            return Self { enabled: false };
        }
        Self { enabled: true }
    }

    /// Whether this traversal may restart its stream.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Seek to the start and walk `path` again, translating aliases on the way.
    ///
    /// A transient failure during the replay is fatal: the document did not get
    /// shorter, so nothing would be gained by retrying.
    pub fn rewind_and_replay(
        &self,
        stream: &mut JsonStream,
        schema: &Schema,
        path: &[PathKey],
    ) -> Result<Cursor, ResolveError> {
        let pointer = to_pointer(path);
        let replay_error = |source: StreamError| ResolveError::Replay {
            path: pointer.clone(),
            source,
        };
        if !self.enabled {
            return Err(replay_error(StreamError::RewindUnsupported));
        }
        tracing::debug!(path = %pointer, "replaying path after rewind");

        let mut cursor = stream.restart().map_err(replay_error)?;
        let mut descriptor: Option<FieldDescriptor> = None;
        for (depth, key) in path.iter().enumerate() {
            let field = schema
                .resolve_field(descriptor.as_ref(), key)
                .map_err(|e| lookup_error(e, &path[..depth]))?;
            cursor = stream
                .descend(&cursor, &field.wire_key(key))
                .map_err(|source| match source {
                    source if source.needs_restart() => replay_error(source),
                    other => ResolveError::Stream {
                        path: to_pointer(&path[..=depth]),
                        source: other,
                    },
                })?;
            descriptor = Some(field);
        }
        Ok(cursor)
    }
}
