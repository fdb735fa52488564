//! Forward-only structural cursors over a streamed JSON document.
//!
//! A [`JsonStream`] reads the document once, front to back. Cursors into it are
//! cheap handles; a handle stays usable only while the container it names is still
//! open and the stream has not been restarted. Reaching back past the current
//! position fails with [`StreamError::TransientAccess`]; using a handle that is
//! no longer valid fails with [`StreamError::StaleCursor`].

use std::collections::HashSet;

use serde_json::Value;

use super::lexer::Lexer;
use super::source::Source;
use crate::error::StreamError;
use crate::path::PathKey;
use crate::types::json_type_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Object,
    Array,
}

impl ContainerKind {
    fn name(&self) -> &'static str {
        match self {
            ContainerKind::Object => "object",
            ContainerKind::Array => "array",
        }
    }

    fn close(&self) -> u8 {
        match self {
            ContainerKind::Object => b'}',
            ContainerKind::Array => b']',
        }
    }
}

/// Handle to a container opened during one pass over the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHandle {
    epoch: u64,
    id: u64,
    kind: ContainerKind,
}

impl ContainerHandle {
    pub fn kind(&self) -> ContainerKind {
        self.kind
    }
}

/// A position in the document. Scalars are read eagerly when reached.
#[derive(Debug, Clone, PartialEq)]
pub enum Cursor {
    Scalar(Value),
    Container(ContainerHandle),
}

/// Counters for how much work a stream has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Bytes pulled from the source, across restarts.
    pub bytes_read: u64,
    /// Times the stream was rewound to its start.
    pub restarts: u64,
}

struct Frame {
    id: u64,
    kind: ContainerKind,
    /// At least one member has been started; the next token is `,` or the close.
    after_member: bool,
    next_index: usize,
    seen: HashSet<String>,
}

/// The lazily tokenized document.
pub struct JsonStream {
    lexer: Lexer,
    epoch: u64,
    next_id: u64,
    frames: Vec<Frame>,
    restarts: u64,
}

impl JsonStream {
    pub fn new(source: Source) -> Self {
        Self {
            lexer: Lexer::new(source),
            epoch: 0,
            next_id: 0,
            frames: Vec::new(),
            restarts: 0,
        }
    }

    pub fn source_mut(&mut self) -> &mut Source {
        self.lexer.source_mut()
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            bytes_read: self.lexer.bytes_read(),
            restarts: self.restarts,
        }
    }

    /// Begin a pass at the current source position and return the root cursor.
    ///
    /// Invalidates every cursor from earlier passes.
    pub fn load(&mut self) -> Result<Cursor, StreamError> {
        self.epoch += 1;
        self.frames.clear();
        let first = self.lexer.expect_token()?;
        self.open(first)
    }

    /// Rewind the source to the document start and begin a new pass.
    pub fn restart(&mut self) -> Result<Cursor, StreamError> {
        self.lexer.source_mut().rewind()?;
        self.lexer.reset();
        self.restarts += 1;
        tracing::debug!(restarts = self.restarts, "stream rewound to start");
        self.load()
    }

    fn open(&mut self, first: u8) -> Result<Cursor, StreamError> {
        let kind = match first {
            b'{' => ContainerKind::Object,
            b'[' => ContainerKind::Array,
            other => return self.lexer.read_scalar(other).map(Cursor::Scalar),
        };
        let id = self.next_id;
        self.next_id += 1;
        self.frames.push(Frame {
            id,
            kind,
            after_member: false,
            next_index: 0,
            seen: HashSet::new(),
        });
        Ok(Cursor::Container(ContainerHandle {
            epoch: self.epoch,
            id,
            kind,
        }))
    }

    /// Depth of the open frame for `handle`.
    fn locate(&self, handle: &ContainerHandle) -> Result<usize, StreamError> {
        if handle.epoch != self.epoch {
            return Err(StreamError::StaleCursor);
        }
        self.frames
            .iter()
            .rposition(|frame| frame.id == handle.id)
            .ok_or(StreamError::StaleCursor)
    }

    /// Advance the innermost open container to its next member.
    ///
    /// Object members come back as their key with the `:` consumed; array members as
    /// their index with nothing consumed. At the closing bracket the frame is popped
    /// and `None` returned.
    fn next_member(&mut self) -> Result<Option<PathKey>, StreamError> {
        let Some(frame) = self.frames.last_mut() else {
            return Ok(None);
        };
        let close = frame.kind.close();
        if frame.after_member {
            match self.lexer.expect_token()? {
                b',' => {}
                b if b == close => {
                    self.frames.pop();
                    return Ok(None);
                }
                _ => return Err(self.lexer.syntax("expected ',' or closing bracket")),
            }
        } else if self.lexer.peek_token()? == Some(close) {
            self.lexer.bump();
            self.frames.pop();
            return Ok(None);
        }
        frame.after_member = true;
        match frame.kind {
            ContainerKind::Object => {
                let key = self.lexer.read_key()?;
                frame.seen.insert(key.clone());
                Ok(Some(PathKey::Field(key)))
            }
            ContainerKind::Array => {
                let index = frame.next_index;
                frame.next_index += 1;
                Ok(Some(PathKey::Index(index)))
            }
        }
    }

    /// Skip whatever is left of every container nested below `depth`.
    fn finish_above(&mut self, depth: usize) -> Result<(), StreamError> {
        while self.frames.len() > depth + 1 {
            let target = self.frames.len() - 1;
            while self.frames.len() > target {
                if self.next_member()?.is_some() {
                    self.lexer.skip_value()?;
                }
            }
        }
        Ok(())
    }

    /// Descend from `cursor` by `key`, skipping siblings on the way.
    ///
    /// # Errors
    ///
    /// `TransientAccess` when the member was already passed, `StaleCursor` when the
    /// container is no longer open, `MissingKey`/`IndexOutOfRange` when the container ends without
    /// it, `UnexpectedShape` when the key does not fit the container.
    pub fn descend(&mut self, cursor: &Cursor, key: &PathKey) -> Result<Cursor, StreamError> {
        let expected = if key.is_index() { "array" } else { "object" };
        let handle = match cursor {
            Cursor::Scalar(value) => {
                return Err(StreamError::UnexpectedShape {
                    expected,
                    found: json_type_name(value),
                })
            }
            Cursor::Container(handle) => *handle,
        };
        if handle.kind.name() != expected {
            return Err(StreamError::UnexpectedShape {
                expected,
                found: handle.kind.name(),
            });
        }

        let depth = self.locate(&handle)?;
        self.finish_above(depth)?;

        let frame = &self.frames[depth];
        let mut len = frame.next_index;
        let passed = match key {
            PathKey::Field(name) => frame.seen.contains(name),
            PathKey::Index(index) => *index < frame.next_index,
        };
        if passed {
            return Err(StreamError::TransientAccess);
        }

        loop {
            match self.next_member()? {
                None => {
                    return Err(match key {
                        PathKey::Field(name) => StreamError::MissingKey { key: name.clone() },
                        PathKey::Index(index) => StreamError::IndexOutOfRange { index: *index, len },
                    })
                }
                Some(member) if &member == key => {
                    let first = self.lexer.expect_token()?;
                    return self.open(first);
                }
                Some(member) => {
                    if let PathKey::Index(index) = member {
                        len = index + 1;
                    }
                    self.lexer.skip_value()?;
                }
            }
        }
    }

    /// Decode the whole subtree under `cursor`.
    ///
    /// # Errors
    ///
    /// `TransientAccess` if any part of the container was already consumed,
    /// `StaleCursor` if it is no longer open.
    pub fn materialize(&mut self, cursor: &Cursor) -> Result<Value, StreamError> {
        let handle = match cursor {
            Cursor::Scalar(value) => return Ok(value.clone()),
            Cursor::Container(handle) => handle,
        };
        let depth = self.locate(handle)?;
        if depth + 1 != self.frames.len() || self.frames[depth].after_member {
            return Err(StreamError::TransientAccess);
        }
        let open = match handle.kind {
            ContainerKind::Object => b'{',
            ContainerKind::Array => b'[',
        };
        let value = self.lexer.read_container(open)?;
        self.frames.pop();
        Ok(value)
    }
}

impl std::fmt::Debug for JsonStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonStream")
            .field("epoch", &self.epoch)
            .field("open_containers", &self.frames.len())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stream(text: &str) -> (JsonStream, Cursor) {
        let mut source = Source::from_string(text);
        assert!(source.supports_rewind());
        let mut stream = JsonStream::new(source);
        let root = stream.load().unwrap();
        (stream, root)
    }

    fn key(name: &str) -> PathKey {
        PathKey::from(name)
    }

    #[test]
    fn descends_forward_through_members() {
        let (mut s, root) = stream(r#"{"count": 3, "results": ["a", "b", "c"]}"#);
        assert_eq!(s.descend(&root, &key("count")).unwrap(), Cursor::Scalar(json!(3)));
        let results = s.descend(&root, &key("results")).unwrap();
        assert_eq!(
            s.descend(&results, &PathKey::Index(1)).unwrap(),
            Cursor::Scalar(json!("b"))
        );
    }

    #[test]
    fn passed_key_is_transient() {
        let (mut s, root) = stream(r#"{"count": 3, "results": ["a"]}"#);
        s.descend(&root, &key("results")).unwrap();
        assert!(matches!(
            s.descend(&root, &key("count")),
            Err(StreamError::TransientAccess)
        ));
    }

    #[test]
    fn absent_key_is_missing() {
        let (mut s, root) = stream(r#"{"count": 3}"#);
        assert!(matches!(
            s.descend(&root, &key("results")),
            Err(StreamError::MissingKey { .. })
        ));
        // the object is closed now
        assert!(matches!(
            s.descend(&root, &key("count")),
            Err(StreamError::StaleCursor)
        ));
    }

    #[test]
    fn index_out_of_range_reports_length() {
        let (mut s, root) = stream(r#"[10, 20]"#);
        match s.descend(&root, &PathKey::Index(5)) {
            Err(StreamError::IndexOutOfRange { index, len }) => {
                assert_eq!(index, 5);
                assert_eq!(len, 2);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn parent_access_skips_rest_of_child() {
        let (mut s, root) = stream(r#"{"a": {"x": 1, "y": [1, 2]}, "b": 2}"#);
        let a = s.descend(&root, &key("a")).unwrap();
        assert_eq!(s.descend(&a, &key("x")).unwrap(), Cursor::Scalar(json!(1)));
        assert_eq!(s.descend(&root, &key("b")).unwrap(), Cursor::Scalar(json!(2)));
        assert!(matches!(s.descend(&a, &key("y")), Err(StreamError::StaleCursor)));
    }

    #[test]
    fn materializes_untouched_subtree() {
        let (mut s, root) = stream(r#"{"skip": [1, {"z": "]"}], "keep": {"v": [1, 2]}, "after": true}"#);
        let keep = s.descend(&root, &key("keep")).unwrap();
        assert_eq!(s.materialize(&keep).unwrap(), json!({ "v": [1, 2] }));
        assert_eq!(s.descend(&root, &key("after")).unwrap(), Cursor::Scalar(json!(true)));
    }

    #[test]
    fn partially_consumed_subtree_is_transient() {
        let (mut s, root) = stream(r#"{"list": [1, 2, 3]}"#);
        let list = s.descend(&root, &key("list")).unwrap();
        s.descend(&list, &PathKey::Index(0)).unwrap();
        assert!(matches!(s.materialize(&list), Err(StreamError::TransientAccess)));
    }

    #[test]
    fn restart_invalidates_old_cursors() {
        let (mut s, root) = stream(r#"{"a": 1, "b": 2}"#);
        s.descend(&root, &key("b")).unwrap();
        let fresh = s.restart().unwrap();
        assert!(matches!(s.descend(&root, &key("a")), Err(StreamError::StaleCursor)));
        assert!(matches!(s.materialize(&root), Err(StreamError::StaleCursor)));
        assert_eq!(s.descend(&fresh, &key("a")).unwrap(), Cursor::Scalar(json!(1)));
        assert_eq!(s.stats().restarts, 1);
    }

    #[test]
    fn shape_mismatches() {
        let (mut s, root) = stream(r#"{"n": 1, "l": []}"#);
        assert!(matches!(
            s.descend(&root, &PathKey::Index(0)),
            Err(StreamError::UnexpectedShape { expected: "array", found: "object" })
        ));
        let n = s.descend(&root, &key("n")).unwrap();
        assert!(matches!(
            s.descend(&n, &key("x")),
            Err(StreamError::UnexpectedShape { expected: "object", found: "number" })
        ));
    }

    #[test]
    fn scalar_document() {
        let (mut s, root) = stream(" \"just a string\" ");
        assert_eq!(s.materialize(&root).unwrap(), json!("just a string"));
    }

    #[test]
    fn forward_only_restart_fails() {
        let source = Source::forward_only(std::io::Cursor::new(b"{}".to_vec()));
        let mut s = JsonStream::new(source);
        s.load().unwrap();
        assert!(matches!(s.restart(), Err(StreamError::RewindUnsupported)));
    }
}
