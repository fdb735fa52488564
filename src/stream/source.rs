//! Byte sources for streamed documents.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};

use crate::error::StreamError;

trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

enum Inner {
    Seekable(Box<dyn ReadSeek>),
    ForwardOnly(Box<dyn Read>),
}

/// A document stream that may or may not support seeking back to its start.
///
/// Seekability is probed once by [`supports_rewind`](Source::supports_rewind),
/// which also records the offset that later rewinds return to.
pub struct Source {
    inner: Inner,
    start: Option<u64>,
}

impl Source {
    /// Wrap a reader that can seek. Whether seeking actually works (a pipe
    /// behind a `File` cannot) is decided by the probe.
    pub fn seekable<R: Read + Seek + 'static>(reader: R) -> Self {
        Self {
            inner: Inner::Seekable(Box::new(reader)),
            start: None,
        }
    }

    /// Wrap a reader that can only move forward.
    pub fn forward_only<R: Read + 'static>(reader: R) -> Self {
        Self {
            inner: Inner::ForwardOnly(Box::new(reader)),
            start: None,
        }
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::seekable(io::Cursor::new(bytes.into()))
    }

    pub fn from_string(text: impl Into<String>) -> Self {
        Self::from_bytes(text.into().into_bytes())
    }

    /// Probe whether the stream can be rewound, remembering the current offset as
    /// the document start. Must be called before anything is read.
    pub fn supports_rewind(&mut self) -> bool {
        if self.start.is_some() {
            return true;
        }
        match &mut self.inner {
            Inner::Seekable(reader) => match reader.stream_position() {
                Ok(offset) => {
                    self.start = Some(offset);
                    true
                }
                Err(_) => false,
            },
            Inner::ForwardOnly(_) => false,
        }
    }

    /// Seek back to the offset recorded by the probe.
    pub fn rewind(&mut self) -> Result<(), StreamError> {
        match (&mut self.inner, self.start) {
            (Inner::Seekable(reader), Some(start)) => reader
                .seek(SeekFrom::Start(start))
                .map(|_| ())
                .map_err(StreamError::io),
            _ => Err(StreamError::RewindUnsupported),
        }
    }
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            Inner::Seekable(reader) => reader.read(buf),
            Inner::ForwardOnly(reader) => reader.read(buf),
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.inner {
            Inner::Seekable(_) => "seekable",
            Inner::ForwardOnly(_) => "forward-only",
        };
        f.debug_struct("Source")
            .field("kind", &kind)
            .field("start", &self.start)
            .finish()
    }
}
