//! The streaming tokenizer: byte sources, lexing and forward-only cursors.

mod cursor;
mod lexer;
mod source;

pub use cursor::{ContainerHandle, ContainerKind, Cursor, JsonStream, StreamStats};
pub use source::Source;
