//! Byte-level JSON scanning over a [`Source`].

use std::io::{ErrorKind, Read};

use serde_json::{Map, Number, Value};

use super::source::Source;
use crate::error::StreamError;

const BUFFER_SIZE: usize = 8 * 1024;

/// Deepest container nesting `read_value` decodes, matching serde_json.
const MAX_DEPTH: usize = 128;

/// Buffered reader that knows JSON lexical structure but not paths.
pub(crate) struct Lexer {
    source: Source,
    buf: Box<[u8]>,
    pos: usize,
    len: usize,
    /// Bytes consumed since the last reset; reported in syntax errors.
    offset: u64,
    /// Bytes pulled from the source over the lexer's lifetime.
    bytes_read: u64,
}

impl Lexer {
    pub(crate) fn new(source: Source) -> Self {
        Self {
            source,
            buf: vec![0; BUFFER_SIZE].into_boxed_slice(),
            pos: 0,
            len: 0,
            offset: 0,
            bytes_read: 0,
        }
    }

    pub(crate) fn source_mut(&mut self) -> &mut Source {
        &mut self.source
    }

    /// Drop buffered input after the source was repositioned.
    pub(crate) fn reset(&mut self) {
        self.pos = 0;
        self.len = 0;
        self.offset = 0;
    }

    pub(crate) fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub(crate) fn syntax(&self, message: &str) -> StreamError {
        StreamError::Syntax {
            offset: self.offset,
            message: message.to_string(),
        }
    }

    fn fill(&mut self) -> Result<bool, StreamError> {
        loop {
            match self.source.read(&mut self.buf[..]) {
                Ok(0) => return Ok(false),
                Ok(n) => {
                    self.pos = 0;
                    self.len = n;
                    self.bytes_read += n as u64;
                    return Ok(true);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(StreamError::io(e)),
            }
        }
    }

    fn peek(&mut self) -> Result<Option<u8>, StreamError> {
        if self.pos == self.len && !self.fill()? {
            return Ok(None);
        }
        Ok(Some(self.buf[self.pos]))
    }

    pub(crate) fn bump(&mut self) {
        self.pos += 1;
        self.offset += 1;
    }

    fn next_byte(&mut self) -> Result<Option<u8>, StreamError> {
        let b = self.peek()?;
        if b.is_some() {
            self.bump();
        }
        Ok(b)
    }

    fn require_byte(&mut self, context: &str) -> Result<u8, StreamError> {
        match self.next_byte()? {
            Some(b) => Ok(b),
            None => Err(self.syntax(&format!("unexpected end of input in {}", context))),
        }
    }

    /// Skip whitespace and look at the next significant byte without consuming it.
    pub(crate) fn peek_token(&mut self) -> Result<Option<u8>, StreamError> {
        loop {
            match self.peek()? {
                Some(b' ' | b'\t' | b'\n' | b'\r') => self.bump(),
                other => return Ok(other),
            }
        }
    }

    /// Skip whitespace and consume the next significant byte.
    pub(crate) fn expect_token(&mut self) -> Result<u8, StreamError> {
        match self.peek_token()? {
            Some(b) => {
                self.bump();
                Ok(b)
            }
            None => Err(self.syntax("unexpected end of input")),
        }
    }

    /// Read a string body; the opening quote is already consumed.
    pub(crate) fn read_string(&mut self) -> Result<String, StreamError> {
        let mut out = Vec::new();
        loop {
            match self.require_byte("string")? {
                b'"' => break,
                b'\\' => self.read_escape(&mut out)?,
                0x00..=0x1f => return Err(self.syntax("control character in string")),
                b => out.push(b),
            }
        }
        String::from_utf8(out).map_err(|_| self.syntax("invalid UTF-8 in string"))
    }

    fn read_escape(&mut self, out: &mut Vec<u8>) -> Result<(), StreamError> {
        let c = match self.require_byte("escape")? {
            b'"' => '"',
            b'\\' => '\\',
            b'/' => '/',
            b'b' => '\u{8}',
            b'f' => '\u{c}',
            b'n' => '\n',
            b'r' => '\r',
            b't' => '\t',
            b'u' => self.read_unicode_escape()?,
            _ => return Err(self.syntax("invalid escape")),
        };
        let mut utf8 = [0u8; 4];
        out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
        Ok(())
    }

    fn read_hex4(&mut self) -> Result<u32, StreamError> {
        let mut code = 0;
        for _ in 0..4 {
            let b = self.require_byte("unicode escape")?;
            let digit = char::from(b)
                .to_digit(16)
                .ok_or_else(|| self.syntax("invalid hex digit in unicode escape"))?;
            code = code * 16 + digit;
        }
        Ok(code)
    }

    fn read_unicode_escape(&mut self) -> Result<char, StreamError> {
        let first = self.read_hex4()?;
        let code = match first {
            0xD800..=0xDBFF => {
                if self.next_byte()? != Some(b'\\') || self.next_byte()? != Some(b'u') {
                    return Err(self.syntax("unpaired surrogate in unicode escape"));
                }
                let second = self.read_hex4()?;
                if !(0xDC00..=0xDFFF).contains(&second) {
                    return Err(self.syntax("unpaired surrogate in unicode escape"));
                }
                0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00)
            }
            0xDC00..=0xDFFF => return Err(self.syntax("unpaired surrogate in unicode escape")),
            other => other,
        };
        char::from_u32(code).ok_or_else(|| self.syntax("invalid unicode escape"))
    }

    fn skip_string(&mut self) -> Result<(), StreamError> {
        loop {
            match self.require_byte("string")? {
                b'"' => return Ok(()),
                b'\\' => {
                    self.require_byte("escape")?;
                }
                _ => {}
            }
        }
    }

    fn read_number(&mut self, first: u8) -> Result<Value, StreamError> {
        let mut text = vec![first];
        while let Some(b) = self.peek()? {
            if !matches!(b, b'0'..=b'9' | b'+' | b'-' | b'.' | b'e' | b'E') {
                break;
            }
            text.push(b);
            self.bump();
        }
        serde_json::from_slice::<Number>(&text)
            .map(Value::Number)
            .map_err(|_| self.syntax("invalid number"))
    }

    fn read_literal(&mut self, rest: &[u8], value: Value) -> Result<Value, StreamError> {
        for &expected in rest {
            if self.next_byte()? != Some(expected) {
                return Err(self.syntax("invalid literal"));
            }
        }
        Ok(value)
    }

    /// Read a scalar whose first byte is already consumed.
    pub(crate) fn read_scalar(&mut self, first: u8) -> Result<Value, StreamError> {
        match first {
            b'"' => self.read_string().map(Value::String),
            b't' => self.read_literal(b"rue", Value::Bool(true)),
            b'f' => self.read_literal(b"alse", Value::Bool(false)),
            b'n' => self.read_literal(b"ull", Value::Null),
            b'-' | b'0'..=b'9' => self.read_number(first),
            _ => Err(self.syntax("unexpected character")),
        }
    }

    /// Decode the next complete value.
    pub(crate) fn read_value(&mut self) -> Result<Value, StreamError> {
        self.read_value_at(0)
    }

    /// Decode a container whose opening bracket is already consumed.
    pub(crate) fn read_container(&mut self, open: u8) -> Result<Value, StreamError> {
        self.read_container_at(open, 1)
    }

    fn read_value_at(&mut self, depth: usize) -> Result<Value, StreamError> {
        match self.expect_token()? {
            open @ (b'{' | b'[') => self.read_container_at(open, depth + 1),
            first => self.read_scalar(first),
        }
    }

    fn read_container_at(&mut self, open: u8, depth: usize) -> Result<Value, StreamError> {
        if depth > MAX_DEPTH {
            return Err(self.syntax("nesting too deep"));
        }
        if open == b'[' {
            let mut items = Vec::new();
            if self.peek_token()? == Some(b']') {
                self.bump();
                return Ok(Value::Array(items));
            }
            loop {
                items.push(self.read_value_at(depth)?);
                match self.expect_token()? {
                    b',' => {}
                    b']' => return Ok(Value::Array(items)),
                    _ => return Err(self.syntax("expected ',' or ']'")),
                }
            }
        }

        let mut map = Map::new();
        if self.peek_token()? == Some(b'}') {
            self.bump();
            return Ok(Value::Object(map));
        }
        loop {
            let key = self.read_key()?;
            let value = self.read_value_at(depth)?;
            map.insert(key, value);
            match self.expect_token()? {
                b',' => {}
                b'}' => return Ok(Value::Object(map)),
                _ => return Err(self.syntax("expected ',' or '}'")),
            }
        }
    }

    /// Read `"key":` inside an object.
    pub(crate) fn read_key(&mut self) -> Result<String, StreamError> {
        if self.expect_token()? != b'"' {
            return Err(self.syntax("expected object key"));
        }
        let key = self.read_string()?;
        if self.expect_token()? != b':' {
            return Err(self.syntax("expected ':'"));
        }
        Ok(key)
    }

    /// Consume the next value without building it.
    ///
    /// Scalars are checked; container contents are only scanned for brackets and
    /// strings.
    pub(crate) fn skip_value(&mut self) -> Result<(), StreamError> {
        match self.expect_token()? {
            b'{' | b'[' => self.skip_container(),
            b'"' => self.skip_string(),
            first => self.read_scalar(first).map(|_| ()),
        }
    }

    fn skip_container(&mut self) -> Result<(), StreamError> {
        let mut depth = 1usize;
        while depth > 0 {
            match self.require_byte("container")? {
                b'"' => self.skip_string()?,
                b'{' | b'[' => depth += 1,
                b'}' | b']' => depth -= 1,
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lexer(text: &str) -> Lexer {
        Lexer::new(Source::from_string(text))
    }

    #[test]
    fn reads_nested_values() {
        let mut lx = lexer(r#" {"a": [1, -2.5, true, null], "b": {"c": "d"}, "e": []} "#);
        let value = lx.read_value().unwrap();
        assert_eq!(
            value,
            json!({ "a": [1, -2.5, true, null], "b": { "c": "d" }, "e": [] })
        );
    }

    #[test]
    fn preserves_member_order() {
        let mut lx = lexer(r#"{"z": 1, "a": 2, "m": 3}"#);
        let value = lx.read_value().unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["z", "a", "m"]);
    }

    #[test]
    fn decodes_escapes() {
        let mut lx = lexer(r#""a\"b\\c\/\né😀""#);
        assert_eq!(lx.read_value().unwrap(), json!("a\"b\\c/\né😀"));
    }

    #[test]
    fn passes_raw_utf8_through() {
        let mut lx = lexer("\"héllo ✓\"");
        assert_eq!(lx.read_value().unwrap(), json!("héllo ✓"));
    }

    #[test]
    fn rejects_unpaired_surrogate() {
        let mut lx = lexer(r#""\ud83d""#);
        assert!(matches!(lx.read_value(), Err(StreamError::Syntax { .. })));
    }

    #[test]
    fn rejects_bad_literals_and_numbers() {
        assert!(matches!(lexer("tru").read_value(), Err(StreamError::Syntax { .. })));
        assert!(matches!(lexer("01").read_value(), Err(StreamError::Syntax { .. })));
        assert!(matches!(lexer("1.").read_value(), Err(StreamError::Syntax { .. })));
    }

    #[test]
    fn reports_offset_of_syntax_errors() {
        let mut lx = lexer(r#"{"a" 1}"#);
        match lx.read_value() {
            Err(StreamError::Syntax { offset, .. }) => assert_eq!(offset, 6),
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn skips_values_with_tricky_strings() {
        let mut lx = lexer(r#"{"a": "}]\"", "b": [[{}]]} 7"#);
        lx.skip_value().unwrap();
        assert_eq!(lx.read_value().unwrap(), json!(7));
    }

    #[test]
    fn truncated_input_is_a_syntax_error() {
        let mut lx = lexer(r#"{"a": [1, 2"#);
        assert!(matches!(lx.read_value(), Err(StreamError::Syntax { .. })));
        let mut lx = lexer(r#"[{"a": "#);
        assert!(matches!(lx.skip_value(), Err(StreamError::Syntax { .. })));
    }

    #[test]
    fn deep_nesting_is_a_syntax_error() {
        let text = "[".repeat(200_000);
        match lexer(&text).read_value() {
            Err(StreamError::Syntax { message, .. }) => assert_eq!(message, "nesting too deep"),
            other => panic!("expected syntax error, got {:?}", other),
        }

        let text = format!("{}{}", "[".repeat(MAX_DEPTH), "]".repeat(MAX_DEPTH));
        assert!(lexer(&text).read_value().is_ok());
        let text = format!("{}{}", r#"{"a":"#.repeat(MAX_DEPTH + 1), "}".repeat(MAX_DEPTH + 1));
        assert!(matches!(lexer(&text).read_value(), Err(StreamError::Syntax { .. })));
    }

    #[test]
    fn counts_bytes_read() {
        let mut lx = lexer("[1, 2, 3]");
        lx.read_value().unwrap();
        assert_eq!(lx.bytes_read(), 9);
    }
}
