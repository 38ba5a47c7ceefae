use crate::core::{LineIndex, ParseError, TextSpan};

use super::document::{JsonString, Member, Node, NodeValue};

const MAX_DEPTH: usize = 128;

/// Strict JSON parser that records the span of every value.
pub(crate) struct JsonParser<'t> {
    text: &'t str,
    bytes: &'t [u8],
    pos: usize,
}

impl<'t> JsonParser<'t> {
    pub(crate) fn new(text: &'t str) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    pub(crate) fn parse(mut self) -> Result<Node, ParseError> {
        if self.text.starts_with('\u{feff}') {
            self.pos = 3;
        }
        self.skip_whitespace();
        let root = self.parse_value(0)?;
        self.skip_whitespace();
        if self.pos < self.bytes.len() {
            return Err(self.error("unexpected trailing content"));
        }
        Ok(root)
    }

    fn error(&self, reason: impl Into<String>) -> ParseError {
        self.error_at(self.pos, reason)
    }

    fn error_at(&self, offset: usize, reason: impl Into<String>) -> ParseError {
        let (line, column) = LineIndex::new(self.text).position(self.text, offset);
        ParseError::new(line, column, reason)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn expect_byte(&mut self, byte: u8) -> Result<(), ParseError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", byte as char)))
        }
    }

    fn parse_value(&mut self, depth: usize) -> Result<Node, ParseError> {
        if depth > MAX_DEPTH {
            return Err(self.error("document nesting too deep"));
        }
        let start = self.pos;
        let value = match self.peek() {
            Some(b'{') => self.parse_object(depth)?,
            Some(b'[') => self.parse_array(depth)?,
            Some(b'"') => NodeValue::String(self.parse_string()?),
            Some(b't') => self.parse_literal("true", NodeValue::Bool(true))?,
            Some(b'f') => self.parse_literal("false", NodeValue::Bool(false))?,
            Some(b'n') => self.parse_literal("null", NodeValue::Null)?,
            Some(b'-' | b'0'..=b'9') => self.parse_number()?,
            Some(_) => return Err(self.error("unexpected character")),
            None => return Err(self.error("unexpected end of document")),
        };
        Ok(Node {
            value,
            span: TextSpan::new(start, self.pos),
        })
    }

    fn parse_object(&mut self, depth: usize) -> Result<NodeValue, ParseError> {
        self.expect_byte(b'{')?;
        let mut members = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(NodeValue::Object(members));
        }
        loop {
            self.skip_whitespace();
            if self.peek() != Some(b'"') {
                return Err(self.error("expected object key"));
            }
            let key = self.parse_string()?;
            self.skip_whitespace();
            self.expect_byte(b':')?;
            self.skip_whitespace();
            let value = self.parse_value(depth + 1)?;
            members.push(Member { key, value });
            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(NodeValue::Object(members));
                }
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn parse_array(&mut self, depth: usize) -> Result<NodeValue, ParseError> {
        self.expect_byte(b'[')?;
        let mut items = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(NodeValue::Array(items));
        }
        loop {
            self.skip_whitespace();
            items.push(self.parse_value(depth + 1)?);
            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    return Ok(NodeValue::Array(items));
                }
                _ => return Err(self.error("expected ',' or ']'")),
            }
        }
    }

    fn parse_string(&mut self) -> Result<JsonString, ParseError> {
        self.expect_byte(b'"')?;
        let content_start = self.pos;
        loop {
            match self.peek() {
                Some(b'"') => break,
                Some(b'\\') => self.pos += 2,
                Some(b) if b < 0x20 => return Err(self.error("control character in string")),
                Some(_) => self.pos += 1,
                None => return Err(self.error_at(content_start - 1, "unterminated string")),
            }
        }
        let span = TextSpan::new(content_start, self.pos);
        self.pos += 1;
        let (value, _) = decode_json_string(span.slice(self.text))
            .map_err(|(offset, reason)| self.error_at(content_start + offset, reason))?;
        Ok(JsonString { value, span })
    }

    fn parse_literal(&mut self, literal: &str, value: NodeValue) -> Result<NodeValue, ParseError> {
        if self.text[self.pos..].starts_with(literal) {
            self.pos += literal.len();
            Ok(value)
        } else {
            Err(self.error("invalid literal"))
        }
    }

    fn parse_number(&mut self) -> Result<NodeValue, ParseError> {
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        match self.peek() {
            Some(b'0') => self.pos += 1,
            Some(b'1'..=b'9') => self.skip_digits(),
            _ => return Err(self.error("invalid number")),
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            if !matches!(self.peek(), Some(b'0'..=b'9')) {
                return Err(self.error("invalid number"));
            }
            self.skip_digits();
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if !matches!(self.peek(), Some(b'0'..=b'9')) {
                return Err(self.error("invalid number"));
            }
            self.skip_digits();
        }
        Ok(NodeValue::Number)
    }

    fn skip_digits(&mut self) {
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
    }
}

/// Decode the raw content of a JSON string literal.
///
/// Also returns, for every byte of the decoded text, the offset in `raw` of the
/// character or escape sequence it came from, plus a final entry for `raw.len()`.
pub(crate) fn decode_json_string(raw: &str) -> Result<(String, Vec<usize>), (usize, &'static str)> {
    let mut value = String::with_capacity(raw.len());
    let mut offsets = Vec::with_capacity(raw.len() + 1);
    let mut chars = raw.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        let decoded = if c == '\\' {
            let Some((_, escape)) = chars.next() else {
                return Err((idx, "unterminated escape"));
            };
            match escape {
                '"' => '"',
                '\\' => '\\',
                '/' => '/',
                'b' => '\u{8}',
                'f' => '\u{c}',
                'n' => '\n',
                'r' => '\r',
                't' => '\t',
                'u' => {
                    let high = read_hex4(raw, idx + 2).ok_or((idx, "invalid unicode escape"))?;
                    skip_chars(&mut chars, 4);
                    if (0xD800..0xDC00).contains(&high) {
                        let low_start = idx + 6;
                        if !raw.get(low_start..).is_some_and(|rest| rest.starts_with("\\u")) {
                            return Err((idx, "unpaired surrogate"));
                        }
                        let low = read_hex4(raw, low_start + 2).ok_or((idx, "invalid unicode escape"))?;
                        if !(0xDC00..0xE000).contains(&low) {
                            return Err((idx, "unpaired surrogate"));
                        }
                        skip_chars(&mut chars, 6);
                        let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                        char::from_u32(code).ok_or((idx, "invalid unicode escape"))?
                    } else {
                        char::from_u32(high).ok_or((idx, "unpaired surrogate"))?
                    }
                }
                _ => return Err((idx, "invalid escape")),
            }
        } else {
            c
        };
        for _ in 0..decoded.len_utf8() {
            offsets.push(idx);
        }
        value.push(decoded);
    }
    offsets.push(raw.len());
    Ok((value, offsets))
}

fn read_hex4(raw: &str, start: usize) -> Option<u32> {
    let digits = raw.get(start..start + 4)?;
    u32::from_str_radix(digits, 16).ok()
}

fn skip_chars(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>, count: usize) {
    for _ in 0..count {
        chars.next();
    }
}
