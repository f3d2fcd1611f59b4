//! Immutable `(source, position)` pair threaded through the parser
//!
//! Every method returns a new cursor instead of moving this one, so nested
//! parse routines can never observe each other's position.

use crate::error::{ParseError, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor<'src> {
    source: &'src str,
    pos: usize,
}

impl<'src> Cursor<'src> {
    pub fn new(source: &'src str) -> Self {
        Self { source, pos: 0 }
    }

    pub fn source(&self) -> &'src str {
        self.source
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Unconsumed input
    pub fn rest(&self) -> &'src str {
        &self.source[self.pos..]
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.source.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Character after the next one
    pub fn peek_second(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    pub fn starts_with(&self, pattern: &str) -> bool {
        self.rest().starts_with(pattern)
    }

    pub fn starts_with_ignore_case(&self, pattern: &str) -> bool {
        self.rest()
            .get(..pattern.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(pattern))
    }

    /// Move forward `bytes` bytes (clamped to the end of input)
    pub fn advance(self, bytes: usize) -> Self {
        Self {
            pos: (self.pos + bytes).min(self.source.len()),
            ..self
        }
    }

    /// Jump to an absolute offset
    pub fn at(self, pos: usize) -> Self {
        Self {
            pos: pos.min(self.source.len()),
            ..self
        }
    }

    pub fn skip_whitespace(self) -> Self {
        let (_, next) = self.take_while(char::is_whitespace);
        next
    }

    /// Consume characters while `pred` holds
    pub fn take_while(self, pred: impl Fn(char) -> bool) -> (&'src str, Self) {
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|&(_, c)| !pred(c))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        (&rest[..len], self.advance(len))
    }

    /// Consume everything before `pattern`, leaving the cursor on it
    pub fn take_until(self, pattern: &str) -> Option<(&'src str, Self)> {
        let rest = self.rest();
        rest.find(pattern)
            .map(|len| (&rest[..len], self.advance(len)))
    }

    /// Like [`Cursor::take_until`], matching `pattern` ASCII case-insensitively
    pub fn take_until_ignore_case(self, pattern: &str) -> Option<(&'src str, Self)> {
        let rest = self.rest();
        let needle = pattern.to_ascii_lowercase();
        rest.to_ascii_lowercase()
            .find(&needle)
            .map(|len| (&rest[..len], self.advance(len)))
    }

    /// Consume `pattern` or fail with `message`
    pub fn expect(self, pattern: &str, message: &str) -> Result<Self, ParseError> {
        if self.starts_with(pattern) {
            Ok(self.advance(pattern.len()))
        } else {
            Err(self.error(self.pos..self.pos + self.next_len(), message))
        }
    }

    /// Byte length of the next character (0 at end of input)
    pub fn next_len(&self) -> usize {
        self.peek().map(char::len_utf8).unwrap_or(0)
    }

    /// Span from this cursor's position to `end`'s
    pub fn span_to(&self, end: Cursor<'src>) -> Span {
        self.pos..end.pos
    }

    pub fn error(&self, span: Span, message: impl Into<String>) -> ParseError {
        ParseError::syntax(self.source, span, message)
    }
}
