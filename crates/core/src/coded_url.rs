//! Coded-URL literal: `<` URI-or-relative-reference `>`.
//!
//! Used for lock state tokens in `Lock-Token` responses, `If` header lists,
//! and `Lock-Token` request headers. The cursor-based [`try_parse_from`]
//! lets a larger header grammar consume one literal without re-scanning.

use crate::error::{DavError, DavResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The reference inside a Coded-URL, stored without its angle brackets.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodedUrl(String);

impl CodedUrl {
    /// Wraps a reference after checking it can round-trip through the literal syntax.
    pub fn new(reference: impl Into<String>) -> DavResult<Self> {
        let reference = reference.into();
        if reference.is_empty() {
            return Err(DavError::Format("empty Coded-URL".into()));
        }
        if let Some(bad) = reference
            .chars()
            .find(|c| c.is_whitespace() || matches!(c, '<' | '>'))
        {
            return Err(DavError::Format(format!(
                "{reference:?} is not a valid Coded-URL (contains {bad:?})"
            )));
        }
        Ok(Self(reference))
    }

    /// Mints a fresh, process-wide unique lock state token (`urn:uuid:...`).
    pub fn new_state_token() -> Self {
        Self(uuid::Uuid::new_v4().urn().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The reference as an absolute URL, if it is one.
    pub fn to_url(&self) -> Option<url::Url> {
        url::Url::parse(&self.0).ok()
    }
}

impl fmt::Display for CodedUrl {
    /// Formats the full literal, brackets included.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

impl std::str::FromStr for CodedUrl {
    type Err = DavError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

/// Forward-only position over a header value.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source, pos: 0 }
    }

    pub fn remaining(&self) -> &'a str {
        &self.source[self.pos..]
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.source.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    /// Consumes `prefix` if the remaining input starts with it.
    pub fn advance_if(&mut self, prefix: &str) -> bool {
        if self.remaining().starts_with(prefix) {
            self.pos += prefix.len();
            true
        } else {
            false
        }
    }

    /// Consumes `prefix` ignoring ASCII case.
    pub fn advance_if_ignore_case(&mut self, prefix: &str) -> bool {
        let rest = self.remaining();
        if rest.len() >= prefix.len()
            && rest.is_char_boundary(prefix.len())
            && rest[..prefix.len()].eq_ignore_ascii_case(prefix)
        {
            self.pos += prefix.len();
            true
        } else {
            false
        }
    }

    pub fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.source.len());
    }

    /// Consumes one character.
    pub fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    pub fn skip_whitespace(&mut self) {
        let rest = self.remaining();
        self.pos += rest.len() - rest.trim_start().len();
    }

    /// Returns everything before `delimiter` and leaves the cursor on it.
    /// `None` (cursor untouched) if the delimiter never appears.
    pub fn take_until(&mut self, delimiter: char) -> Option<&'a str> {
        let rest = self.remaining();
        let idx = rest.find(delimiter)?;
        self.pos += idx;
        Some(&rest[..idx])
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parses exactly one Coded-URL with no trailing content.
pub fn parse(source: &str) -> DavResult<CodedUrl> {
    let mut cursor = Cursor::new(source);
    let token = try_parse_from(&mut cursor)?
        .ok_or_else(|| DavError::Format("No Coded-URL found".into()))?;
    if !cursor.is_empty() {
        return Err(DavError::Format(format!(
            "Unknown content after Coded-URL: {:?}",
            cursor.remaining()
        )));
    }
    Ok(token)
}

/// Like [`parse`] but reports every malformation as `None`.
pub fn try_parse(source: &str) -> Option<CodedUrl> {
    parse(source).ok()
}

/// Consumes one Coded-URL at the cursor and leaves it after the closing `>`.
///
/// `Ok(None)` means no literal starts here (no leading `<`); the cursor is
/// not moved. An opening `<` without a closing `>` is an error.
pub fn try_parse_from(cursor: &mut Cursor<'_>) -> DavResult<Option<CodedUrl>> {
    let start = cursor.clone();
    if !cursor.advance_if("<") {
        return Ok(None);
    }

    let Some(reference) = cursor.take_until('>') else {
        let remaining = start.remaining();
        *cursor = start;
        return Err(DavError::Format(format!(
            "{remaining:?} is not a valid Coded-URL (not ending with '>')"
        )));
    };

    let token = CodedUrl::new(reference).inspect_err(|_| *cursor = start.clone())?;
    cursor.advance(1);
    Ok(Some(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_format() {
        let token = parse("<urn:uuid:181d4fae-7d8c-11d0-a765-00a0c91e6bf2>").unwrap();
        assert_eq!(token.as_str(), "urn:uuid:181d4fae-7d8c-11d0-a765-00a0c91e6bf2");
        assert_eq!(
            token.to_string(),
            "<urn:uuid:181d4fae-7d8c-11d0-a765-00a0c91e6bf2>"
        );
        assert_eq!(parse(&token.to_string()).unwrap(), token);
    }

    #[test]
    fn relative_references_are_accepted() {
        let token = parse("<docs/a>").unwrap();
        assert_eq!(token.as_str(), "docs/a");
        assert!(token.to_url().is_none());

        let absolute = parse("<http://example.com/docs/a>").unwrap();
        assert_eq!(absolute.to_url().unwrap().path(), "/docs/a");
    }

    #[test]
    fn unterminated_literal_is_a_format_error() {
        assert!(matches!(parse("<abc"), Err(DavError::Format(_))));
    }

    #[test]
    fn trailing_content_is_a_format_error() {
        assert!(matches!(parse("<abc> extra"), Err(DavError::Format(_))));
    }

    #[test]
    fn missing_literal_is_a_format_error() {
        assert!(matches!(parse("abc"), Err(DavError::Format(_))));
        assert!(matches!(parse(""), Err(DavError::Format(_))));
    }

    #[test]
    fn try_parse_never_fails() {
        assert!(try_parse("not-a-token").is_none());
        assert!(try_parse("<abc").is_none());
        assert!(try_parse("<abc> extra").is_none());
        assert!(try_parse("<>").is_none());
        assert_eq!(try_parse("<abc>").unwrap().as_str(), "abc");
    }

    #[test]
    fn cursor_variant_stops_after_closing_bracket() {
        let mut cursor = Cursor::new("<urn:a> (<urn:b>)");
        let first = try_parse_from(&mut cursor).unwrap().unwrap();
        assert_eq!(first.as_str(), "urn:a");
        assert_eq!(cursor.remaining(), " (<urn:b>)");

        // No literal at the cursor: reported as absence, cursor untouched.
        assert!(try_parse_from(&mut cursor).unwrap().is_none());
        assert_eq!(cursor.remaining(), " (<urn:b>)");
    }

    #[test]
    fn cursor_variant_distinguishes_absence_from_malformation() {
        let mut cursor = Cursor::new("<urn:a");
        assert!(try_parse_from(&mut cursor).is_err());
        assert_eq!(cursor.remaining(), "<urn:a");
    }
}
