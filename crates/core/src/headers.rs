//! Request header grammar: `Depth`, `Timeout`, and the state tokens of `If`.
//!
//! Only the subset the lock and property engines consume is parsed here;
//! the full conditional-request evaluation lives with the transport.

use crate::coded_url::{self, CodedUrl, Cursor};
use crate::error::{DavError, DavResult};
use crate::types::{LockDepth, LockTimeout};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value of the `Depth` request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

impl Depth {
    /// Finite traversal limit, `None` for `infinity`.
    pub fn limit(self) -> Option<u32> {
        match self {
            Depth::Zero => Some(0),
            Depth::One => Some(1),
            Depth::Infinity => None,
        }
    }

    /// Lock depth for a `LOCK` request; `1` is not a valid lock depth.
    pub fn to_lock_depth(self) -> DavResult<LockDepth> {
        match self {
            Depth::Zero => Ok(LockDepth::Zero),
            Depth::Infinity => Ok(LockDepth::Infinity),
            Depth::One => Err(DavError::InvalidInput(
                "Depth: 1 is not valid for LOCK".into(),
            )),
        }
    }
}

impl std::str::FromStr for Depth {
    type Err = DavError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0" => Ok(Depth::Zero),
            "1" => Ok(Depth::One),
            v if v.eq_ignore_ascii_case("infinity") => Ok(Depth::Infinity),
            v => Err(DavError::Format(format!("invalid Depth header {v:?}"))),
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "infinity",
        })
    }
}

/// Parses a `Timeout` header preference list such as `Infinite, Second-4100000000`.
///
/// The first understood entry wins; unknown entries are skipped. `None` if
/// nothing in the list is understood.
pub fn parse_timeout(header: &str) -> Option<LockTimeout> {
    header.split(',').map(str::trim).find_map(|entry| {
        if entry.eq_ignore_ascii_case("infinite") {
            return Some(LockTimeout::Infinite);
        }
        let secs = entry
            .get(..7)
            .filter(|prefix| prefix.eq_ignore_ascii_case("second-"))
            .and_then(|_| entry[7..].parse::<u64>().ok())?;
        Some(LockTimeout::Seconds(secs))
    })
}

/// Formats a granted timeout the way `Timeout` responses expect.
pub fn format_timeout(secs: u64) -> String {
    format!("Second-{secs}")
}

/// Collects the state tokens a client submitted in an `If` header.
///
/// Resource tags and entity tags are skipped, and so are tokens under
/// `Not`, since those do not claim ownership of a lock.
pub fn if_state_tokens(header: &str) -> DavResult<Vec<CodedUrl>> {
    let mut cursor = Cursor::new(header);
    let mut tokens = Vec::new();

    loop {
        cursor.skip_whitespace();
        match cursor.peek() {
            None => break,
            Some('<') => {
                // Resource tag of a tagged list.
                coded_url::try_parse_from(&mut cursor)?;
            }
            Some('(') => {
                cursor.bump();
                parse_list(&mut cursor, &mut tokens)?;
            }
            Some(other) => {
                return Err(DavError::Format(format!(
                    "unexpected {other:?} in If header"
                )));
            }
        }
    }

    Ok(tokens)
}

fn parse_list(cursor: &mut Cursor<'_>, tokens: &mut Vec<CodedUrl>) -> DavResult<()> {
    let mut conditions = 0usize;
    loop {
        cursor.skip_whitespace();
        if cursor.advance_if(")") {
            if conditions == 0 {
                return Err(DavError::Format("empty condition list in If header".into()));
            }
            return Ok(());
        }
        if cursor.is_empty() {
            return Err(DavError::Format("unterminated condition list in If header".into()));
        }

        let negated = cursor.advance_if_ignore_case("not");
        cursor.skip_whitespace();

        if cursor.advance_if("[") {
            cursor
                .take_until(']')
                .ok_or_else(|| DavError::Format("unterminated entity tag in If header".into()))?;
            cursor.advance(1);
        } else {
            let token = coded_url::try_parse_from(cursor)?.ok_or_else(|| {
                DavError::Format(format!(
                    "expected state token or entity tag at {:?}",
                    cursor.remaining()
                ))
            })?;
            if !negated {
                tokens.push(token);
            }
        }
        conditions += 1;
    }
}
