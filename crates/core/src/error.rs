//! Centralized error types for the Davis workspace.

use thiserror::Error;

/// Precondition element reported when a PROPFIND asks for `Depth: infinity`.
pub const PROPFIND_FINITE_DEPTH: &str = "propfind-finite-depth";

/// Top-level error enum. Variants map to protocol outcomes.
///
/// Lock conflicts are deliberately absent: they are reported through
/// [`LockResult::Conflict`](crate::types::LockResult::Conflict).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DavError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No active lock for token {0}")]
    LockNotFound(String),

    #[error("Format error: {0}")]
    Format(String),

    #[error("PROPFIND with Depth: infinity is not supported")]
    UnsupportedDepth,

    #[error("Unsupported PROPFIND request: {0}")]
    UnsupportedQueryShape(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Property {0} is read-only")]
    ReadOnlyProperty(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DavError {
    /// Protocol status code the transport should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            DavError::NotFound(_) => 404,
            DavError::LockNotFound(_) => 409,
            DavError::Format(_) | DavError::InvalidInput(_) => 400,
            DavError::UnsupportedDepth
            | DavError::UnsupportedQueryShape(_)
            | DavError::ReadOnlyProperty(_) => 403,
            DavError::Storage(_) | DavError::Internal(_) => 500,
        }
    }

    /// Structured precondition name carried in the error body, if any.
    ///
    /// Only [`DavError::UnsupportedDepth`] has one; the other forbidden
    /// outcomes are intentionally generic.
    pub fn condition(&self) -> Option<&'static str> {
        match self {
            DavError::UnsupportedDepth => Some(PROPFIND_FINITE_DEPTH),
            _ => None,
        }
    }

    /// Renders the `DAV:error` body for outcomes that have a condition.
    pub fn error_body(&self) -> Option<String> {
        self.condition().map(|condition| {
            format!(
                "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<D:error xmlns:D=\"DAV:\"><D:{condition}/></D:error>\n"
            )
        })
    }

    /// `true` for errors a best-effort caller may ignore.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DavError::NotFound(_) | DavError::LockNotFound(_))
    }
}

pub type DavResult<T> = Result<T, DavError>;
