//! Domain types for the Davis locking and property core.

use crate::coded_url::CodedUrl;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Namespace of every property defined by the protocol itself.
pub const DAV_NAMESPACE: &str = "DAV:";

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// A normalized, slash-delimited resource path.
///
/// Always starts with `/`, never contains empty or `.` segments, and has no
/// trailing slash unless it is the root. `..` pops a segment and never
/// escapes the root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ResourcePath(String);

impl ResourcePath {
    pub fn root() -> Self {
        Self("/".to_string())
    }

    pub fn new(raw: &str) -> Self {
        let mut segments: SmallVec<[&str; 8]> = SmallVec::new();
        for segment in raw.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                s => segments.push(s),
            }
        }

        if segments.is_empty() {
            return Self::root();
        }

        let mut path = String::with_capacity(raw.len() + 1);
        for segment in &segments {
            path.push('/');
            path.push_str(segment);
        }
        Self(path)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Last segment, empty for the root.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    pub fn parent(&self) -> Option<ResourcePath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) | None => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
        }
    }

    pub fn join(&self, segment: &str) -> ResourcePath {
        Self::new(&format!("{}/{}", self.0, segment))
    }

    /// Strict ancestors, nearest first, ending with the root.
    ///
    /// `SmallVec<[_; 8]>` keeps typical hierarchies off the heap.
    pub fn ancestors(&self) -> SmallVec<[ResourcePath; 8]> {
        let mut out = SmallVec::new();
        let mut current = self.parent();
        while let Some(path) = current {
            current = path.parent();
            out.push(path);
        }
        out
    }

    /// `true` if `other` lies strictly below `self`.
    pub fn is_ancestor_of(&self, other: &ResourcePath) -> bool {
        if self == other {
            return false;
        }
        other.0.starts_with(&self.descendant_prefix())
    }

    /// Prefix shared by every descendant path: `/docs/` for `/docs`, `/` for the root.
    pub fn descendant_prefix(&self) -> String {
        if self.is_root() {
            self.0.clone()
        } else {
            format!("{}/", self.0)
        }
    }

    /// Path relative to the root, without the leading slash.
    pub fn relative(&self) -> &str {
        &self.0[1..]
    }
}

impl From<String> for ResourcePath {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<&str> for ResourcePath {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl std::borrow::Borrow<str> for ResourcePath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<ResourcePath> for String {
    fn from(path: ResourcePath) -> Self {
        path.0
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Locks
// ---------------------------------------------------------------------------

/// `Exclusive` (single writer) or `Shared` (cooperating writers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockScope {
    Exclusive,
    Shared,
}

impl LockScope {
    /// Only shared/shared may coexist.
    #[inline]
    pub fn is_compatible_with(self, other: LockScope) -> bool {
        matches!((self, other), (LockScope::Shared, LockScope::Shared))
    }
}

impl std::str::FromStr for LockScope {
    type Err = crate::DavError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exclusive" => Ok(LockScope::Exclusive),
            "shared" => Ok(LockScope::Shared),
            other => Err(crate::DavError::InvalidInput(format!(
                "unknown lock scope {other:?}"
            ))),
        }
    }
}

/// Lock recursion. A lock cannot be taken at depth `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockDepth {
    Zero,
    Infinity,
}

/// Requested lock lifetime as carried by the `Timeout` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockTimeout {
    Infinite,
    Seconds(u64),
}

/// Parameters of one grant attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRequest {
    pub path: ResourcePath,
    pub scope: LockScope,
    pub depth: LockDepth,
    pub owner: Option<String>,
    /// `None` selects the manager's default timeout.
    pub timeout: Option<LockTimeout>,
}

impl LockRequest {
    pub fn new(path: impl Into<ResourcePath>, scope: LockScope, depth: LockDepth) -> Self {
        Self {
            path: path.into(),
            scope,
            depth,
            owner: None,
            timeout: None,
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_timeout(mut self, timeout: LockTimeout) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A granted lock.
///
/// `state_token` is minted once and never reused; only `expires_at`
/// changes over the lock's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveLock {
    pub path: ResourcePath,
    pub scope: LockScope,
    pub depth: LockDepth,
    pub state_token: CodedUrl,
    /// Opaque client-supplied owner descriptor.
    pub owner: Option<String>,
    /// Effective timeout in seconds after clamping.
    pub timeout_secs: u64,
    pub issued: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ActiveLock {
    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// `true` if this lock applies to `path`.
    pub fn covers(&self, path: &ResourcePath) -> bool {
        self.path == *path
            || (self.depth == LockDepth::Infinity && self.path.is_ancestor_of(path))
    }

    /// `true` if a lock on `path` at `depth` would share any resource with this one.
    pub fn overlaps(&self, path: &ResourcePath, depth: LockDepth) -> bool {
        self.covers(path) || (depth == LockDepth::Infinity && path.is_ancestor_of(&self.path))
    }
}

/// Outcome of one grant attempt. Never both a lock and conflicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "locks")]
pub enum LockResult {
    Granted(ActiveLock),
    /// Every existing lock that blocked the grant. Never empty.
    Conflict(Vec<ActiveLock>),
}

impl LockResult {
    pub fn is_granted(&self) -> bool {
        matches!(self, LockResult::Granted(_))
    }

    pub fn lock(&self) -> Option<&ActiveLock> {
        match self {
            LockResult::Granted(lock) => Some(lock),
            LockResult::Conflict(_) => None,
        }
    }

    pub fn conflicts(&self) -> &[ActiveLock] {
        match self {
            LockResult::Granted(_) => &[],
            LockResult::Conflict(locks) => locks,
        }
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

/// Namespace-qualified property name, displayed in Clark notation `{ns}local`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PropertyName {
    pub namespace: String,
    pub local: String,
}

impl PropertyName {
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local: local.into(),
        }
    }

    pub fn dav(local: impl Into<String>) -> Self {
        Self::new(DAV_NAMESPACE, local)
    }
}

impl fmt::Display for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.local)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local)
        }
    }
}

impl std::str::FromStr for PropertyName {
    type Err = crate::DavError;

    /// Accepts Clark notation; a bare local name lands in the `DAV:` namespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || crate::DavError::InvalidInput(format!("invalid property name {s:?}"));
        match s.strip_prefix('{') {
            Some(rest) => {
                let (namespace, local) = rest.split_once('}').ok_or_else(invalid)?;
                if local.is_empty() {
                    return Err(invalid());
                }
                Ok(Self::new(namespace, local))
            }
            None if s.is_empty() || s.contains('}') => Err(invalid()),
            None => Ok(Self::dav(s)),
        }
    }
}

/// Wire-serialized property value: one element with optional text and children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireElement {
    pub name: PropertyName,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<WireElement>,
}

impl WireElement {
    pub fn empty(name: PropertyName) -> Self {
        Self {
            name,
            text: None,
            children: Vec::new(),
        }
    }

    pub fn text(name: PropertyName, text: impl Into<String>) -> Self {
        Self {
            name,
            text: Some(text.into()),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: WireElement) -> Self {
        self.children.push(child);
        self
    }
}
