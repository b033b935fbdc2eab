//! Resource store, property, and host contracts consumed by the Davis engine.

pub mod memory;
pub mod property;

use async_trait::async_trait;
use davis_core::error::{DavError, DavResult};
use davis_core::ResourcePath;
use std::fmt;
use std::sync::Arc;

pub use memory::{MemoryStore, MemoryStoreBuilder, TreeSpec};
pub use property::{Property, ReadableProperty, WritableProperty};

/// A node in the store: document or collection.
pub trait Entry: Send + Sync {
    fn path(&self) -> &ResourcePath;

    /// Properties in declaration order.
    fn properties(&self) -> &[Arc<dyn Property>];
}

pub trait Document: Entry {}

#[async_trait]
pub trait Collection: Entry {
    /// Immediate children. Order is store-defined.
    async fn get_children(&self) -> DavResult<Vec<EntryRef>>;
}

/// Shared handle to either kind of entry.
#[derive(Clone)]
pub enum EntryRef {
    Document(Arc<dyn Document>),
    Collection(Arc<dyn Collection>),
}

impl EntryRef {
    pub fn path(&self) -> &ResourcePath {
        match self {
            EntryRef::Document(d) => d.path(),
            EntryRef::Collection(c) => c.path(),
        }
    }

    pub fn properties(&self) -> &[Arc<dyn Property>] {
        match self {
            EntryRef::Document(d) => d.properties(),
            EntryRef::Collection(c) => c.properties(),
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, EntryRef::Collection(_))
    }

    pub fn as_collection(&self) -> Option<&Arc<dyn Collection>> {
        match self {
            EntryRef::Collection(c) => Some(c),
            EntryRef::Document(_) => None,
        }
    }
}

impl fmt::Debug for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_collection() { "Collection" } else { "Document" };
        f.debug_tuple(kind).field(&self.path().as_str()).finish()
    }
}

/// Outcome of resolving a path.
#[derive(Clone)]
pub enum SelectionResult {
    Missing(ResourcePath),
    FoundDocument(Arc<dyn Document>),
    FoundCollection(Arc<dyn Collection>),
}

impl SelectionResult {
    pub fn is_missing(&self) -> bool {
        matches!(self, SelectionResult::Missing(_))
    }

    pub fn into_entry(self) -> Option<EntryRef> {
        match self {
            SelectionResult::Missing(_) => None,
            SelectionResult::FoundDocument(d) => Some(EntryRef::Document(d)),
            SelectionResult::FoundCollection(c) => Some(EntryRef::Collection(c)),
        }
    }

    /// The found entry, or `NotFound`.
    pub fn require(self) -> DavResult<EntryRef> {
        match self {
            SelectionResult::Missing(path) => Err(DavError::NotFound(path.to_string())),
            SelectionResult::FoundDocument(d) => Ok(EntryRef::Document(d)),
            SelectionResult::FoundCollection(c) => Ok(EntryRef::Collection(c)),
        }
    }
}

/// Hierarchical resource lookup.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn select(&self, path: &ResourcePath) -> DavResult<SelectionResult>;
}

/// Server identity used when building responses.
pub trait Host: Send + Sync {
    /// Base location entry paths are resolved against. Ends with `/`.
    fn base_url(&self) -> &url::Url;

    /// Protocol label for status lines, e.g. `HTTP/1.1`.
    fn protocol(&self) -> &str;
}

/// Fixed host configuration.
#[derive(Debug, Clone)]
pub struct StaticHost {
    base_url: url::Url,
    protocol: String,
}

impl StaticHost {
    pub const DEFAULT_PROTOCOL: &'static str = "HTTP/1.1";

    pub fn new(mut base_url: url::Url) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            base_url,
            protocol: Self::DEFAULT_PROTOCOL.to_string(),
        }
    }

    pub fn parse(base_url: &str) -> DavResult<Self> {
        let url = url::Url::parse(base_url)
            .map_err(|e| DavError::InvalidInput(format!("invalid base URL {base_url:?}: {e}")))?;
        if url.cannot_be_a_base() {
            return Err(DavError::InvalidInput(format!(
                "{base_url:?} cannot be used as a base URL"
            )));
        }
        Ok(Self::new(url))
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }
}

impl Host for StaticHost {
    fn base_url(&self) -> &url::Url {
        &self.base_url
    }

    fn protocol(&self) -> &str {
        &self.protocol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_host_normalizes_base() {
        let host = StaticHost::parse("http://localhost:8080/dav").unwrap();
        assert_eq!(host.base_url().as_str(), "http://localhost:8080/dav/");
        assert_eq!(host.protocol(), "HTTP/1.1");

        let host = host.with_protocol("HTTP/2");
        assert_eq!(host.protocol(), "HTTP/2");
    }

    #[test]
    fn static_host_rejects_non_base_urls() {
        assert!(StaticHost::parse("mailto:someone@example.com").is_err());
        assert!(StaticHost::parse("not a url").is_err());
    }
}
