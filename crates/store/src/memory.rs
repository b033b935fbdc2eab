//! In-memory reference store.
//!
//! Backs the CLI and the engine tests. Every document and collection carries
//! the standard live properties; documents also expose an expensive
//! content checksum that only appears when requested by name.

use crate::property::{
    Computed, ConvertingProperty, DateTimeConverter, DeadProperty, Property, ReadableProperty,
    StringConverter, U64Converter, CHEAP,
};
use crate::{Collection, Document, Entry, EntryRef, ResourceStore, SelectionResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use davis_core::error::{DavError, DavResult};
use davis_core::{PropertyName, ResourcePath, WireElement};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Weak};

/// Namespace for Davis-specific live properties.
pub const DAVIS_NAMESPACE: &str = "urn:davis:props";

/// Retrieval cost of the content checksum.
pub const CHECKSUM_COST: u32 = 5;

type Tree = tokio::sync::RwLock<BTreeMap<ResourcePath, EntryRef>>;

/// Shared, lock-protected tree of entries.
pub struct MemoryStore {
    tree: Arc<Tree>,
}

impl MemoryStore {
    pub fn builder() -> MemoryStoreBuilder {
        MemoryStoreBuilder::default()
    }

    pub fn from_spec(spec: TreeSpec) -> DavResult<Self> {
        spec.into_builder()?.build()
    }

    pub async fn len(&self) -> usize {
        self.tree.read().await.len()
    }

    /// Removes `path` and everything below it; returns the removed paths.
    pub async fn remove(&self, path: &ResourcePath) -> DavResult<Vec<ResourcePath>> {
        if path.is_root() {
            return Err(DavError::InvalidInput("cannot remove the root collection".into()));
        }

        let mut tree = self.tree.write().await;
        if tree.remove(path).is_none() {
            return Err(DavError::NotFound(path.to_string()));
        }

        let mut removed = vec![path.clone()];
        removed.extend(descendants(&tree, path).map(|(p, _)| p.clone()).collect::<Vec<_>>());
        for p in &removed[1..] {
            tree.remove(p);
        }

        tracing::debug!(path = %path, removed = removed.len(), "removed subtree");
        Ok(removed)
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn select(&self, path: &ResourcePath) -> DavResult<SelectionResult> {
        let tree = self.tree.read().await;
        Ok(match tree.get(path) {
            None => SelectionResult::Missing(path.clone()),
            Some(EntryRef::Document(d)) => SelectionResult::FoundDocument(d.clone()),
            Some(EntryRef::Collection(c)) => SelectionResult::FoundCollection(c.clone()),
        })
    }
}

/// Entries strictly below `path`, in path order.
fn descendants<'a>(
    tree: &'a BTreeMap<ResourcePath, EntryRef>,
    path: &'a ResourcePath,
) -> impl Iterator<Item = (&'a ResourcePath, &'a EntryRef)> + 'a {
    let prefix = path.descendant_prefix();
    tree.range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
        .take_while(move |(p, _)| p.as_str().starts_with(&prefix))
        .filter(move |(p, _)| *p != path)
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

struct MemoryDocument {
    path: ResourcePath,
    properties: Vec<Arc<dyn Property>>,
}

impl Entry for MemoryDocument {
    fn path(&self) -> &ResourcePath {
        &self.path
    }

    fn properties(&self) -> &[Arc<dyn Property>] {
        &self.properties
    }
}

impl Document for MemoryDocument {}

struct MemoryCollection {
    path: ResourcePath,
    properties: Vec<Arc<dyn Property>>,
    // Weak: the tree owns this collection.
    tree: Weak<Tree>,
}

impl Entry for MemoryCollection {
    fn path(&self) -> &ResourcePath {
        &self.path
    }

    fn properties(&self) -> &[Arc<dyn Property>] {
        &self.properties
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    async fn get_children(&self) -> DavResult<Vec<EntryRef>> {
        let tree = self
            .tree
            .upgrade()
            .ok_or_else(|| DavError::Storage("memory store was dropped".into()))?;
        let tree = tree.read().await;

        if !tree.contains_key(&self.path) {
            return Err(DavError::Storage(format!("{} was removed", self.path)));
        }

        let children: Vec<EntryRef> = descendants(&tree, &self.path)
            .filter(|(p, _)| p.parent().as_ref() == Some(&self.path))
            .map(|(_, entry)| entry.clone())
            .collect();

        tracing::debug!(path = %self.path, children = children.len(), "listed collection");
        Ok(children)
    }
}

/// `DAV:resourcetype`: `<D:collection/>` for collections, empty otherwise.
struct ResourceType {
    name: PropertyName,
    collection: bool,
}

impl ResourceType {
    fn new(collection: bool) -> Self {
        Self {
            name: PropertyName::dav("resourcetype"),
            collection,
        }
    }
}

impl Property for ResourceType {
    fn name(&self) -> &PropertyName {
        &self.name
    }

    fn as_readable(&self) -> Option<&dyn ReadableProperty> {
        Some(self)
    }
}

#[async_trait]
impl ReadableProperty for ResourceType {
    async fn get_wire_value(&self) -> DavResult<WireElement> {
        let element = WireElement::empty(self.name.clone());
        Ok(if self.collection {
            element.with_child(WireElement::empty(PropertyName::dav("collection")))
        } else {
            element
        })
    }
}

/// SHA-256 of the content, lowercase hex.
fn checksum(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

fn common_properties(
    path: &ResourcePath,
    collection: bool,
    modified: DateTime<Utc>,
) -> Vec<Arc<dyn Property>> {
    let display_name = path.name().to_string();
    let mut props: Vec<Arc<dyn Property>> = Vec::with_capacity(5);
    props.push(Arc::new(ConvertingProperty::new(
        PropertyName::dav("displayname"),
        CHEAP,
        Computed(move || -> DavResult<String> { Ok(display_name.clone()) }),
        StringConverter,
    )));
    props.push(Arc::new(ResourceType::new(collection)));
    props.push(Arc::new(ConvertingProperty::new(
        PropertyName::dav("getlastmodified"),
        CHEAP,
        Computed(move || -> DavResult<DateTime<Utc>> { Ok(modified) }),
        DateTimeConverter,
    )));
    props
}

fn document_properties(
    path: &ResourcePath,
    content: Arc<[u8]>,
    modified: DateTime<Utc>,
) -> Vec<Arc<dyn Property>> {
    let mut props = common_properties(path, false, modified);
    let length = content.len() as u64;
    props.push(Arc::new(ConvertingProperty::new(
        PropertyName::dav("getcontentlength"),
        CHEAP,
        Computed(move || -> DavResult<u64> { Ok(length) }),
        U64Converter,
    )));
    props.push(Arc::new(ConvertingProperty::new(
        PropertyName::new(DAVIS_NAMESPACE, "checksum"),
        CHECKSUM_COST,
        Computed(move || -> DavResult<String> { Ok(checksum(&content)) }),
        StringConverter,
    )));
    props
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

enum NodeSpec {
    Collection,
    Document(Vec<u8>),
}

/// Declarative construction of a [`MemoryStore`]. Missing parent
/// collections are created implicitly; the root always exists.
pub struct MemoryStoreBuilder {
    nodes: BTreeMap<ResourcePath, NodeSpec>,
    dead_properties: BTreeMap<ResourcePath, Vec<WireElement>>,
    modified: DateTime<Utc>,
}

impl Default for MemoryStoreBuilder {
    fn default() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(ResourcePath::root(), NodeSpec::Collection);
        Self {
            nodes,
            dead_properties: BTreeMap::new(),
            modified: Utc::now(),
        }
    }
}

impl MemoryStoreBuilder {
    pub fn collection(mut self, path: &str) -> Self {
        self.nodes.insert(ResourcePath::new(path), NodeSpec::Collection);
        self
    }

    pub fn document(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.nodes
            .insert(ResourcePath::new(path), NodeSpec::Document(content.into()));
        self
    }

    /// Attaches a client-managed property, listed after the live ones.
    pub fn dead_property(mut self, path: &str, value: WireElement) -> Self {
        self.dead_properties
            .entry(ResourcePath::new(path))
            .or_default()
            .push(value);
        self
    }

    /// Timestamp reported as `getlastmodified` for every entry.
    pub fn modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = modified;
        self
    }

    pub fn build(mut self) -> DavResult<MemoryStore> {
        let declared: Vec<ResourcePath> = self.nodes.keys().cloned().collect();
        for path in declared {
            for ancestor in path.ancestors() {
                match self.nodes.get(&ancestor) {
                    Some(NodeSpec::Document(_)) => {
                        return Err(DavError::InvalidInput(format!(
                            "{path} cannot live under document {ancestor}"
                        )));
                    }
                    Some(NodeSpec::Collection) => {}
                    None => {
                        self.nodes.insert(ancestor, NodeSpec::Collection);
                    }
                }
            }
        }

        if let Some(path) = self
            .dead_properties
            .keys()
            .find(|p| !self.nodes.contains_key(*p))
        {
            return Err(DavError::NotFound(format!(
                "dead property target {path} does not exist"
            )));
        }

        let modified = self.modified;
        let mut dead = self.dead_properties;
        let tree: Arc<Tree> = Arc::new_cyclic(|weak| {
            let mut entries = BTreeMap::new();
            for (path, node) in self.nodes {
                let extra = dead.remove(&path).unwrap_or_default();
                let entry = match node {
                    NodeSpec::Collection => {
                        let mut properties = common_properties(&path, true, modified);
                        properties.extend(dead_properties(extra));
                        EntryRef::Collection(Arc::new(MemoryCollection {
                            path: path.clone(),
                            properties,
                            tree: weak.clone(),
                        }))
                    }
                    NodeSpec::Document(content) => {
                        let mut properties = document_properties(&path, content.into(), modified);
                        properties.extend(dead_properties(extra));
                        EntryRef::Document(Arc::new(MemoryDocument {
                            path: path.clone(),
                            properties,
                        }))
                    }
                };
                entries.insert(path, entry);
            }
            tracing::debug!(entries = entries.len(), "built memory store");
            tokio::sync::RwLock::new(entries)
        });

        Ok(MemoryStore { tree })
    }
}

fn dead_properties(values: Vec<WireElement>) -> impl Iterator<Item = Arc<dyn Property>> {
    values
        .into_iter()
        .map(|value| Arc::new(DeadProperty::new(value)) as Arc<dyn Property>)
}

// ---------------------------------------------------------------------------
// Serializable tree description
// ---------------------------------------------------------------------------

/// JSON-friendly tree description, e.g.
///
/// ```json
/// { "entries": [
///     { "path": "/docs" },
///     { "path": "/docs/a", "content": "hello", "properties": { "{urn:x}color": "red" } }
/// ] }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreeSpec {
    pub entries: Vec<EntrySpec>,
}

/// One entry; without `content` it is a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySpec {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Dead properties keyed by Clark-notation name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl TreeSpec {
    pub fn into_builder(self) -> DavResult<MemoryStoreBuilder> {
        let mut builder = MemoryStore::builder();
        for entry in self.entries {
            builder = match entry.content {
                Some(content) => builder.document(&entry.path, content),
                None => builder.collection(&entry.path),
            };
            for (name, value) in entry.properties {
                let name: PropertyName = name.parse()?;
                builder = builder.dead_property(&entry.path, WireElement::text(name, value));
            }
        }
        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MemoryStore {
        MemoryStore::builder()
            .collection("/docs")
            .document("/docs/a", "hello")
            .collection("/docs/sub")
            .document("/docs-x", "sibling")
            .document("/deep/er/file", "x")
            .build()
            .unwrap()
    }

    fn names(entries: &[EntryRef]) -> Vec<&str> {
        entries.iter().map(|e| e.path().as_str()).collect()
    }

    #[tokio::test]
    async fn select_resolves_kinds() {
        let store = sample();
        assert!(matches!(
            store.select(&"/docs".into()).await.unwrap(),
            SelectionResult::FoundCollection(_)
        ));
        assert!(matches!(
            store.select(&"/docs/a".into()).await.unwrap(),
            SelectionResult::FoundDocument(_)
        ));
        assert!(store.select(&"/nope".into()).await.unwrap().is_missing());
    }

    #[tokio::test]
    async fn children_are_immediate_only() {
        let store = sample();
        let root = store.select(&ResourcePath::root()).await.unwrap().require().unwrap();
        let children = root.as_collection().unwrap().get_children().await.unwrap();
        assert_eq!(names(&children), vec!["/deep", "/docs", "/docs-x"]);

        let docs = store.select(&"/docs".into()).await.unwrap().require().unwrap();
        let children = docs.as_collection().unwrap().get_children().await.unwrap();
        assert_eq!(names(&children), vec!["/docs/a", "/docs/sub"]);
    }

    #[tokio::test]
    async fn implicit_parents_are_collections() {
        let store = sample();
        assert!(matches!(
            store.select(&"/deep/er".into()).await.unwrap(),
            SelectionResult::FoundCollection(_)
        ));
    }

    #[test]
    fn document_parent_is_rejected() {
        let result = MemoryStore::builder()
            .document("/a", "x")
            .document("/a/b", "y")
            .build();
        assert!(matches!(result, Err(DavError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn document_properties_in_declaration_order() {
        let store = sample();
        let doc = store.select(&"/docs/a".into()).await.unwrap().require().unwrap();
        let props: Vec<(String, u32)> = doc
            .properties()
            .iter()
            .map(|p| (p.name().local.clone(), p.cost()))
            .collect();
        assert_eq!(
            props,
            vec![
                ("displayname".to_string(), 0),
                ("resourcetype".to_string(), 0),
                ("getlastmodified".to_string(), 0),
                ("getcontentlength".to_string(), 0),
                ("checksum".to_string(), CHECKSUM_COST),
            ]
        );

        let length = doc.properties()[3].as_readable().unwrap().get_wire_value().await.unwrap();
        assert_eq!(length.text.as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn remove_drops_subtree() {
        let store = sample();
        let removed = store.remove(&"/docs".into()).await.unwrap();
        let removed: Vec<&str> = removed.iter().map(ResourcePath::as_str).collect();
        assert_eq!(removed, vec!["/docs", "/docs/a", "/docs/sub"]);
        assert!(store.select(&"/docs/a".into()).await.unwrap().is_missing());
        assert!(!store.select(&"/docs-x".into()).await.unwrap().is_missing());
        assert!(store.remove(&ResourcePath::root()).await.is_err());
    }

    #[tokio::test]
    async fn tree_spec_from_json() {
        let spec: TreeSpec = serde_json::from_str(
            r#"{ "entries": [
                { "path": "/docs" },
                { "path": "/docs/a", "content": "hi", "properties": { "{urn:x}color": "red" } }
            ] }"#,
        )
        .unwrap();
        let store = MemoryStore::from_spec(spec).unwrap();
        assert_eq!(store.len().await, 3);

        let doc = store.select(&"/docs/a".into()).await.unwrap().require().unwrap();
        let last = doc.properties().last().unwrap();
        assert_eq!(last.name(), &PropertyName::new("urn:x", "color"));
    }

    #[test]
    fn checksum_is_stable_hex() {
        assert_eq!(
            checksum(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(checksum(b"").len(), 64);
    }
}
