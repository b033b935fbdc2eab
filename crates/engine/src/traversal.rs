//! Depth-bounded, lazily expanded walk over the resource store.
//!
//! A collection's children are fetched on the call to [`Traversal::next`]
//! that follows the one yielding the collection, so a consumer that stops
//! early never triggers further store calls.

use davis_core::error::DavResult;
use davis_core::ResourcePath;
use davis_store::{Collection, EntryRef, ResourceStore};
use std::collections::VecDeque;
use std::sync::Arc;

/// Looks `path` up in the store; `NotFound` if it is missing.
pub async fn resolve(store: &dyn ResourceStore, path: &ResourcePath) -> DavResult<EntryRef> {
    store.select(path).await?.require()
}

/// Breadth-first cursor yielding the root, then descendants within `limit` levels.
pub struct Traversal {
    /// Entries ready to yield, with their distance from the root.
    queue: VecDeque<(EntryRef, u32)>,
    /// Collection yielded last whose children are still unfetched.
    pending: Option<(Arc<dyn Collection>, u32)>,
    limit: u32,
    fused: bool,
}

impl Traversal {
    pub fn new(root: EntryRef, limit: u32) -> Self {
        Self {
            queue: VecDeque::from([(root, 0)]),
            pending: None,
            limit,
            fused: false,
        }
    }

    /// Next entry, `Ok(None)` once exhausted.
    ///
    /// A store failure while expanding a collection is returned once; the
    /// cursor yields nothing afterwards.
    pub async fn next(&mut self) -> DavResult<Option<EntryRef>> {
        if self.fused {
            return Ok(None);
        }

        if let Some((collection, level)) = self.pending.take() {
            match collection.get_children().await {
                Ok(children) => self
                    .queue
                    .extend(children.into_iter().map(|child| (child, level + 1))),
                Err(e) => {
                    self.fused = true;
                    tracing::warn!(path = %collection.path(), error = %e, "traversal aborted");
                    return Err(e);
                }
            }
        }

        let Some((entry, level)) = self.queue.pop_front() else {
            self.fused = true;
            return Ok(None);
        };
        if level < self.limit {
            if let Some(collection) = entry.as_collection() {
                self.pending = Some((Arc::clone(collection), level));
            }
        }
        Ok(Some(entry))
    }

    /// Drains the cursor.
    pub async fn collect(mut self) -> DavResult<Vec<EntryRef>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.next().await? {
            entries.push(entry);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use davis_core::error::DavError;
    use davis_store::{Entry, MemoryStore, Property};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn paths(entries: &[EntryRef]) -> Vec<&str> {
        entries.iter().map(|e| e.path().as_str()).collect()
    }

    fn wide(children: usize) -> MemoryStore {
        let mut builder = MemoryStore::builder()
            .collection("/root")
            .document("/root/grand/child", "x");
        for i in 0..children {
            builder = builder.document(&format!("/root/c{i:02}"), "x");
        }
        builder.build().unwrap()
    }

    async fn walk(store: &MemoryStore, limit: u32) -> Vec<EntryRef> {
        let root = resolve(store, &"/root".into()).await.unwrap();
        Traversal::new(root, limit).collect().await.unwrap()
    }

    #[tokio::test]
    async fn depth_zero_yields_root_only() {
        let store = wide(50);
        let entries = walk(&store, 0).await;
        assert_eq!(paths(&entries), vec!["/root"]);
    }

    #[tokio::test]
    async fn depth_one_yields_exactly_immediate_children() {
        // `/root/grand` is always present, so this covers 1, 2, and 51 children.
        for extra in [0usize, 1, 50] {
            let store = wide(extra);
            let entries = walk(&store, 1).await;
            assert_eq!(entries.len(), extra + 2, "{extra} extra children");
            assert_eq!(entries[0].path().as_str(), "/root");
            assert!(entries[1..]
                .iter()
                .all(|e| e.path().parent() == Some(ResourcePath::new("/root"))));
        }
    }

    #[tokio::test]
    async fn empty_collection_at_depth_one() {
        let store = MemoryStore::builder().collection("/root").build().unwrap();
        assert_eq!(paths(&walk(&store, 1).await), vec!["/root"]);
    }

    #[tokio::test]
    async fn deeper_limits_stay_breadth_first() {
        let store = MemoryStore::builder()
            .document("/root/a/b/c", "x")
            .document("/root/z", "x")
            .build()
            .unwrap();
        let entries = walk(&store, 2).await;
        assert_eq!(paths(&entries), vec!["/root", "/root/a", "/root/z", "/root/a/b"]);
    }

    #[tokio::test]
    async fn document_root_ignores_limit() {
        let store = wide(0);
        let root = resolve(&store, &"/root/grand/child".into()).await.unwrap();
        let entries = Traversal::new(root, 1).collect().await.unwrap();
        assert_eq!(paths(&entries), vec!["/root/grand/child"]);
    }

    #[tokio::test]
    async fn missing_root_is_not_found() {
        let store = wide(0);
        let err = resolve(&store, &"/nope".into()).await.unwrap_err();
        assert!(matches!(err, DavError::NotFound(_)));
    }

    /// Collection with scripted children that counts enumerations.
    struct Scripted {
        path: ResourcePath,
        children: Vec<EntryRef>,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    impl Entry for Scripted {
        fn path(&self) -> &ResourcePath {
            &self.path
        }
        fn properties(&self) -> &[Arc<dyn Property>] {
            &[]
        }
    }

    #[async_trait]
    impl Collection for Scripted {
        async fn get_children(&self) -> DavResult<Vec<EntryRef>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DavError::Storage(format!("{} unreadable", self.path)));
            }
            Ok(self.children.clone())
        }
    }

    fn scripted(
        path: &str,
        children: Vec<EntryRef>,
        fail: bool,
        calls: &Arc<AtomicUsize>,
    ) -> EntryRef {
        EntryRef::Collection(Arc::new(Scripted {
            path: path.into(),
            children,
            fail,
            calls: calls.clone(),
        }))
    }

    #[tokio::test]
    async fn stopping_early_skips_enumeration() {
        let calls = Arc::new(AtomicUsize::new(0));
        let child = scripted("/r/a", vec![], false, &calls);
        let root = scripted("/r", vec![child], false, &calls);

        let mut traversal = Traversal::new(root, 5);
        let first = traversal.next().await.unwrap().unwrap();
        assert_eq!(first.path().as_str(), "/r");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        drop(traversal);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn store_failure_surfaces_mid_sequence() {
        let calls = Arc::new(AtomicUsize::new(0));
        let broken = scripted("/r/broken", vec![], true, &calls);
        let root = scripted("/r", vec![broken], false, &calls);

        let mut traversal = Traversal::new(root, 2);
        assert_eq!(traversal.next().await.unwrap().unwrap().path().as_str(), "/r");
        assert_eq!(traversal.next().await.unwrap().unwrap().path().as_str(), "/r/broken");

        let err = traversal.next().await.unwrap_err();
        assert!(matches!(err, DavError::Storage(_)));
        assert!(traversal.next().await.unwrap().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
