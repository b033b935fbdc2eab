//! End-to-end flows across the store, lock manager, and PROPFIND handler.

use davis_core::error::DavError;
use davis_core::{Depth, LockDepth, LockRequest, LockScope, LockTimeout, ResourcePath};
use davis_engine::locking::discovery;
use davis_engine::{
    ImplicitLock, InMemoryLockManager, LockManager, LockManagerConfig, PropFindHandler,
};
use davis_store::memory::DAVIS_NAMESPACE;
use davis_store::{MemoryStore, StaticHost};
use std::sync::Arc;

fn docs_store() -> MemoryStore {
    MemoryStore::builder()
        .collection("/docs")
        .document("/docs/a", "alpha")
        .collection("/docs/sub")
        .build()
        .unwrap()
}

#[tokio::test]
async fn propfind_depth_one_without_body() {
    let store = Arc::new(docs_store());
    let host = Arc::new(StaticHost::parse("https://dav.example.com/").unwrap());
    let handler = PropFindHandler::new(store, host);

    let result = handler
        .handle(&"/docs".into(), None, Depth::One)
        .await
        .unwrap();

    let hrefs: Vec<&str> = result.responses.iter().map(|r| r.href.as_str()).collect();
    assert_eq!(hrefs[0], "https://dav.example.com/docs");
    let mut children = hrefs[1..].to_vec();
    children.sort_unstable();
    assert_eq!(
        children,
        vec!["https://dav.example.com/docs/a", "https://dav.example.com/docs/sub"]
    );

    for response in &result.responses {
        assert_eq!(response.propstat.status, "HTTP/1.1 200 OK");
        assert!(!response.propstat.props.is_empty());
        assert!(response
            .propstat
            .props
            .iter()
            .all(|p| p.name.namespace != DAVIS_NAMESPACE));
    }

    let xml = result.to_xml();
    assert!(xml.contains("<D:href>https://dav.example.com/docs/sub</D:href>"));
    assert_eq!(xml.matches("<D:response>").count(), 3);
}

#[tokio::test]
async fn write_under_held_and_temporary_locks() {
    let manager: Arc<dyn LockManager> =
        Arc::new(InMemoryLockManager::new(LockManagerConfig::default()).unwrap());
    let docs = ResourcePath::new("/docs");
    let a = ResourcePath::new("/docs/a");

    let held = manager
        .lock(
            LockRequest::new(docs.clone(), LockScope::Exclusive, LockDepth::Infinity)
                .with_owner("alice")
                .with_timeout(LockTimeout::Seconds(300)),
        )
        .lock()
        .cloned()
        .unwrap();

    // Another client without the token is refused.
    let stranger = ImplicitLock::evaluate(Some(&manager), &a, &[], Some("bob"));
    assert!(!stranger.is_successful());
    assert_eq!(stranger.conflicting_locks()[0].state_token, held.state_token);
    drop(stranger);

    // The holder proceeds under its own lock, which outlives the request.
    let tokens = davis_core::headers::if_state_tokens(&format!("({})", held.state_token)).unwrap();
    let holder = ImplicitLock::evaluate(Some(&manager), &a, &tokens, Some("alice"));
    let written = holder.scope(async { Ok::<_, DavError>("written") }).await.unwrap();
    assert_eq!(written, "written");
    assert!(manager.get_lock(&held.state_token).is_some());

    let discovery = discovery::discover(manager.as_ref(), &a);
    assert_eq!(discovery.children.len(), 1);

    manager.release(&docs, &held.state_token).unwrap();
    let temp = ImplicitLock::evaluate(Some(&manager), &a, &[], Some("bob"));
    assert!(temp.is_successful() && temp.is_temporary());
    temp.release();
    assert!(manager.get_covering_locks(&a).is_empty());
}

#[tokio::test]
async fn deleting_a_subtree_drops_its_locks() {
    let store = docs_store();
    let manager = InMemoryLockManager::new(LockManagerConfig::default()).unwrap();
    for path in ["/docs/a", "/docs/sub"] {
        assert!(manager
            .lock(LockRequest::new(path, LockScope::Shared, LockDepth::Zero))
            .is_granted());
    }

    let removed = store.remove(&"/docs".into()).await.unwrap();
    assert_eq!(removed.len(), 3);
    assert_eq!(manager.remove_locks_under(&"/docs".into()).len(), 2);
    assert!(manager.is_empty());
}
