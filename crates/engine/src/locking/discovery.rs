//! `DAV:lockdiscovery` rendering.

use crate::locking::LockManager;
use davis_core::headers::format_timeout;
use davis_core::{ActiveLock, LockDepth, LockScope, PropertyName, ResourcePath, WireElement};

fn dav(local: &str) -> PropertyName {
    PropertyName::dav(local)
}

fn href(value: impl Into<String>) -> WireElement {
    WireElement::text(dav("href"), value)
}

fn wrap(local: &str, child: WireElement) -> WireElement {
    WireElement::empty(dav(local)).with_child(child)
}

/// One `DAV:activelock` element.
pub fn active_lock_element(lock: &ActiveLock) -> WireElement {
    let scope = match lock.scope {
        LockScope::Exclusive => "exclusive",
        LockScope::Shared => "shared",
    };
    let depth = match lock.depth {
        LockDepth::Zero => "0",
        LockDepth::Infinity => "infinity",
    };

    let mut element = WireElement::empty(dav("activelock"))
        .with_child(wrap("lockscope", WireElement::empty(dav(scope))))
        .with_child(wrap("locktype", WireElement::empty(dav("write"))))
        .with_child(WireElement::text(dav("depth"), depth));
    if let Some(owner) = &lock.owner {
        element = element.with_child(WireElement::text(dav("owner"), owner.as_str()));
    }
    element
        .with_child(WireElement::text(dav("timeout"), format_timeout(lock.timeout_secs)))
        .with_child(wrap("locktoken", href(lock.state_token.as_str())))
        .with_child(wrap("lockroot", href(lock.path.as_str())))
}

pub fn lock_discovery(locks: &[ActiveLock]) -> WireElement {
    locks
        .iter()
        .fold(WireElement::empty(dav("lockdiscovery")), |element, lock| {
            element.with_child(active_lock_element(lock))
        })
}

/// Discovery for `path`, including recursive locks held on ancestors.
pub fn discover(manager: &dyn LockManager, path: &ResourcePath) -> WireElement {
    lock_discovery(&manager.get_covering_locks(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockManagerConfig;
    use crate::locking::InMemoryLockManager;
    use davis_core::{LockRequest, LockTimeout};

    #[test]
    fn renders_every_covering_lock() {
        let manager = InMemoryLockManager::new(LockManagerConfig::default()).unwrap();
        let lock = manager
            .lock(
                LockRequest::new("/docs", LockScope::Shared, LockDepth::Infinity)
                    .with_owner("alice")
                    .with_timeout(LockTimeout::Seconds(120)),
            )
            .lock()
            .unwrap()
            .clone();

        let element = discover(&manager, &"/docs/a".into());
        assert_eq!(element.name, dav("lockdiscovery"));
        assert_eq!(element.children.len(), 1);

        let active = &element.children[0];
        let child = |local: &str| {
            active
                .children
                .iter()
                .find(|c| c.name.local == local)
                .unwrap()
                .clone()
        };
        assert_eq!(child("lockscope").children[0].name, dav("shared"));
        assert_eq!(child("depth").text.as_deref(), Some("infinity"));
        assert_eq!(child("owner").text.as_deref(), Some("alice"));
        assert_eq!(child("timeout").text.as_deref(), Some("Second-120"));
        assert_eq!(
            child("locktoken").children[0].text.as_deref(),
            Some(lock.state_token.as_str())
        );
        assert_eq!(child("lockroot").children[0].text.as_deref(), Some("/docs"));
    }

    #[test]
    fn empty_discovery_for_unlocked_path() {
        let manager = InMemoryLockManager::new(LockManagerConfig::default()).unwrap();
        assert!(discover(&manager, &"/free".into()).children.is_empty());
    }
}
