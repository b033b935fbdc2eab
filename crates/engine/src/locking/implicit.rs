//! Request-scoped locking outcome.
//!
//! An [`ImplicitLock`] records whether a mutating request may proceed. When
//! the request needed a lock of its own, the lock lives exactly as long as
//! the value: it is released once, on drop, on every exit path.

use crate::locking::LockManager;
use davis_core::{
    ActiveLock, CodedUrl, LockDepth, LockRequest, LockResult, LockScope, ResourcePath,
};
use std::future::Future;
use std::sync::Arc;

enum State {
    /// No lock manager in effect.
    Unconditional,
    /// Locks the client already holds cover the request.
    Owned(Vec<ActiveLock>),
    /// A lock attempted for this request only.
    Temporary(LockResult),
}

pub struct ImplicitLock {
    manager: Option<Arc<dyn LockManager>>,
    state: State,
    released: bool,
}

impl ImplicitLock {
    pub fn unconditional() -> Self {
        Self {
            manager: None,
            state: State::Unconditional,
            released: false,
        }
    }

    pub fn owned(locks: Vec<ActiveLock>) -> Self {
        Self {
            manager: None,
            state: State::Owned(locks),
            released: false,
        }
    }

    pub fn temporary(manager: Arc<dyn LockManager>, result: LockResult) -> Self {
        Self {
            manager: Some(manager),
            state: State::Temporary(result),
            released: false,
        }
    }

    /// Decides how a request touching `path` is covered.
    ///
    /// Supplied tokens count only if they name a live lock applying to
    /// `path`. If none does, an exclusive depth-zero lock is attempted for
    /// the request; a refused attempt is a value, not an error.
    pub fn evaluate(
        manager: Option<&Arc<dyn LockManager>>,
        path: &ResourcePath,
        supplied_tokens: &[CodedUrl],
        owner: Option<&str>,
    ) -> Self {
        let Some(manager) = manager else {
            return Self::unconditional();
        };

        let held: Vec<ActiveLock> = supplied_tokens
            .iter()
            .filter_map(|token| manager.get_lock(token))
            .filter(|lock| lock.covers(path))
            .collect();
        if !held.is_empty() {
            tracing::debug!(path = %path, locks = held.len(), "request covered by held locks");
            return Self::owned(held);
        }

        let mut request = LockRequest::new(path.clone(), LockScope::Exclusive, LockDepth::Zero);
        if let Some(owner) = owner {
            request = request.with_owner(owner);
        }
        let result = manager.lock(request);
        Self::temporary(Arc::clone(manager), result)
    }

    pub fn is_successful(&self) -> bool {
        match &self.state {
            State::Unconditional | State::Owned(_) => true,
            State::Temporary(result) => result.is_granted(),
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self.state, State::Temporary(_))
    }

    /// Locks the request runs under: the held ones, or the temporary grant.
    pub fn owned_locks(&self) -> &[ActiveLock] {
        match &self.state {
            State::Unconditional => &[],
            State::Owned(locks) => locks,
            State::Temporary(LockResult::Granted(lock)) => std::slice::from_ref(lock),
            State::Temporary(LockResult::Conflict(_)) => &[],
        }
    }

    pub fn conflicting_locks(&self) -> &[ActiveLock] {
        match &self.state {
            State::Temporary(result) => result.conflicts(),
            _ => &[],
        }
    }

    /// Ends the request scope now.
    pub fn release(mut self) {
        self.release_once();
    }

    /// Runs `request` and releases afterwards, whether it completes, fails,
    /// or is dropped mid-flight.
    pub async fn scope<F, T>(self, request: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self;
        request.await
    }

    fn release_once(&mut self) {
        if std::mem::replace(&mut self.released, true) {
            return;
        }
        let (Some(manager), State::Temporary(LockResult::Granted(lock))) =
            (&self.manager, &self.state)
        else {
            return;
        };
        if let Err(e) = manager.release(&lock.path, &lock.state_token) {
            tracing::debug!(
                path = %lock.path,
                token = %lock.state_token,
                error = %e,
                "ignoring temporary lock release failure"
            );
        }
    }
}

impl Drop for ImplicitLock {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl std::fmt::Debug for ImplicitLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImplicitLock")
            .field("successful", &self.is_successful())
            .field("temporary", &self.is_temporary())
            .field("owned", &self.owned_locks().len())
            .field("conflicts", &self.conflicting_locks().len())
            .finish()
    }
}
