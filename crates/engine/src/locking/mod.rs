//! Lock lifecycle: the process-wide lock table, per-request implicit locks,
//! and lock discovery rendering.

pub mod discovery;
pub mod implicit;
pub mod manager;

use davis_core::error::DavResult;
use davis_core::{ActiveLock, CodedUrl, LockRequest, LockResult, LockTimeout, ResourcePath};

pub use implicit::ImplicitLock;
pub use manager::InMemoryLockManager;

/// Authority over active locks.
///
/// Operations never suspend: each one runs as a single critical section over
/// the lock table, so a grant is either fully committed or never happened.
/// Expired locks are invisible to every operation.
pub trait LockManager: Send + Sync {
    /// Grants a lock or reports every lock that blocks it.
    fn lock(&self, request: LockRequest) -> LockResult;

    /// Extends a live lock's expiry. Scope and path never change.
    fn refresh(&self, token: &CodedUrl, timeout: Option<LockTimeout>) -> DavResult<ActiveLock>;

    /// Removes the lock named by `token`, which must apply to `path`.
    ///
    /// Unknown and expired tokens yield `DavError::LockNotFound`, which
    /// best-effort callers may ignore.
    fn release(&self, path: &ResourcePath, token: &CodedUrl) -> DavResult<()>;

    fn get_lock(&self, token: &CodedUrl) -> Option<ActiveLock>;

    /// Locks rooted exactly at `path`.
    fn get_locks(&self, path: &ResourcePath) -> Vec<ActiveLock>;

    /// Locks applying to `path`: rooted at it, or at an ancestor with depth infinity.
    fn get_covering_locks(&self, path: &ResourcePath) -> Vec<ActiveLock>;

    /// Drops every lock rooted at or below a deleted resource.
    fn remove_locks_under(&self, path: &ResourcePath) -> Vec<ActiveLock>;
}
