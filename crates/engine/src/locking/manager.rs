//! In-memory lock table.
//!
//! One `RwLock` guards the whole table. Grants, refreshes, and releases take
//! the write guard for conflict check plus mutation, so two overlapping
//! grants can never both succeed. Queries share the read guard and never
//! observe a half-applied change.

use crate::clock::{Clock, SystemClock};
use crate::config::LockManagerConfig;
use crate::locking::LockManager;
use chrono::{DateTime, Duration, Utc};
use davis_core::error::{DavError, DavResult};
use davis_core::{
    ActiveLock, CodedUrl, LockDepth, LockRequest, LockResult, LockTimeout, ResourcePath,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

/// Process-wide lock table. Construct once and share via `Arc`.
pub struct InMemoryLockManager {
    config: LockManagerConfig,
    clock: Arc<dyn Clock>,
    table: RwLock<LockTable>,
}

#[derive(Default)]
struct LockTable {
    by_path: BTreeMap<ResourcePath, Vec<ActiveLock>>,
    by_token: HashMap<CodedUrl, ResourcePath>,
}

impl LockTable {
    /// Locks sharing a resource with a `depth` lock on `path`, expired ones included.
    fn overlapping<'a>(
        &'a self,
        path: &'a ResourcePath,
        depth: LockDepth,
    ) -> Vec<&'a ActiveLock> {
        let mut out: Vec<&ActiveLock> = Vec::new();
        if let Some(locks) = self.by_path.get(path) {
            out.extend(locks);
        }
        for ancestor in path.ancestors() {
            if let Some(locks) = self.by_path.get(&ancestor) {
                out.extend(locks.iter().filter(|l| l.depth == LockDepth::Infinity));
            }
        }
        if depth == LockDepth::Infinity {
            out.extend(self.below(path).flat_map(|(_, locks)| locks));
        }
        out
    }

    /// Entries strictly below `path`.
    fn below<'a>(
        &'a self,
        path: &'a ResourcePath,
    ) -> impl Iterator<Item = (&'a ResourcePath, &'a Vec<ActiveLock>)> + 'a {
        let prefix = path.descendant_prefix();
        self.by_path
            .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
            .take_while(move |(p, _)| p.as_str().starts_with(&prefix))
            .filter(move |(p, _)| *p != path)
    }

    fn insert(&mut self, lock: ActiveLock) {
        self.by_token
            .insert(lock.state_token.clone(), lock.path.clone());
        self.by_path.entry(lock.path.clone()).or_default().push(lock);
    }

    fn find_mut(&mut self, token: &CodedUrl) -> Option<&mut ActiveLock> {
        let path = self.by_token.get(token)?;
        self.by_path
            .get_mut(path)?
            .iter_mut()
            .find(|l| l.state_token == *token)
    }

    fn remove(&mut self, token: &CodedUrl) -> Option<ActiveLock> {
        let path = self.by_token.remove(token)?;
        let locks = self.by_path.get_mut(&path)?;
        let idx = locks.iter().position(|l| l.state_token == *token)?;
        let lock = locks.swap_remove(idx);
        if locks.is_empty() {
            self.by_path.remove(&path);
        }
        Some(lock)
    }

    fn remove_expired(&mut self, now: DateTime<Utc>) -> usize {
        let expired: Vec<CodedUrl> = self
            .by_path
            .values()
            .flatten()
            .filter(|l| l.is_expired_at(now))
            .map(|l| l.state_token.clone())
            .collect();
        for token in &expired {
            self.remove(token);
        }
        expired.len()
    }

    fn len(&self) -> usize {
        self.by_token.len()
    }
}

/// `now + secs`, saturating at the latest representable instant.
fn expiry(now: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl InMemoryLockManager {
    pub fn new(config: LockManagerConfig) -> DavResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: LockManagerConfig, clock: Arc<dyn Clock>) -> DavResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            table: RwLock::new(LockTable::default()),
        })
    }

    /// Timeouts this manager grants with.
    pub fn config(&self) -> &LockManagerConfig {
        &self.config
    }

    /// Number of entries in the table, expired ones not yet purged included.
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// `true` if the table holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every expired lock. Correctness never depends on this; it only
    /// bounds memory.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let purged = self.table.write().remove_expired(now);
        if purged > 0 {
            tracing::debug!(purged, "purged expired locks");
        }
        purged
    }

    /// Runs [`purge_expired`](Self::purge_expired) every `sweep_interval_secs`
    /// until the manager is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::downgrade(self);
        let period = std::time::Duration::from_secs(self.config.sweep_interval_secs.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    tracing::debug!("lock manager dropped, sweeper exiting");
                    break;
                };
                manager.purge_expired();
            }
        })
    }

    fn live(&self, locks: impl IntoIterator<Item = ActiveLock>) -> Vec<ActiveLock> {
        let now = self.clock.now();
        locks.into_iter().filter(|l| !l.is_expired_at(now)).collect()
    }
}

impl LockManager for InMemoryLockManager {
    fn lock(&self, request: LockRequest) -> LockResult {
        let timeout_secs = self.config.effective_timeout(request.timeout);
        let mut table = self.table.write();
        let now = self.clock.now();

        let mut expired = Vec::new();
        let mut conflicts = Vec::new();
        for existing in table.overlapping(&request.path, request.depth) {
            if existing.is_expired_at(now) {
                expired.push(existing.state_token.clone());
            } else if !existing.scope.is_compatible_with(request.scope) {
                conflicts.push(existing.clone());
            }
        }
        for token in &expired {
            table.remove(token);
        }

        if !conflicts.is_empty() {
            tracing::warn!(
                path = %request.path,
                scope = ?request.scope,
                depth = ?request.depth,
                conflicts = conflicts.len(),
                "lock refused"
            );
            return LockResult::Conflict(conflicts);
        }

        let lock = ActiveLock {
            path: request.path,
            scope: request.scope,
            depth: request.depth,
            state_token: CodedUrl::new_state_token(),
            owner: request.owner,
            timeout_secs,
            issued: now,
            expires_at: expiry(now, timeout_secs),
        };
        table.insert(lock.clone());

        tracing::info!(
            path = %lock.path,
            token = %lock.state_token,
            scope = ?lock.scope,
            depth = ?lock.depth,
            timeout_secs,
            "lock granted"
        );
        LockResult::Granted(lock)
    }

    fn refresh(&self, token: &CodedUrl, timeout: Option<LockTimeout>) -> DavResult<ActiveLock> {
        let timeout_secs = self.config.effective_timeout(timeout);
        let mut table = self.table.write();
        let now = self.clock.now();

        let lock = table
            .find_mut(token)
            .ok_or_else(|| DavError::LockNotFound(token.to_string()))?;
        if lock.is_expired_at(now) {
            table.remove(token);
            return Err(DavError::LockNotFound(token.to_string()));
        }

        lock.timeout_secs = timeout_secs;
        lock.expires_at = expiry(now, timeout_secs);
        tracing::debug!(token = %token, timeout_secs, "lock refreshed");
        Ok(lock.clone())
    }

    fn release(&self, path: &ResourcePath, token: &CodedUrl) -> DavResult<()> {
        let mut table = self.table.write();
        let now = self.clock.now();

        let lock = table
            .find_mut(token)
            .ok_or_else(|| DavError::LockNotFound(token.to_string()))?;
        if lock.is_expired_at(now) {
            table.remove(token);
            return Err(DavError::LockNotFound(token.to_string()));
        }
        if !lock.covers(path) {
            return Err(DavError::LockNotFound(format!("{token} does not apply to {path}")));
        }

        table.remove(token);
        tracing::info!(path = %path, token = %token, "lock released");
        Ok(())
    }

    fn get_lock(&self, token: &CodedUrl) -> Option<ActiveLock> {
        let table = self.table.read();
        let path = table.by_token.get(token)?;
        let lock = table
            .by_path
            .get(path)?
            .iter()
            .find(|l| l.state_token == *token)?;
        (!lock.is_expired_at(self.clock.now())).then(|| lock.clone())
    }

    fn get_locks(&self, path: &ResourcePath) -> Vec<ActiveLock> {
        let locks = self
            .table
            .read()
            .by_path
            .get(path)
            .cloned()
            .unwrap_or_default();
        self.live(locks)
    }

    fn get_covering_locks(&self, path: &ResourcePath) -> Vec<ActiveLock> {
        let locks: Vec<ActiveLock> = self
            .table
            .read()
            .overlapping(path, LockDepth::Zero)
            .into_iter()
            .cloned()
            .collect();
        self.live(locks)
    }

    fn remove_locks_under(&self, path: &ResourcePath) -> Vec<ActiveLock> {
        let mut table = self.table.write();
        let mut tokens: Vec<CodedUrl> = table
            .by_path
            .get(path)
            .into_iter()
            .flatten()
            .map(|l| l.state_token.clone())
            .collect();
        tokens.extend(
            table
                .below(path)
                .flat_map(|(_, locks)| locks)
                .map(|l| l.state_token.clone()),
        );

        let removed: Vec<ActiveLock> = tokens.iter().filter_map(|t| table.remove(t)).collect();
        drop(table);

        if !removed.is_empty() {
            tracing::info!(
                path = %path,
                removed = removed.len(),
                "dropped locks of deleted resource"
            );
        }
        self.live(removed)
    }
}
