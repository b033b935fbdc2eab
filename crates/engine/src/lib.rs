//! Lock manager, implicit request locks, hierarchical traversal, and
//! PROPFIND multi-status assembly.

pub mod clock;
pub mod config;
pub mod locking;
pub mod propfind;
pub mod sink;
pub mod traversal;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LockManagerConfig;
pub use locking::{ImplicitLock, InMemoryLockManager, LockManager};
pub use propfind::{PropFindHandler, PropFindItem, PropFindRequest};
pub use traversal::{resolve, Traversal};
