//! Domain models, header grammar, and error definitions.
//!
//! Foundation crate -- no async or I/O dependencies.

pub mod coded_url;
pub mod error;
pub mod headers;
pub mod multistatus;
pub mod types;

pub use coded_url::CodedUrl;
pub use error::{DavError, DavResult};
pub use headers::Depth;
pub use multistatus::{EntryResponse, MultiStatus, PropStat};
pub use types::{
    ActiveLock, LockDepth, LockRequest, LockResult, LockScope, LockTimeout, PropertyName,
    ResourcePath, WireElement, DAV_NAMESPACE,
};
