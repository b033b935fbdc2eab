//! Lock manager configuration.

use davis_core::error::{DavError, DavResult};
use davis_core::LockTimeout;
use serde::{Deserialize, Serialize};

const DEFAULT_TIMEOUT_SECS: u64 = 600;
const MAX_TIMEOUT_SECS: u64 = 3600;
const SWEEP_INTERVAL_SECS: u64 = 60;
/// Shortest timeout ever granted; a zero-second lock would be born expired.
const MIN_TIMEOUT_SECS: u64 = 1;

/// Timeouts applied to lock grants and refreshes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockManagerConfig {
    /// Used when the client does not ask for a timeout.
    pub default_timeout_secs: u64,
    /// Upper bound for every granted timeout, `Infinite` included.
    pub max_timeout_secs: u64,
    /// Period of the optional background expiry sweep.
    pub sweep_interval_secs: u64,
}

impl Default for LockManagerConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_timeout_secs: MAX_TIMEOUT_SECS,
            sweep_interval_secs: SWEEP_INTERVAL_SECS,
        }
    }
}

impl LockManagerConfig {
    pub fn validate(&self) -> DavResult<()> {
        if self.default_timeout_secs == 0 {
            return Err(DavError::InvalidInput(
                "default_timeout_secs must be positive".into(),
            ));
        }
        if self.max_timeout_secs == 0 {
            return Err(DavError::InvalidInput(
                "max_timeout_secs must be positive".into(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(DavError::InvalidInput(
                "sweep_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Timeout actually granted for a request, clamped between one second
    /// and `max_timeout_secs`.
    pub fn effective_timeout(&self, requested: Option<LockTimeout>) -> u64 {
        let secs = match requested {
            None => self.default_timeout_secs,
            Some(LockTimeout::Infinite) => self.max_timeout_secs,
            Some(LockTimeout::Seconds(secs)) => secs,
        };
        secs.min(self.max_timeout_secs).max(MIN_TIMEOUT_SECS)
    }
}
