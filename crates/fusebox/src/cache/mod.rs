// Copyright (c) Microsoft Corporation.

//! Cache contract and hardening wrappers.
//!
//! Circuits consult the cache *before* checking their own state: a fresh
//! cached value short-circuits the whole pipeline, and a stale one doubles as
//! a fallback when user work fails. The contract is byte-oriented — the
//! runner serializes values with `serde_json` — so one cache instance serves
//! circuits of different value types.
//!
//! Like storage, caches advertise whether they are fault tolerant, and
//! non-tolerant caches are hardened before a circuit runs against them:
//! [`CircuitGuardedCache`] bounds repeated round-trips to a sick backend with
//! its own internal circuit, and [`FaultTolerantCache`] absorbs residual
//! errors into `cache_failure` events.

mod fault_tolerant;
mod guarded;
mod memory;
mod null;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tick::Clock;

pub use fault_tolerant::FaultTolerantCache;
pub use guarded::CircuitGuardedCache;
pub use memory::MemoryCache;
pub use null::NullCache;

use crate::events::Notify;

/// The result for fallible operations that use the cache [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// An error from a cache backend.
///
/// This is an opaque wrapper around the backend's own error; use
/// [`std::error::Error::source`] to reach the cause.
#[derive(Debug, thiserror::Error)]
#[error("cache error: {0}")]
pub struct Error(#[source] Box<dyn std::error::Error + Send + Sync>);

impl Error {
    /// Wraps a backend-specific cause.
    pub fn backend(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(cause.into())
    }
}

/// A read/write cache with optional expiry.
///
/// Implementations must be safe to share across threads. A `None` expiry
/// means the backend's own policy (or nothing) evicts the value.
pub trait Cache: fmt::Debug + Send + Sync {
    /// Reads the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Fails when the backend fails; fault-tolerant implementations never do.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores `value` under `key`, expiring it after `expires_in` when given.
    ///
    /// # Errors
    ///
    /// Fails when the backend fails; fault-tolerant implementations never do.
    fn write(&self, key: &str, value: &[u8], expires_in: Option<Duration>) -> Result<()>;

    /// True iff this cache promises not to fail on reads and writes.
    fn is_fault_tolerant(&self) -> bool;
}

/// Hardens a user-supplied cache the same way storage is hardened:
/// nothing becomes a [`NullCache`], fault-tolerant caches pass through, and
/// anything else runs behind a guard circuit inside a fault-tolerant shell.
pub(crate) fn auto_wire(cache: Option<Arc<dyn Cache>>, clock: &Clock, notifier: &Arc<dyn Notify>) -> Arc<dyn Cache> {
    match cache {
        None => Arc::new(NullCache::new()),
        Some(cache) if cache.is_fault_tolerant() => cache,
        Some(cache) => {
            let guarded = CircuitGuardedCache::new(cache, clock, notifier);
            Arc::new(FaultTolerantCache::new(Arc::new(guarded), Arc::clone(notifier)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Notifier;

    #[test]
    fn auto_wire_defaults_to_null() {
        let clock = Clock::new_frozen();
        let notifier: Arc<dyn Notify> = Arc::new(Notifier::new(Vec::new()));

        let cache = auto_wire(None, &clock, &notifier);
        assert!(cache.is_fault_tolerant());
        assert_eq!(cache.read("k").unwrap(), None);
    }

    #[test]
    fn auto_wire_keeps_tolerant_caches() {
        let clock = Clock::new_frozen();
        let notifier: Arc<dyn Notify> = Arc::new(Notifier::new(Vec::new()));
        let memory: Arc<dyn Cache> = Arc::new(MemoryCache::new(&clock));

        let wired = auto_wire(Some(Arc::clone(&memory)), &clock, &notifier);
        assert!(Arc::ptr_eq(&wired, &memory));
    }
}
