// Copyright (c) Microsoft Corporation.

use std::sync::Arc;
use std::time::Duration;

use super::{Cache, Result};
use crate::events::{CacheAction, Event, Notify};

/// Absorbs every failure of a wrapped cache.
///
/// Failed reads become misses and failed writes are dropped; each absorbed
/// failure is reported through the notifier as a `cache_failure` event. The
/// circuit pipeline degrades gracefully: a broken cache costs fallback values
/// and write-backs, never correctness.
pub struct FaultTolerantCache {
    inner: Arc<dyn Cache>,
    notifier: Arc<dyn Notify>,
}

impl std::fmt::Debug for FaultTolerantCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultTolerantCache").field("inner", &self.inner).finish_non_exhaustive()
    }
}

impl FaultTolerantCache {
    /// Wraps a cache, reporting absorbed failures through the notifier.
    #[must_use]
    pub fn new(inner: Arc<dyn Cache>, notifier: Arc<dyn Notify>) -> Self {
        Self { inner, notifier }
    }

    fn absorb(&self, key: &str, action: CacheAction, error: &super::Error) {
        self.notifier.notify(Event::CacheFailure {
            key: Some(key.to_owned()),
            action,
            error: error.to_string(),
        });
    }
}

impl Cache for FaultTolerantCache {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.inner.read(key) {
            Ok(value) => Ok(value),
            Err(error) => {
                self.absorb(key, CacheAction::Read, &error);
                Ok(None)
            }
        }
    }

    fn write(&self, key: &str, value: &[u8], expires_in: Option<Duration>) -> Result<()> {
        match self.inner.write(key, value, expires_in) {
            Ok(()) => Ok(()),
            Err(error) => {
                self.absorb(key, CacheAction::Write, &error);
                Ok(())
            }
        }
    }

    fn is_fault_tolerant(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventName, Listener, MemoryListener, Notifier};

    #[derive(Debug)]
    struct BrokenCache;

    impl Cache for BrokenCache {
        fn read(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Err(super::super::Error::backend("read failed"))
        }

        fn write(&self, _key: &str, _value: &[u8], _expires_in: Option<Duration>) -> Result<()> {
            Err(super::super::Error::backend("write failed"))
        }

        fn is_fault_tolerant(&self) -> bool {
            false
        }
    }

    fn wrapped() -> (FaultTolerantCache, Arc<MemoryListener>) {
        let listener = Arc::new(MemoryListener::new());
        let notifier: Arc<dyn Notify> = Arc::new(Notifier::new(vec![Arc::clone(&listener) as Arc<dyn Listener>]));
        (FaultTolerantCache::new(Arc::new(BrokenCache), notifier), listener)
    }

    #[test]
    fn failed_reads_become_misses() {
        let (cache, listener) = wrapped();

        assert_eq!(cache.read("k").unwrap(), None);
        assert_eq!(listener.count(EventName::CacheFailure), 1);
    }

    #[test]
    fn failed_writes_are_dropped() {
        let (cache, listener) = wrapped();

        cache.write("k", b"v", None).unwrap();
        assert_eq!(listener.count(EventName::CacheFailure), 1);

        let events = listener.events();
        assert!(matches!(
            &events[0],
            Event::CacheFailure {
                action: CacheAction::Write,
                ..
            }
        ));
    }

    #[test]
    fn advertises_fault_tolerance() {
        let (cache, _listener) = wrapped();
        assert!(cache.is_fault_tolerant());
    }
}
