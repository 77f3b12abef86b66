// Copyright (c) Microsoft Corporation.

use std::sync::Arc;
use std::time::Duration;

use tick::Clock;

use super::{Cache, Result};
use crate::circuit::Circuit;
use crate::events::{EventName, FilteredNotifier, Notify};

/// Runs every cache operation under an internal guard circuit.
///
/// When a cache backend goes sick, every protected call would otherwise pay a
/// full round-trip (or timeout) against it. The guard circuit observes those
/// failures and short-circuits further cache traffic until the backend
/// recovers.
///
/// The guard circuit always uses its own in-process storage — guarding the
/// cache with a circuit that reads state from a remote backend would
/// reintroduce the dependency this wrapper exists to bound — and its notifier
/// drops `circuit_success` events to keep the guard from flooding listeners.
pub struct CircuitGuardedCache {
    inner: Arc<dyn Cache>,
    circuit: Circuit,
}

impl std::fmt::Debug for CircuitGuardedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitGuardedCache").field("inner", &self.inner).finish_non_exhaustive()
    }
}

impl CircuitGuardedCache {
    /// Wraps a cache with a guard circuit named `fusebox.cache`.
    #[must_use]
    pub fn new(inner: Arc<dyn Cache>, clock: &Clock, notifier: &Arc<dyn Notify>) -> Self {
        Self::with_circuit_name(inner, clock, notifier, "fusebox.cache")
    }

    /// Wraps a cache with a named guard circuit, for deployments running
    /// more than one guarded cache.
    #[must_use]
    pub fn with_circuit_name(
        inner: Arc<dyn Cache>,
        clock: &Clock,
        notifier: &Arc<dyn Notify>,
        circuit_name: impl Into<String>,
    ) -> Self {
        let filtered: Arc<dyn Notify> = Arc::new(FilteredNotifier::excluding(
            Arc::clone(notifier),
            [EventName::CircuitSuccess],
        ));

        let circuit = Circuit::builder(circuit_name, clock)
            .storage(Arc::new(fusebox_memory::MemoryStore::new(clock)))
            .notifier(filtered)
            .build();

        Self { inner, circuit }
    }

    fn map_error(error: crate::Error) -> super::Error {
        match error {
            crate::Error::Open { circuit } => {
                super::Error::backend(format!("cache guard circuit '{circuit}' is open"))
            }
            crate::Error::Failure { source, .. } | crate::Error::Tripped { source, .. } | crate::Error::Passthrough(source) => {
                source.downcast::<super::Error>().map_or_else(super::Error::backend, |boxed| *boxed)
            }
        }
    }
}

impl Cache for CircuitGuardedCache {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.circuit.run(|| self.inner.read(key)).map_err(Self::map_error)
    }

    fn write(&self, key: &str, value: &[u8], expires_in: Option<Duration>) -> Result<()> {
        self.circuit.run(|| self.inner.write(key, value, expires_in)).map_err(Self::map_error)
    }

    fn is_fault_tolerant(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::SystemTime;

    use tick::ClockControl;

    use super::*;
    use crate::events::{EventName, Listener, MemoryListener, Notifier};

    #[derive(Debug, Default)]
    struct FlakyCache {
        broken: AtomicBool,
    }

    impl Cache for FlakyCache {
        fn read(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            if self.broken.load(Ordering::Relaxed) {
                Err(super::super::Error::backend("cache read failed"))
            } else {
                Ok(Some(b"v".to_vec()))
            }
        }

        fn write(&self, _key: &str, _value: &[u8], _expires_in: Option<Duration>) -> Result<()> {
            Ok(())
        }

        fn is_fault_tolerant(&self) -> bool {
            false
        }
    }

    fn guarded() -> (CircuitGuardedCache, Arc<FlakyCache>, Arc<MemoryListener>, ClockControl) {
        let control = ClockControl::new_at(SystemTime::UNIX_EPOCH + Duration::from_secs(1000));
        let clock = control.to_clock();
        let flaky = Arc::new(FlakyCache::default());
        let listener = Arc::new(MemoryListener::new());
        let notifier: Arc<dyn Notify> = Arc::new(Notifier::new(vec![Arc::clone(&listener) as Arc<dyn Listener>]));

        let cache = CircuitGuardedCache::new(Arc::clone(&flaky) as Arc<dyn Cache>, &clock, &notifier);
        (cache, flaky, listener, control)
    }

    #[test]
    fn passes_reads_through_when_healthy() {
        let (cache, _flaky, listener, _control) = guarded();

        assert_eq!(cache.read("k").unwrap(), Some(b"v".to_vec()));
        // Success chatter from the guard circuit is filtered out.
        assert_eq!(listener.count(EventName::CircuitSuccess), 0);
    }

    #[test]
    fn repeated_failures_short_circuit_the_backend() {
        let (cache, flaky, listener, _control) = guarded();
        flaky.broken.store(true, Ordering::Relaxed);

        for _ in 0..3 {
            assert!(cache.read("k").is_err());
        }
        assert_eq!(listener.count(EventName::CircuitOpened), 1);

        // The guard is now open: the backend is no longer consulted.
        flaky.broken.store(false, Ordering::Relaxed);
        assert!(cache.read("k").is_err());
    }

    #[test]
    fn guard_recovers_after_cool_down() {
        let (cache, flaky, _listener, control) = guarded();
        flaky.broken.store(true, Ordering::Relaxed);

        for _ in 0..3 {
            assert!(cache.read("k").is_err());
        }

        flaky.broken.store(false, Ordering::Relaxed);
        control.advance(Duration::from_secs(301));

        assert_eq!(cache.read("k").unwrap(), Some(b"v".to_vec()));
    }
}
