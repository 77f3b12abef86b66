// Copyright (c) Microsoft Corporation.

use std::sync::Arc;

use tick::Clock;

use fusebox_store::{
    CircuitProfile, Error, Lock, OptionsMap, Result, SampleEntry, Status, Store, StoreAction, wall_seconds,
};

use crate::events::{Event, Notify};

/// Absorbs failures of a wrapped store on the execution path.
///
/// Normal-path operations never fail through this wrapper: each absorbed
/// failure is reported as a `storage_failure` event and answered with a
/// conservative value — a closed stub status, "no transition happened", or
/// an empty collection. A circuit running on a broken backend therefore
/// degrades to an always-closed circuit instead of taking its dependency
/// down with it.
///
/// Administrative operations (locks, reset, options) are the exception:
/// their failures are rethrown, because an operator whose lock silently did
/// not take effect is worse off than one who saw the error.
pub struct FaultTolerantStore {
    inner: Arc<dyn Store>,
    notifier: Arc<dyn Notify>,
    clock: Clock,
}

impl std::fmt::Debug for FaultTolerantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultTolerantStore").field("inner", &self.inner).finish_non_exhaustive()
    }
}

impl FaultTolerantStore {
    /// Wraps a store, reporting absorbed failures through the notifier.
    #[must_use]
    pub fn new(inner: Arc<dyn Store>, notifier: Arc<dyn Notify>, clock: &Clock) -> Self {
        Self {
            inner,
            notifier,
            clock: clock.clone(),
        }
    }

    fn absorb<T>(&self, circuit: Option<&CircuitProfile>, action: StoreAction, fallback: T, error: &Error) -> T {
        self.notifier.notify(Event::StorageFailure {
            circuit: circuit.map(|profile| profile.name.clone()),
            action,
            error: error.to_string(),
        });

        fallback
    }
}

impl Store for FaultTolerantStore {
    fn get_options(&self, circuit: &CircuitProfile) -> Result<Option<OptionsMap>> {
        self.inner.get_options(circuit)
    }

    fn set_options(&self, circuit: &CircuitProfile, options: &OptionsMap) -> Result<()> {
        self.inner.set_options(circuit, options)
    }

    fn entry(
        &self,
        circuit: &CircuitProfile,
        time: f64,
        success: bool,
        snapshot: Option<&Status>,
    ) -> Result<Option<Status>> {
        match self.inner.entry(circuit, time, success, snapshot) {
            Ok(status) => Ok(status),
            Err(error) => {
                let stub = snapshot.map(|_| Status::stub(circuit, time));
                Ok(self.absorb(Some(circuit), StoreAction::Entry, stub, &error))
            }
        }
    }

    fn open(&self, circuit: &CircuitProfile, opened_at: f64) -> Result<bool> {
        match self.inner.open(circuit, opened_at) {
            Ok(transitioned) => Ok(transitioned),
            Err(error) => Ok(self.absorb(Some(circuit), StoreAction::Open, false, &error)),
        }
    }

    fn reopen(&self, circuit: &CircuitProfile, opened_at: f64, previous_opened_at: f64) -> Result<bool> {
        match self.inner.reopen(circuit, opened_at, previous_opened_at) {
            Ok(updated) => Ok(updated),
            Err(error) => Ok(self.absorb(Some(circuit), StoreAction::Reopen, false, &error)),
        }
    }

    fn close(&self, circuit: &CircuitProfile) -> Result<bool> {
        match self.inner.close(circuit) {
            Ok(transitioned) => Ok(transitioned),
            Err(error) => Ok(self.absorb(Some(circuit), StoreAction::Close, false, &error)),
        }
    }

    fn lock(&self, circuit: &CircuitProfile, lock: Lock) -> Result<()> {
        self.inner.lock(circuit, lock)
    }

    fn unlock(&self, circuit: &CircuitProfile) -> Result<()> {
        self.inner.unlock(circuit)
    }

    fn reset(&self, circuit: &CircuitProfile) -> Result<()> {
        self.inner.reset(circuit)
    }

    fn status(&self, circuit: &CircuitProfile) -> Result<Status> {
        match self.inner.status(circuit) {
            Ok(status) => Ok(status),
            Err(error) => {
                let stub = Status::stub(circuit, wall_seconds(&self.clock));
                Ok(self.absorb(Some(circuit), StoreAction::Status, stub, &error))
            }
        }
    }

    fn history(&self, circuit: &CircuitProfile) -> Result<Vec<SampleEntry>> {
        match self.inner.history(circuit) {
            Ok(history) => Ok(history),
            Err(error) => Ok(self.absorb(Some(circuit), StoreAction::History, Vec::new(), &error)),
        }
    }

    fn list(&self) -> Result<Vec<String>> {
        match self.inner.list() {
            Ok(names) => Ok(names),
            Err(error) => Ok(self.absorb(None, StoreAction::List, Vec::new(), &error)),
        }
    }

    fn is_fault_tolerant(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use fusebox_store::testing::MockStore;

    use super::*;
    use crate::events::{EventName, Listener, MemoryListener, Notifier};

    fn wrapped() -> (FaultTolerantStore, Arc<MockStore>, Arc<MemoryListener>) {
        let clock = Clock::new_frozen();
        let mock = Arc::new(MockStore::new(&clock));
        let listener = Arc::new(MemoryListener::new());
        let notifier: Arc<dyn Notify> = Arc::new(Notifier::new(vec![Arc::clone(&listener) as Arc<dyn Listener>]));

        let store = FaultTolerantStore::new(Arc::clone(&mock) as Arc<dyn Store>, notifier, &clock);
        (store, mock, listener)
    }

    #[test]
    fn passes_successes_through() {
        let (store, _mock, listener) = wrapped();
        let circuit = CircuitProfile::new("api");

        assert!(store.open(&circuit, 100.0).unwrap());
        assert_eq!(store.status(&circuit).unwrap().opened_at, Some(100.0));
        assert_eq!(listener.count(EventName::StorageFailure), 0);
    }

    #[test]
    fn normal_path_failures_become_stubs() {
        let (store, mock, listener) = wrapped();
        let circuit = CircuitProfile::new("api");
        mock.fail_always();

        let status = store.status(&circuit).unwrap();
        assert!(status.stub);
        assert!(status.can_run());

        assert!(!store.open(&circuit, 100.0).unwrap());
        assert!(!store.reopen(&circuit, 100.0, 99.0).unwrap());
        assert!(!store.close(&circuit).unwrap());
        assert!(store.history(&circuit).unwrap().is_empty());
        assert!(store.list().unwrap().is_empty());

        let snapshot = Status::stub(&circuit, 100.0);
        let updated = store.entry(&circuit, 100.0, false, Some(&snapshot)).unwrap().unwrap();
        assert!(updated.stub);

        assert_eq!(listener.count(EventName::StorageFailure), 7);
    }

    #[test]
    fn admin_failures_are_rethrown() {
        let (store, mock, listener) = wrapped();
        let circuit = CircuitProfile::new("api");
        mock.fail_always();

        assert!(store.lock(&circuit, Lock::Open).is_err());
        assert!(store.unlock(&circuit).is_err());
        assert!(store.reset(&circuit).is_err());
        assert!(store.get_options(&circuit).is_err());
        assert!(store.set_options(&circuit, &OptionsMap::new()).is_err());

        // Rethrown failures are the caller's to handle; no events.
        assert_eq!(listener.count(EventName::StorageFailure), 0);
    }

    #[test]
    fn advertises_fault_tolerance() {
        let (store, _mock, _listener) = wrapped();
        assert!(store.is_fault_tolerant());
    }
}
