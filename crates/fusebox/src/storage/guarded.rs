// Copyright (c) Microsoft Corporation.

use std::sync::Arc;

use tick::Clock;

use fusebox_store::{CircuitProfile, Error, Lock, OptionsMap, Result, SampleEntry, Status, Store};

use crate::circuit::Circuit;
use crate::events::{EventName, FilteredNotifier, Notify};

/// Runs every storage operation under an internal guard circuit.
///
/// Without this wrapper, a circuit whose backend is down pays a full
/// round-trip (or timeout) against that backend on every protected call —
/// the cascading failure the library exists to prevent, one layer down. The
/// guard circuit observes storage errors and short-circuits storage traffic
/// while the backend is sick; the surrounding
/// [`FaultTolerantStore`][super::FaultTolerantStore] turns the resulting
/// fast rejections into stub answers.
///
/// The guard circuit always runs on its own in-process storage (anything
/// else would recurse into the backend being guarded) and drops its
/// `circuit_success` events so healthy storage does not flood listeners.
pub struct CircuitGuardedStore {
    inner: Arc<dyn Store>,
    circuit: Circuit,
}

impl std::fmt::Debug for CircuitGuardedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitGuardedStore").field("inner", &self.inner).finish_non_exhaustive()
    }
}

impl CircuitGuardedStore {
    /// Wraps a store with a guard circuit named `fusebox.storage`.
    #[must_use]
    pub fn new(inner: Arc<dyn Store>, clock: &Clock, notifier: &Arc<dyn Notify>) -> Self {
        Self::with_circuit_name(inner, clock, notifier, "fusebox.storage")
    }

    /// Wraps a store with a named guard circuit, for deployments running
    /// more than one guarded backend.
    #[must_use]
    pub fn with_circuit_name(
        inner: Arc<dyn Store>,
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

    fn guard<T>(&self, operation: impl FnOnce() -> Result<T>) -> Result<T> {
        self.circuit.run(operation).map_err(|error| match error {
            crate::Error::Open { circuit } => Error::unavailable(format!("storage guard circuit '{circuit}' is open")),
            crate::Error::Failure { source, .. }
            | crate::Error::Tripped { source, .. }
            | crate::Error::Passthrough(source) => source.downcast::<Error>().map_or_else(Error::backend, |boxed| *boxed),
        })
    }
}

impl Store for CircuitGuardedStore {
    fn get_options(&self, circuit: &CircuitProfile) -> Result<Option<OptionsMap>> {
        self.guard(|| self.inner.get_options(circuit))
    }

    fn set_options(&self, circuit: &CircuitProfile, options: &OptionsMap) -> Result<()> {
        self.guard(|| self.inner.set_options(circuit, options))
    }

    fn entry(
        &self,
        circuit: &CircuitProfile,
        time: f64,
        success: bool,
        snapshot: Option<&Status>,
    ) -> Result<Option<Status>> {
        self.guard(|| self.inner.entry(circuit, time, success, snapshot))
    }

    fn open(&self, circuit: &CircuitProfile, opened_at: f64) -> Result<bool> {
        self.guard(|| self.inner.open(circuit, opened_at))
    }

    fn reopen(&self, circuit: &CircuitProfile, opened_at: f64, previous_opened_at: f64) -> Result<bool> {
        self.guard(|| self.inner.reopen(circuit, opened_at, previous_opened_at))
    }

    fn close(&self, circuit: &CircuitProfile) -> Result<bool> {
        self.guard(|| self.inner.close(circuit))
    }

    fn lock(&self, circuit: &CircuitProfile, lock: Lock) -> Result<()> {
        self.guard(|| self.inner.lock(circuit, lock))
    }

    fn unlock(&self, circuit: &CircuitProfile) -> Result<()> {
        self.guard(|| self.inner.unlock(circuit))
    }

    fn reset(&self, circuit: &CircuitProfile) -> Result<()> {
        self.guard(|| self.inner.reset(circuit))
    }

    fn status(&self, circuit: &CircuitProfile) -> Result<Status> {
        self.guard(|| self.inner.status(circuit))
    }

    fn history(&self, circuit: &CircuitProfile) -> Result<Vec<SampleEntry>> {
        self.guard(|| self.inner.history(circuit))
    }

    fn list(&self) -> Result<Vec<String>> {
        self.guard(|| self.inner.list())
    }

    fn is_fault_tolerant(&self) -> bool {
        false
    }
}
