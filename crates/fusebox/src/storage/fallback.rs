// Copyright (c) Microsoft Corporation.

use std::sync::Arc;

use fusebox_store::{
    CircuitProfile, Error, Lock, OptionsMap, Result, SampleEntry, Status, Store, StoreAction,
};

use crate::events::{Event, Notify};

/// An ordered list of storage backends tried in sequence.
///
/// Operations that one authoritative backend can answer — reads, sample
/// writes, and state transitions — try the backends in order and return the
/// first success; each failed attempt is reported as a `storage_failure`
/// event. Operations that must stay consistent across replicas (options,
/// locks, reset) fan out to every backend instead.
///
/// When every backend fails, the aggregate surfaces as an all-failed error;
/// a fan-out where only some backends failed surfaces as a partial failure.
pub struct FallbackChain {
    backends: Vec<Arc<dyn Store>>,
    notifier: Arc<dyn Notify>,
}

impl std::fmt::Debug for FallbackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackChain").field("backends", &self.backends.len()).finish_non_exhaustive()
    }
}

impl FallbackChain {
    /// Creates a chain over the given backends, tried in order.
    #[must_use]
    pub fn new(backends: Vec<Arc<dyn Store>>, notifier: Arc<dyn Notify>) -> Self {
        Self { backends, notifier }
    }

    fn report(&self, circuit: Option<&CircuitProfile>, action: StoreAction, error: &Error) {
        self.notifier.notify(Event::StorageFailure {
            circuit: circuit.map(|profile| profile.name.clone()),
            action,
            error: error.to_string(),
        });
    }

    /// Tries backends in order, returning the first success.
    fn first_success<T>(
        &self,
        circuit: Option<&CircuitProfile>,
        action: StoreAction,
        operation: impl Fn(&dyn Store) -> Result<T>,
    ) -> Result<T> {
        let mut failures = Vec::new();

        for backend in &self.backends {
            match operation(backend.as_ref()) {
                Ok(value) => return Ok(value),
                Err(error) => {
                    self.report(circuit, action, &error);
                    failures.push(error);
                }
            }
        }

        Err(Error::all_failed(failures))
    }

    /// Fans an operation out to every backend.
    fn fan_out(
        &self,
        circuit: Option<&CircuitProfile>,
        action: StoreAction,
        operation: impl Fn(&dyn Store) -> Result<()>,
    ) -> Result<()> {
        let mut failures = Vec::new();

        for backend in &self.backends {
            if let Err(error) = operation(backend.as_ref()) {
                self.report(circuit, action, &error);
                failures.push(error);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else if failures.len() == self.backends.len() {
            Err(Error::all_failed(failures))
        } else {
            Err(Error::partial_failure(failures))
        }
    }
}

impl Store for FallbackChain {
    fn get_options(&self, circuit: &CircuitProfile) -> Result<Option<OptionsMap>> {
        self.first_success(Some(circuit), StoreAction::GetOptions, |backend| backend.get_options(circuit))
    }

    fn set_options(&self, circuit: &CircuitProfile, options: &OptionsMap) -> Result<()> {
        self.fan_out(Some(circuit), StoreAction::SetOptions, |backend| {
            backend.set_options(circuit, options)
        })
    }

    fn entry(
        &self,
        circuit: &CircuitProfile,
        time: f64,
        success: bool,
        snapshot: Option<&Status>,
    ) -> Result<Option<Status>> {
        self.first_success(Some(circuit), StoreAction::Entry, |backend| {
            backend.entry(circuit, time, success, snapshot)
        })
    }

    fn open(&self, circuit: &CircuitProfile, opened_at: f64) -> Result<bool> {
        self.first_success(Some(circuit), StoreAction::Open, |backend| backend.open(circuit, opened_at))
    }

    fn reopen(&self, circuit: &CircuitProfile, opened_at: f64, previous_opened_at: f64) -> Result<bool> {
        self.first_success(Some(circuit), StoreAction::Reopen, |backend| {
            backend.reopen(circuit, opened_at, previous_opened_at)
        })
    }

    fn close(&self, circuit: &CircuitProfile) -> Result<bool> {
        self.first_success(Some(circuit), StoreAction::Close, |backend| backend.close(circuit))
    }

    fn lock(&self, circuit: &CircuitProfile, lock: Lock) -> Result<()> {
        self.fan_out(Some(circuit), StoreAction::Lock, |backend| backend.lock(circuit, lock))
    }

    fn unlock(&self, circuit: &CircuitProfile) -> Result<()> {
        self.fan_out(Some(circuit), StoreAction::Unlock, |backend| backend.unlock(circuit))
    }

    fn reset(&self, circuit: &CircuitProfile) -> Result<()> {
        self.fan_out(Some(circuit), StoreAction::Reset, |backend| backend.reset(circuit))
    }

    fn status(&self, circuit: &CircuitProfile) -> Result<Status> {
        self.first_success(Some(circuit), StoreAction::Status, |backend| backend.status(circuit))
    }

    fn history(&self, circuit: &CircuitProfile) -> Result<Vec<SampleEntry>> {
        self.first_success(Some(circuit), StoreAction::History, |backend| backend.history(circuit))
    }

    fn list(&self) -> Result<Vec<String>> {
        self.first_success(None, StoreAction::List, |backend| backend.list())
    }

    fn is_fault_tolerant(&self) -> bool {
        self.backends.iter().all(|backend| backend.is_fault_tolerant())
    }
}
