// Copyright (c) Microsoft Corporation.

//! Mock storage implementation for testing.
//!
//! This module provides [`MockStore`], a fully functional in-memory
//! implementation of the [`Store`] contract that records every operation and
//! supports per-operation failure injection for exercising error paths in
//! wrappers and the circuit runner.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tick::Clock;

use crate::{
    CircuitProfile, Error, Lock, OptionsMap, RawState, Result, SampleEntry, State, Status, Store, StoreAction,
    wall_seconds,
};

type FailPredicate = Box<dyn Fn(StoreAction) -> bool + Send + Sync>;

#[derive(Debug, Default)]
struct MockCircuit {
    raw: RawState,
    entries: VecDeque<SampleEntry>,
    options: Option<OptionsMap>,
}

/// A configurable mock store for testing.
///
/// The store keeps real per-circuit state under a single mutex (which makes
/// every operation trivially linearizable) and can be configured to fail
/// selected operations on demand. All operations are recorded for later
/// verification.
///
/// # Examples
///
/// ```
/// use fusebox_store::testing::MockStore;
/// use fusebox_store::{CircuitProfile, Store, StoreAction};
/// use tick::Clock;
///
/// let store = MockStore::new(&Clock::new_frozen());
/// let circuit = CircuitProfile::new("api");
///
/// assert!(store.open(&circuit, 100.0).unwrap());
/// store.fail_on(StoreAction::Close);
/// assert!(store.close(&circuit).is_err());
///
/// assert_eq!(
///     store.operations(),
///     vec![(StoreAction::Open, Some("api".to_string())), (StoreAction::Close, Some("api".to_string()))],
/// );
/// ```
pub struct MockStore {
    clock: Clock,
    circuits: Mutex<HashMap<String, MockCircuit>>,
    ops: Mutex<Vec<(StoreAction, Option<String>)>>,
    fail_when: Mutex<Option<FailPredicate>>,
    fault_tolerant: bool,
}

impl std::fmt::Debug for MockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStore")
            .field("fault_tolerant", &self.fault_tolerant)
            .finish_non_exhaustive()
    }
}

impl MockStore {
    /// Creates a mock store that advertises itself as not fault tolerant,
    /// which is how the wrappers under test see a networked backend.
    #[must_use]
    pub fn new(clock: &Clock) -> Self {
        Self {
            clock: clock.clone(),
            circuits: Mutex::new(HashMap::new()),
            ops: Mutex::new(Vec::new()),
            fail_when: Mutex::new(None),
            fault_tolerant: false,
        }
    }

    /// Creates a mock store that advertises itself as fault tolerant.
    #[must_use]
    pub fn fault_tolerant(clock: &Clock) -> Self {
        Self {
            fault_tolerant: true,
            ..Self::new(clock)
        }
    }

    /// Fails every operation for which the predicate returns true.
    pub fn fail_when(&self, predicate: impl Fn(StoreAction) -> bool + Send + Sync + 'static) {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Fails every occurrence of one operation.
    pub fn fail_on(&self, action: StoreAction) {
        self.fail_when(move |candidate| candidate == action);
    }

    /// Fails every operation.
    pub fn fail_always(&self) {
        self.fail_when(|_| true);
    }

    /// Stops injecting failures.
    pub fn recover(&self) {
        *self.fail_when.lock() = None;
    }

    /// Returns the recorded operations in call order.
    #[must_use]
    pub fn operations(&self) -> Vec<(StoreAction, Option<String>)> {
        self.ops.lock().clone()
    }

    /// Returns how many times the given operation was called.
    #[must_use]
    pub fn calls(&self, action: StoreAction) -> usize {
        self.ops.lock().iter().filter(|(candidate, _)| *candidate == action).count()
    }

    fn observe(&self, action: StoreAction, circuit: Option<&CircuitProfile>) -> Result<()> {
        self.ops.lock().push((action, circuit.map(|c| c.name.clone())));

        let should_fail = self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(action));
        if should_fail {
            return Err(Error::backend(format!("injected failure for {action}")));
        }

        Ok(())
    }

    fn with_circuit<T>(&self, circuit: &CircuitProfile, f: impl FnOnce(&mut MockCircuit) -> T) -> T {
        let mut circuits = self.circuits.lock();
        f(circuits.entry(circuit.name.clone()).or_default())
    }
}

impl Store for MockStore {
    fn get_options(&self, circuit: &CircuitProfile) -> Result<Option<OptionsMap>> {
        self.observe(StoreAction::GetOptions, Some(circuit))?;
        Ok(self.with_circuit(circuit, |state| state.options.clone()))
    }

    fn set_options(&self, circuit: &CircuitProfile, options: &OptionsMap) -> Result<()> {
        self.observe(StoreAction::SetOptions, Some(circuit))?;
        self.with_circuit(circuit, |state| state.options = Some(options.clone()));
        Ok(())
    }

    fn entry(
        &self,
        circuit: &CircuitProfile,
        time: f64,
        success: bool,
        snapshot: Option<&Status>,
    ) -> Result<Option<Status>> {
        self.observe(StoreAction::Entry, Some(circuit))?;

        Ok(self.with_circuit(circuit, |state| {
            state.entries.push_back(SampleEntry::new(time, success));
            while state.entries.len() > circuit.max_sample_size {
                state.entries.pop_front();
            }

            snapshot.map(|_| {
                let entries: Vec<_> = state.entries.iter().copied().collect();
                Status::compute(circuit, state.raw, &entries, time)
            })
        }))
    }

    fn open(&self, circuit: &CircuitProfile, opened_at: f64) -> Result<bool> {
        self.observe(StoreAction::Open, Some(circuit))?;

        Ok(self.with_circuit(circuit, |state| {
            if state.raw.state == State::Closed {
                state.raw.state = State::Open;
                state.raw.opened_at = Some(opened_at);
                true
            } else {
                false
            }
        }))
    }

    fn reopen(&self, circuit: &CircuitProfile, opened_at: f64, previous_opened_at: f64) -> Result<bool> {
        self.observe(StoreAction::Reopen, Some(circuit))?;

        Ok(self.with_circuit(circuit, |state| {
            if state.raw.state == State::Open && state.raw.opened_at == Some(previous_opened_at) {
                state.raw.opened_at = Some(opened_at);
                true
            } else {
                false
            }
        }))
    }

    fn close(&self, circuit: &CircuitProfile) -> Result<bool> {
        self.observe(StoreAction::Close, Some(circuit))?;

        Ok(self.with_circuit(circuit, |state| {
            if state.raw.state == State::Open {
                state.raw.state = State::Closed;
                state.raw.opened_at = None;
                state.entries.clear();
                true
            } else {
                false
            }
        }))
    }

    fn lock(&self, circuit: &CircuitProfile, lock: Lock) -> Result<()> {
        self.observe(StoreAction::Lock, Some(circuit))?;
        self.with_circuit(circuit, |state| state.raw.lock = Some(lock));
        Ok(())
    }

    fn unlock(&self, circuit: &CircuitProfile) -> Result<()> {
        self.observe(StoreAction::Unlock, Some(circuit))?;
        self.with_circuit(circuit, |state| state.raw.lock = None);
        Ok(())
    }

    fn reset(&self, circuit: &CircuitProfile) -> Result<()> {
        self.observe(StoreAction::Reset, Some(circuit))?;
        self.circuits.lock().remove(&circuit.name);
        Ok(())
    }

    fn status(&self, circuit: &CircuitProfile) -> Result<Status> {
        self.observe(StoreAction::Status, Some(circuit))?;

        let now = wall_seconds(&self.clock);
        Ok(self.with_circuit(circuit, |state| {
            let entries: Vec<_> = state.entries.iter().copied().collect();
            Status::compute(circuit, state.raw, &entries, now)
        }))
    }

    fn history(&self, circuit: &CircuitProfile) -> Result<Vec<SampleEntry>> {
        self.observe(StoreAction::History, Some(circuit))?;
        Ok(self.with_circuit(circuit, |state| state.entries.iter().copied().collect()))
    }

    fn list(&self) -> Result<Vec<String>> {
        self.observe(StoreAction::List, None)?;
        let mut names: Vec<_> = self.circuits.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn is_fault_tolerant(&self) -> bool {
        self.fault_tolerant
    }
}
