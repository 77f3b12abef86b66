// Copyright (c) Microsoft Corporation.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use tick::Clock;

use fusebox_store::{
    CircuitProfile, Lock, OptionsMap, RawState, Result, SampleEntry, State, Status, Store, wall_seconds,
};

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;

// Bit pattern standing in for "no opened_at". It decodes to a NaN, which no
// real timestamp produces, so it can never collide with a stored value.
const OPENED_AT_NONE: u64 = u64::MAX;

#[derive(Debug, Default)]
struct CircuitData {
    state: AtomicU8,
    opened_at: AtomicU64,
    entries: Mutex<VecDeque<SampleEntry>>,
    lock: Mutex<Option<Lock>>,
    options: Mutex<Option<OptionsMap>>,
}

impl CircuitData {
    fn new() -> Self {
        Self {
            opened_at: AtomicU64::new(OPENED_AT_NONE),
            ..Self::default()
        }
    }

    fn load_state(&self) -> State {
        if self.state.load(Ordering::Acquire) == STATE_OPEN {
            State::Open
        } else {
            State::Closed
        }
    }

    fn load_opened_at(&self) -> Option<f64> {
        let bits = self.opened_at.load(Ordering::Acquire);
        (bits != OPENED_AT_NONE).then(|| f64::from_bits(bits))
    }

    fn raw(&self) -> RawState {
        RawState {
            state: self.load_state(),
            opened_at: self.load_opened_at(),
            lock: *self.lock.lock(),
        }
    }
}

/// Process-local storage backend.
///
/// Each circuit owns one record of atomics plus a mutex-guarded sample ring;
/// records for distinct circuits never contend. See the crate docs for the
/// concurrency model.
#[derive(Debug)]
pub struct MemoryStore {
    clock: Clock,
    circuits: DashMap<String, Arc<CircuitData>>,
}

impl MemoryStore {
    /// Creates an empty store reading time from the given clock.
    #[must_use]
    pub fn new(clock: &Clock) -> Self {
        Self {
            clock: clock.clone(),
            circuits: DashMap::new(),
        }
    }

    fn circuit(&self, circuit: &CircuitProfile) -> Arc<CircuitData> {
        Arc::clone(
            &self
                .circuits
                .entry(circuit.name.clone())
                .or_insert_with(|| Arc::new(CircuitData::new())),
        )
    }
}

impl Store for MemoryStore {
    fn get_options(&self, circuit: &CircuitProfile) -> Result<Option<OptionsMap>> {
        Ok(self.circuit(circuit).options.lock().clone())
    }

    fn set_options(&self, circuit: &CircuitProfile, options: &OptionsMap) -> Result<()> {
        *self.circuit(circuit).options.lock() = Some(options.clone());
        Ok(())
    }

    fn entry(
        &self,
        circuit: &CircuitProfile,
        time: f64,
        success: bool,
        snapshot: Option<&Status>,
    ) -> Result<Option<Status>> {
        let data = self.circuit(circuit);

        let mut entries = data.entries.lock();
        entries.push_back(SampleEntry::new(time, success));
        while entries.len() > circuit.max_sample_size {
            entries.pop_front();
        }

        Ok(snapshot.map(|_| {
            let sample: Vec<_> = entries.iter().copied().collect();
            drop(entries);
            Status::compute(circuit, data.raw(), &sample, time)
        }))
    }

    fn open(&self, circuit: &CircuitProfile, opened_at: f64) -> Result<bool> {
        let data = self.circuit(circuit);

        let transitioned = data
            .state
            .compare_exchange(STATE_CLOSED, STATE_OPEN, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if transitioned {
            data.opened_at.store(opened_at.to_bits(), Ordering::Release);
        }

        Ok(transitioned)
    }

    fn reopen(&self, circuit: &CircuitProfile, opened_at: f64, previous_opened_at: f64) -> Result<bool> {
        let data = self.circuit(circuit);

        let updated = data
            .opened_at
            .compare_exchange(
                previous_opened_at.to_bits(),
                opened_at.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        Ok(updated)
    }

    fn close(&self, circuit: &CircuitProfile) -> Result<bool> {
        let data = self.circuit(circuit);

        let transitioned = data
            .state
            .compare_exchange(STATE_OPEN, STATE_CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if transitioned {
            data.entries.lock().clear();
            data.opened_at.store(OPENED_AT_NONE, Ordering::Release);
        }

        Ok(transitioned)
    }

    fn lock(&self, circuit: &CircuitProfile, lock: Lock) -> Result<()> {
        *self.circuit(circuit).lock.lock() = Some(lock);
        Ok(())
    }

    fn unlock(&self, circuit: &CircuitProfile) -> Result<()> {
        *self.circuit(circuit).lock.lock() = None;
        Ok(())
    }

    fn reset(&self, circuit: &CircuitProfile) -> Result<()> {
        self.circuits.remove(&circuit.name);
        Ok(())
    }

    fn status(&self, circuit: &CircuitProfile) -> Result<Status> {
        let data = self.circuit(circuit);
        let now = wall_seconds(&self.clock);

        let sample: Vec<_> = data.entries.lock().iter().copied().collect();
        Ok(Status::compute(circuit, data.raw(), &sample, now))
    }

    fn history(&self, circuit: &CircuitProfile) -> Result<Vec<SampleEntry>> {
        Ok(self.circuit(circuit).entries.lock().iter().copied().collect())
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names: Vec<_> = self.circuits.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    fn is_fault_tolerant(&self) -> bool {
        // This backend has no failure modes of its own; there is no network
        // or disk underneath it.
        true
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::float_cmp, reason = "Test")]

    use std::time::{Duration, SystemTime};

    use tick::ClockControl;

    use super::*;

    fn frozen_store() -> MemoryStore {
        MemoryStore::new(&Clock::new_frozen_at(SystemTime::UNIX_EPOCH + Duration::from_secs(1000)))
    }

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(MemoryStore: Send, Sync);
    }

    #[test]
    fn starts_closed_with_empty_history() {
        let store = frozen_store();
        let circuit = CircuitProfile::new("api");

        let status = store.status(&circuit).unwrap();
        assert!(status.closed());
        assert!(status.can_run());
        assert!(store.history(&circuit).unwrap().is_empty());
    }

    #[test]
    fn open_reports_the_transition_exactly_once() {
        let store = frozen_store();
        let circuit = CircuitProfile::new("api");

        assert!(store.open(&circuit, 1000.0).unwrap());
        assert!(!store.open(&circuit, 1001.0).unwrap());

        let status = store.status(&circuit).unwrap();
        assert_eq!(status.state, State::Open);
        assert_eq!(status.opened_at, Some(1000.0));
    }

    #[test]
    fn concurrent_open_has_one_winner() {
        let store = frozen_store();
        let circuit = CircuitProfile::new("api");

        let wins = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..32)
                .map(|i| {
                    let store = &store;
                    let circuit = &circuit;
                    scope.spawn(move || store.open(circuit, 1000.0 + f64::from(i)).unwrap())
                })
                .collect();

            handles.into_iter().map(|handle| handle.join().unwrap()).filter(|&won| won).count()
        });

        assert_eq!(wins, 1);
    }

    #[test]
    fn reopen_moves_opened_at_only_from_the_expected_value() {
        let store = frozen_store();
        let circuit = CircuitProfile::new("api");

        store.open(&circuit, 1000.0).unwrap();

        assert!(!store.reopen(&circuit, 1100.0, 999.0).unwrap());
        assert!(store.reopen(&circuit, 1100.0, 1000.0).unwrap());
        assert_eq!(store.status(&circuit).unwrap().opened_at, Some(1100.0));
    }

    #[test]
    fn concurrent_reopen_has_one_winner() {
        let store = frozen_store();
        let circuit = CircuitProfile::new("api");
        store.open(&circuit, 1000.0).unwrap();

        let wins = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..32)
                .map(|i| {
                    let store = &store;
                    let circuit = &circuit;
                    scope.spawn(move || store.reopen(circuit, 1100.0 + f64::from(i), 1000.0).unwrap())
                })
                .collect();

            handles.into_iter().map(|handle| handle.join().unwrap()).filter(|&won| won).count()
        });

        assert_eq!(wins, 1);
    }

    #[test]
    fn close_clears_history_and_opened_at() {
        let store = frozen_store();
        let circuit = CircuitProfile::new("api");

        store.entry(&circuit, 999.0, false, None).unwrap();
        store.open(&circuit, 1000.0).unwrap();

        assert!(store.close(&circuit).unwrap());
        assert!(!store.close(&circuit).unwrap());

        assert!(store.history(&circuit).unwrap().is_empty());
        let status = store.status(&circuit).unwrap();
        assert!(status.closed());
        assert_eq!(status.opened_at, None);
    }

    #[test]
    fn entry_trims_to_max_sample_size() {
        let store = frozen_store();
        let circuit = CircuitProfile {
            max_sample_size: 4,
            ..CircuitProfile::new("api")
        };

        for i in 0..10 {
            store.entry(&circuit, 990.0 + f64::from(i), i % 2 == 0, None).unwrap();
        }

        let history = store.history(&circuit).unwrap();
        assert_eq!(history.len(), 4);
        // Oldest first, most recent retained.
        assert_eq!(history[0].time, 996.0);
        assert_eq!(history[3].time, 999.0);
    }

    #[test]
    fn entry_returns_status_reflecting_the_new_sample() {
        let store = frozen_store();
        let circuit = CircuitProfile::new("api");
        let snapshot = store.status(&circuit).unwrap();

        store.entry(&circuit, 999.0, false, None).unwrap();
        let updated = store.entry(&circuit, 1000.0, false, Some(&snapshot)).unwrap().unwrap();

        assert_eq!(updated.sample_size, 2);
        assert_eq!(updated.failure_rate, 1.0);
        assert!(!updated.fails_threshold(), "two samples are below the sample threshold");
    }

    #[test]
    fn status_respects_the_evaluation_window() {
        let control = ClockControl::new_at(SystemTime::UNIX_EPOCH + Duration::from_secs(1000));
        let store = MemoryStore::new(&control.to_clock());
        let circuit = CircuitProfile {
            evaluation_window: 60.0,
            ..CircuitProfile::new("api")
        };

        store.entry(&circuit, 1000.0, false, None).unwrap();
        assert_eq!(store.status(&circuit).unwrap().sample_size, 1);

        control.advance(Duration::from_secs(61));
        assert_eq!(store.status(&circuit).unwrap().sample_size, 0);

        // Out-of-window entries remain physically present.
        assert_eq!(store.history(&circuit).unwrap().len(), 1);
    }

    #[test]
    fn locks_pin_the_circuit() {
        let store = frozen_store();
        let circuit = CircuitProfile::new("api");

        store.lock(&circuit, Lock::Open).unwrap();
        assert!(!store.status(&circuit).unwrap().can_run());

        store.lock(&circuit, Lock::Closed).unwrap();
        store.open(&circuit, 1000.0).unwrap();
        assert!(store.status(&circuit).unwrap().can_run());

        store.unlock(&circuit).unwrap();
        assert!(!store.status(&circuit).unwrap().can_run());
    }

    #[test]
    fn reset_restores_the_initial_state() {
        let store = frozen_store();
        let circuit = CircuitProfile::new("api");

        store.entry(&circuit, 999.0, false, None).unwrap();
        store.open(&circuit, 1000.0).unwrap();
        store.lock(&circuit, Lock::Open).unwrap();
        store.set_options(&circuit, &OptionsMap::new()).unwrap();

        store.reset(&circuit).unwrap();
        store.reset(&circuit).unwrap();

        let status = store.status(&circuit).unwrap();
        assert!(status.closed());
        assert_eq!(status.lock, None);
        assert_eq!(status.opened_at, None);
        assert!(store.history(&circuit).unwrap().is_empty());
        assert_eq!(store.get_options(&circuit).unwrap(), None);
    }

    #[test]
    fn options_round_trip() {
        let store = frozen_store();
        let circuit = CircuitProfile::new("api");

        let mut options = OptionsMap::new();
        options.insert("cool_down".to_owned(), 300.0.into());
        options.insert("sample_threshold".to_owned(), 3_u32.into());

        store.set_options(&circuit, &options).unwrap();
        assert_eq!(store.get_options(&circuit).unwrap(), Some(options));
    }

    #[test]
    fn list_names_known_circuits() {
        let store = frozen_store();

        store.entry(&CircuitProfile::new("b"), 1.0, true, None).unwrap();
        store.entry(&CircuitProfile::new("a"), 1.0, true, None).unwrap();

        assert_eq!(store.list().unwrap(), vec!["a".to_owned(), "b".to_owned()]);
    }
}
