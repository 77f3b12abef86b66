// Copyright (c) Microsoft Corporation.

use tick::Clock;

use fusebox_store::{
    CircuitProfile, Lock, OptionsMap, RawState, Result, SampleEntry, Status, Store, wall_seconds,
};

/// Storage that remembers nothing.
///
/// Every circuit backed by this store is permanently closed with an empty
/// history: user work always runs, failures are never counted, and
/// transitions never happen. The process-wide disable switch substitutes
/// this store to bypass the state machine without a second code path.
#[derive(Debug)]
pub struct NullStore {
    clock: Clock,
}

impl NullStore {
    /// Creates a null store reading time from the given clock.
    #[must_use]
    pub fn new(clock: &Clock) -> Self {
        Self { clock: clock.clone() }
    }

    fn empty_status(&self, circuit: &CircuitProfile, now: f64) -> Status {
        Status::compute(circuit, RawState::default(), &[], now)
    }
}

impl Store for NullStore {
    fn get_options(&self, _circuit: &CircuitProfile) -> Result<Option<OptionsMap>> {
        Ok(None)
    }

    fn set_options(&self, _circuit: &CircuitProfile, _options: &OptionsMap) -> Result<()> {
        Ok(())
    }

    fn entry(
        &self,
        circuit: &CircuitProfile,
        time: f64,
        _success: bool,
        snapshot: Option<&Status>,
    ) -> Result<Option<Status>> {
        Ok(snapshot.map(|_| self.empty_status(circuit, time)))
    }

    fn open(&self, _circuit: &CircuitProfile, _opened_at: f64) -> Result<bool> {
        Ok(false)
    }

    fn reopen(&self, _circuit: &CircuitProfile, _opened_at: f64, _previous_opened_at: f64) -> Result<bool> {
        Ok(false)
    }

    fn close(&self, _circuit: &CircuitProfile) -> Result<bool> {
        Ok(false)
    }

    fn lock(&self, _circuit: &CircuitProfile, _lock: Lock) -> Result<()> {
        Ok(())
    }

    fn unlock(&self, _circuit: &CircuitProfile) -> Result<()> {
        Ok(())
    }

    fn reset(&self, _circuit: &CircuitProfile) -> Result<()> {
        Ok(())
    }

    fn status(&self, circuit: &CircuitProfile) -> Result<Status> {
        Ok(self.empty_status(circuit, wall_seconds(&self.clock)))
    }

    fn history(&self, _circuit: &CircuitProfile) -> Result<Vec<SampleEntry>> {
        Ok(Vec::new())
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn is_fault_tolerant(&self) -> bool {
        true
    }
}
