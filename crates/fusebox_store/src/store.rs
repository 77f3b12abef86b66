// Copyright (c) Microsoft Corporation.

use std::fmt;
use std::sync::Arc;

use crate::{CircuitProfile, Lock, OptionsMap, Result, SampleEntry, Status};

/// The uniform persistence contract circuit breakers run against.
///
/// Implementations hold, per circuit: the stored state, the open timestamp,
/// an optional administrative lock, the bounded sample history, and the
/// persisted options map. All methods are safe to call concurrently from
/// many threads.
///
/// # Transition reporting
///
/// [`open`][Self::open], [`reopen`][Self::reopen] and [`close`][Self::close]
/// are compare-and-set operations that return `true` only when this call
/// performed the transition. Callers rely on that contract to emit each
/// transition notification exactly once, no matter how many threads race.
///
/// # Fault tolerance
///
/// [`is_fault_tolerant`][Self::is_fault_tolerant] advertises whether the
/// backend promises not to fail on normal-path operations. Backends that can
/// fail (anything networked) return `false` and are expected to be wrapped
/// before a circuit runs against them; see the wrapper types in the `fusebox`
/// crate.
pub trait Store: fmt::Debug + Send + Sync {
    /// Returns the previously persisted options map for the circuit, if any.
    fn get_options(&self, circuit: &CircuitProfile) -> Result<Option<OptionsMap>>;

    /// Persists the circuit's options map. Idempotent; last write wins.
    fn set_options(&self, circuit: &CircuitProfile, options: &OptionsMap) -> Result<()>;

    /// Appends one outcome to the circuit's sample, trimming to the profile's
    /// `max_sample_size`.
    ///
    /// When `snapshot` carries the status the caller observed before running,
    /// the backend returns a status recomputed against the refreshed sample so
    /// the caller can evaluate the trip threshold without a second read.
    fn entry(&self, circuit: &CircuitProfile, time: f64, success: bool, snapshot: Option<&Status>)
    -> Result<Option<Status>>;

    /// Transitions closed to open, recording `opened_at`.
    ///
    /// Returns `true` iff this call performed the transition.
    fn open(&self, circuit: &CircuitProfile, opened_at: f64) -> Result<bool>;

    /// Re-arms an open circuit after a failed half-open probe by moving
    /// `opened_at` from `previous_opened_at` to `opened_at`.
    ///
    /// Returns `true` iff this call performed the update.
    fn reopen(&self, circuit: &CircuitProfile, opened_at: f64, previous_opened_at: f64) -> Result<bool>;

    /// Transitions open to closed, clearing the sample history on success.
    ///
    /// Returns `true` iff this call performed the transition.
    fn close(&self, circuit: &CircuitProfile) -> Result<bool>;

    /// Pins the administrative lock. No concurrency guarantees are required.
    fn lock(&self, circuit: &CircuitProfile, lock: Lock) -> Result<()>;

    /// Clears the administrative lock.
    fn unlock(&self, circuit: &CircuitProfile) -> Result<()>;

    /// Removes all state for the circuit: sample, `opened_at`, lock, options,
    /// and the stored state itself (back to closed).
    fn reset(&self, circuit: &CircuitProfile) -> Result<()>;

    /// Computes the circuit's current status; see [`Status::compute`].
    fn status(&self, circuit: &CircuitProfile) -> Result<Status>;

    /// Returns the full retained sample, oldest first.
    fn history(&self, circuit: &CircuitProfile) -> Result<Vec<SampleEntry>>;

    /// Returns the names of all circuits known to this backend.
    fn list(&self) -> Result<Vec<String>>;

    /// True iff this backend promises not to fail on normal-path operations.
    fn is_fault_tolerant(&self) -> bool;
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn get_options(&self, circuit: &CircuitProfile) -> Result<Option<OptionsMap>> {
        (**self).get_options(circuit)
    }

    fn set_options(&self, circuit: &CircuitProfile, options: &OptionsMap) -> Result<()> {
        (**self).set_options(circuit, options)
    }

    fn entry(
        &self,
        circuit: &CircuitProfile,
        time: f64,
        success: bool,
        snapshot: Option<&Status>,
    ) -> Result<Option<Status>> {
        (**self).entry(circuit, time, success, snapshot)
    }

    fn open(&self, circuit: &CircuitProfile, opened_at: f64) -> Result<bool> {
        (**self).open(circuit, opened_at)
    }

    fn reopen(&self, circuit: &CircuitProfile, opened_at: f64, previous_opened_at: f64) -> Result<bool> {
        (**self).reopen(circuit, opened_at, previous_opened_at)
    }

    fn close(&self, circuit: &CircuitProfile) -> Result<bool> {
        (**self).close(circuit)
    }

    fn lock(&self, circuit: &CircuitProfile, lock: Lock) -> Result<()> {
        (**self).lock(circuit, lock)
    }

    fn unlock(&self, circuit: &CircuitProfile) -> Result<()> {
        (**self).unlock(circuit)
    }

    fn reset(&self, circuit: &CircuitProfile) -> Result<()> {
        (**self).reset(circuit)
    }

    fn status(&self, circuit: &CircuitProfile) -> Result<Status> {
        (**self).status(circuit)
    }

    fn history(&self, circuit: &CircuitProfile) -> Result<Vec<SampleEntry>> {
        (**self).history(circuit)
    }

    fn list(&self) -> Result<Vec<String>> {
        (**self).list()
    }

    fn is_fault_tolerant(&self) -> bool {
        (**self).is_fault_tolerant()
    }
}

/// Identifies a storage operation, for failure notifications and test logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreAction {
    /// [`Store::get_options`]
    GetOptions,
    /// [`Store::set_options`]
    SetOptions,
    /// [`Store::entry`]
    Entry,
    /// [`Store::open`]
    Open,
    /// [`Store::reopen`]
    Reopen,
    /// [`Store::close`]
    Close,
    /// [`Store::lock`]
    Lock,
    /// [`Store::unlock`]
    Unlock,
    /// [`Store::reset`]
    Reset,
    /// [`Store::status`]
    Status,
    /// [`Store::history`]
    History,
    /// [`Store::list`]
    List,
}

impl StoreAction {
    /// True for administrative operations, whose failures are rethrown rather
    /// than swallowed by fault-tolerant wrappers: a silently ignored lock or
    /// reset is more dangerous than a surfaced error.
    #[must_use]
    pub fn is_admin(self) -> bool {
        matches!(
            self,
            Self::GetOptions | Self::SetOptions | Self::Lock | Self::Unlock | Self::Reset
        )
    }
}

impl fmt::Display for StoreAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GetOptions => "get_options",
            Self::SetOptions => "set_options",
            Self::Entry => "entry",
            Self::Open => "open",
            Self::Reopen => "reopen",
            Self::Close => "close",
            Self::Lock => "lock",
            Self::Unlock => "unlock",
            Self::Reset => "reset",
            Self::Status => "status",
            Self::History => "history",
            Self::List => "list",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_names_are_snake_case() {
        assert_eq!(StoreAction::GetOptions.to_string(), "get_options");
        assert_eq!(StoreAction::Entry.to_string(), "entry");
        assert_eq!(StoreAction::Reopen.to_string(), "reopen");
    }

    #[test]
    fn admin_actions_are_classified() {
        for action in [
            StoreAction::GetOptions,
            StoreAction::SetOptions,
            StoreAction::Lock,
            StoreAction::Unlock,
            StoreAction::Reset,
        ] {
            assert!(action.is_admin(), "{action} should be admin");
        }

        for action in [
            StoreAction::Entry,
            StoreAction::Open,
            StoreAction::Reopen,
            StoreAction::Close,
            StoreAction::Status,
            StoreAction::History,
            StoreAction::List,
        ] {
            assert!(!action.is_admin(), "{action} should not be admin");
        }
    }
}
