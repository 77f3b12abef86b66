// Copyright (c) Microsoft Corporation.

use std::fmt;
use std::str::FromStr;

use crate::{CircuitProfile, Error, Result, SampleEntry};

/// The stored state of a circuit.
///
/// `HalfOpen` is deliberately not a stored state: it is derived from
/// `Open` plus the age of `opened_at` relative to the cool-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// Normal operation; user work runs.
    #[default]
    Closed,

    /// User work is short-circuited until the cool-down elapses.
    Open,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("closed"),
            Self::Open => f.write_str("open"),
        }
    }
}

impl FromStr for State {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw {
            "closed" => Ok(Self::Closed),
            "open" => Ok(Self::Open),
            _ => Err(Error::codec(raw)),
        }
    }
}

/// An administrative lock pinning a circuit regardless of its history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lock {
    /// The circuit behaves as permanently open; execution is blocked.
    Open,

    /// The circuit behaves as permanently closed; execution always proceeds.
    Closed,
}

impl fmt::Display for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

impl FromStr for Lock {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            _ => Err(Error::codec(raw)),
        }
    }
}

/// The raw persisted fields of a circuit, before status derivation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawState {
    /// Stored state.
    pub state: State,

    /// Wall-clock seconds at which the circuit last opened, if any.
    pub opened_at: Option<f64>,

    /// Administrative lock, if any.
    pub lock: Option<Lock>,
}

/// An immutable snapshot of a circuit's health at one point in time.
///
/// A status is derived, never stored: backends combine their raw fields with
/// the retained sample history and the caller's clock via [`Status::compute`].
/// The derived predicates ([`open`][Self::open], [`half_open`][Self::half_open],
/// [`can_run`][Self::can_run], [`fails_threshold`][Self::fails_threshold]) are
/// the canonical forms the runner gates on.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    /// Stored state at evaluation time.
    pub state: State,

    /// Administrative lock at evaluation time.
    pub lock: Option<Lock>,

    /// When the circuit last opened, repaired if missing (see [`Status::compute`]).
    pub opened_at: Option<f64>,

    /// Fraction of in-window samples that failed, `0.0` when the window is empty.
    pub failure_rate: f64,

    /// Number of samples inside the evaluation window.
    pub sample_size: u32,

    /// Wall-clock seconds at which this status was computed.
    pub evaluated_at: f64,

    /// Cool-down the circuit was evaluated against, in seconds.
    pub cool_down: f64,

    /// Rate threshold the circuit was evaluated against.
    pub rate_threshold: f64,

    /// Sample threshold the circuit was evaluated against.
    pub sample_threshold: u32,

    /// True when this status is a conservative stand-in produced after a
    /// storage failure rather than a real observation.
    pub stub: bool,
}

impl Status {
    /// Derives a status from raw stored fields and the retained sample.
    ///
    /// Samples older than the evaluation window are ignored. A missing
    /// `opened_at` on an open circuit is repaired by assuming the maximum
    /// plausible age (`now - circuit_ttl`), which makes the circuit
    /// immediately half-open rather than stuck.
    #[must_use]
    pub fn compute(profile: &CircuitProfile, raw: RawState, entries: &[SampleEntry], now: f64) -> Self {
        let window_start = now - profile.evaluation_window;
        let mut sample_size: u32 = 0;
        let mut failures: u32 = 0;

        for entry in entries {
            if entry.time > window_start {
                sample_size += 1;
                if !entry.success {
                    failures += 1;
                }
            }
        }

        let failure_rate = if sample_size == 0 {
            0.0
        } else {
            f64::from(failures) / f64::from(sample_size)
        };

        let opened_at = match (raw.state, raw.opened_at) {
            (State::Open, None) => Some(now - profile.circuit_ttl),
            (_, opened_at) => opened_at,
        };

        Self {
            state: raw.state,
            lock: raw.lock,
            opened_at,
            failure_rate,
            sample_size,
            evaluated_at: now,
            cool_down: profile.cool_down,
            rate_threshold: profile.rate_threshold,
            sample_threshold: profile.sample_threshold,
            stub: false,
        }
    }

    /// Creates the conservative closed stub returned when a backend fails.
    #[must_use]
    pub fn stub(profile: &CircuitProfile, now: f64) -> Self {
        Self {
            stub: true,
            ..Self::compute(profile, RawState::default(), &[], now)
        }
    }

    /// True when the circuit is open and still inside its cool-down.
    #[must_use]
    pub fn open(&self) -> bool {
        self.state == State::Open
            && self.opened_at.is_some_and(|opened_at| opened_at + self.cool_down > self.evaluated_at)
    }

    /// True when the circuit is open and the cool-down has elapsed.
    #[must_use]
    pub fn half_open(&self) -> bool {
        self.state == State::Open
            && self.opened_at.is_some_and(|opened_at| opened_at + self.cool_down <= self.evaluated_at)
    }

    /// True when the circuit is closed.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.state == State::Closed
    }

    /// True when an administrative lock pins the circuit open.
    #[must_use]
    pub fn locked_open(&self) -> bool {
        self.lock == Some(Lock::Open)
    }

    /// True when an administrative lock pins the circuit closed.
    #[must_use]
    pub fn locked_closed(&self) -> bool {
        self.lock == Some(Lock::Closed)
    }

    /// True when an execution may proceed.
    #[must_use]
    pub fn can_run(&self) -> bool {
        !self.locked_open() && (self.closed() || self.locked_closed() || self.half_open())
    }

    /// True when the sample is large enough and failing hard enough to trip.
    #[must_use]
    pub fn fails_threshold(&self) -> bool {
        self.sample_size >= self.sample_threshold && self.failure_rate >= self.rate_threshold
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::float_cmp, reason = "Test")]

    use rstest::rstest;

    use super::*;

    fn profile() -> CircuitProfile {
        CircuitProfile {
            cool_down: 60.0,
            evaluation_window: 30.0,
            rate_threshold: 0.5,
            sample_threshold: 3,
            ..CircuitProfile::new("status")
        }
    }

    fn entries(now: f64, outcomes: &[(f64, bool)]) -> Vec<SampleEntry> {
        outcomes.iter().map(|&(age, success)| SampleEntry::new(now - age, success)).collect()
    }

    #[test]
    fn state_and_lock_round_trip_strings() {
        assert_eq!("open".parse::<State>().unwrap(), State::Open);
        assert_eq!("closed".parse::<State>().unwrap(), State::Closed);
        assert_eq!(State::Open.to_string(), "open");
        assert!("half_open".parse::<State>().is_err());

        assert_eq!("open".parse::<Lock>().unwrap(), Lock::Open);
        assert_eq!(Lock::Closed.to_string(), "closed");
        assert!("".parse::<Lock>().is_err());
    }

    #[test]
    fn empty_sample_is_closed_and_healthy() {
        let status = Status::compute(&profile(), RawState::default(), &[], 1000.0);

        assert!(status.closed());
        assert!(status.can_run());
        assert!(!status.fails_threshold());
        assert_eq!(status.sample_size, 0);
        assert_eq!(status.failure_rate, 0.0);
    }

    #[test]
    fn window_filters_old_entries() {
        let now = 1000.0;
        let entries = entries(now, &[(40.0, false), (29.0, false), (10.0, true)]);

        let status = Status::compute(&profile(), RawState::default(), &entries, now);

        // The 40s-old failure is outside the 30s window.
        assert_eq!(status.sample_size, 2);
        assert_eq!(status.failure_rate, 0.5);
    }

    #[test]
    fn entry_exactly_at_window_start_is_ignored() {
        let now = 1000.0;
        let entries = vec![SampleEntry::new(now - 30.0, false)];

        let status = Status::compute(&profile(), RawState::default(), &entries, now);

        assert_eq!(status.sample_size, 0);
    }

    #[rstest]
    #[case(2, 2, false)] // below sample threshold despite 100% failures
    #[case(3, 2, true)] // above both thresholds
    #[case(4, 2, true)] // exactly at the rate threshold
    #[case(4, 1, false)] // below rate threshold
    fn fails_threshold_boundaries(#[case] total: u32, #[case] failures: u32, #[case] expected: bool) {
        let now = 1000.0;
        let outcomes: Vec<(f64, bool)> = (0..total).map(|i| (f64::from(i) + 1.0, i >= failures)).collect();
        let entries = entries(now, &outcomes);

        let status = Status::compute(&profile(), RawState::default(), &entries, now);

        assert_eq!(status.fails_threshold(), expected);
    }

    #[test]
    fn open_within_cool_down() {
        let raw = RawState {
            state: State::Open,
            opened_at: Some(970.0),
            lock: None,
        };

        let status = Status::compute(&profile(), raw, &[], 1000.0);

        assert!(status.open());
        assert!(!status.half_open());
        assert!(!status.can_run());
    }

    #[test]
    fn half_open_after_cool_down() {
        let raw = RawState {
            state: State::Open,
            opened_at: Some(940.0),
            lock: None,
        };

        let status = Status::compute(&profile(), raw, &[], 1000.0);

        assert!(!status.open());
        assert!(status.half_open());
        assert!(status.can_run());
    }

    #[test]
    fn missing_opened_at_is_repaired_to_half_open() {
        let raw = RawState {
            state: State::Open,
            opened_at: None,
            lock: None,
        };

        let status = Status::compute(&profile(), raw, &[], 1000.0);

        assert_eq!(status.opened_at, Some(1000.0 - CircuitProfile::DEFAULT_CIRCUIT_TTL));
        assert!(status.half_open());
    }

    #[test]
    fn locks_override_state() {
        let now = 1000.0;

        let locked_open = Status::compute(
            &profile(),
            RawState {
                lock: Some(Lock::Open),
                ..RawState::default()
            },
            &[],
            now,
        );
        assert!(!locked_open.can_run());

        let locked_closed = Status::compute(
            &profile(),
            RawState {
                state: State::Open,
                opened_at: Some(now - 1.0),
                lock: Some(Lock::Closed),
            },
            &[],
            now,
        );
        assert!(locked_closed.open());
        assert!(locked_closed.can_run());
    }

    #[test]
    fn stub_is_closed_and_marked() {
        let status = Status::stub(&profile(), 1000.0);

        assert!(status.stub);
        assert!(status.closed());
        assert!(status.can_run());
        assert_eq!(status.sample_size, 0);
    }
}
