// Copyright (c) Microsoft Corporation.

/// The view of a circuit that storage backends operate on.
///
/// A profile carries the circuit name plus every threshold and retention
/// setting that status computation and persistence need. It deliberately
/// excludes the runtime-only parts of a circuit (error classification, cache
/// settings, callbacks) so that backends stay decoupled from the runner.
///
/// All durations are float seconds; see the crate docs for the time model.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitProfile {
    /// Circuit name, unique within an instance.
    pub name: String,

    /// Seconds to remain open before the circuit becomes half-open.
    pub cool_down: f64,

    /// How far back, in seconds, samples count towards the failure rate.
    pub evaluation_window: f64,

    /// Failure fraction in `[0, 1]` at which the circuit trips.
    pub rate_threshold: f64,

    /// Minimum number of in-window samples required before tripping.
    pub sample_threshold: u32,

    /// Maximum number of samples a backend retains per circuit.
    pub max_sample_size: usize,

    /// Seconds after which an idle sample list may be evicted.
    pub sample_ttl: f64,

    /// Seconds after which all non-lock circuit state may be evicted.
    pub circuit_ttl: f64,
}

impl CircuitProfile {
    /// Default cool-down, in seconds.
    pub const DEFAULT_COOL_DOWN: f64 = 300.0;

    /// Default evaluation window, in seconds.
    pub const DEFAULT_EVALUATION_WINDOW: f64 = 60.0;

    /// Default failure-rate threshold.
    pub const DEFAULT_RATE_THRESHOLD: f64 = 0.5;

    /// Default minimum sample size.
    pub const DEFAULT_SAMPLE_THRESHOLD: u32 = 3;

    /// Default maximum retained sample size.
    pub const DEFAULT_MAX_SAMPLE_SIZE: usize = 100;

    /// Default sample retention, in seconds.
    pub const DEFAULT_SAMPLE_TTL: f64 = 1800.0;

    /// Default circuit-state retention, in seconds (one week).
    pub const DEFAULT_CIRCUIT_TTL: f64 = 604_800.0;

    /// Creates a profile with the given name and default settings.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cool_down: Self::DEFAULT_COOL_DOWN,
            evaluation_window: Self::DEFAULT_EVALUATION_WINDOW,
            rate_threshold: Self::DEFAULT_RATE_THRESHOLD,
            sample_threshold: Self::DEFAULT_SAMPLE_THRESHOLD,
            max_sample_size: Self::DEFAULT_MAX_SAMPLE_SIZE,
            sample_ttl: Self::DEFAULT_SAMPLE_TTL,
            circuit_ttl: Self::DEFAULT_CIRCUIT_TTL,
        }
    }
}
