// Copyright (c) Microsoft Corporation.

use std::fmt;
use std::time::Duration;

use fusebox_store::{CircuitProfile, OptionsMap};

use crate::errors::{ErrorMapper, ErrorPredicate};

/// Fraction of `cache_refreshes_after` used as the default refresh jitter.
const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// An invalid combination of circuit options.
#[derive(Debug, thiserror::Error)]
#[error("invalid circuit options: {0}")]
pub struct OptionsError(String);

/// The policy a circuit runs with.
///
/// Options are frozen after construction; build them with
/// [`CircuitOptions::builder`]. Another circuit already executed under the
/// same name wins over these values — handles are advisory until their first
/// execution (see the registry notes on [`Fusebox::circuit`][crate::Fusebox::circuit]).
#[derive(Clone)]
pub struct CircuitOptions {
    pub(crate) cache_expires_in: Option<Duration>,
    pub(crate) cache_refreshes_after: Option<Duration>,
    cache_refresh_jitter: Option<Duration>,
    pub(crate) cool_down: Duration,
    pub(crate) evaluation_window: Duration,
    pub(crate) rate_threshold: f64,
    pub(crate) sample_threshold: u32,
    pub(crate) max_sample_size: usize,
    pub(crate) sample_ttl: Duration,
    pub(crate) circuit_ttl: Duration,
    pub(crate) errors: Option<ErrorPredicate>,
    pub(crate) exclude: Option<ErrorPredicate>,
    pub(crate) error_mapper: Option<ErrorMapper>,
}

impl fmt::Debug for CircuitOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitOptions")
            .field("cache_expires_in", &self.cache_expires_in)
            .field("cache_refreshes_after", &self.cache_refreshes_after)
            .field("cache_refresh_jitter", &self.cache_refresh_jitter)
            .field("cool_down", &self.cool_down)
            .field("evaluation_window", &self.evaluation_window)
            .field("rate_threshold", &self.rate_threshold)
            .field("sample_threshold", &self.sample_threshold)
            .field("max_sample_size", &self.max_sample_size)
            .finish_non_exhaustive()
    }
}

impl Default for CircuitOptions {
    fn default() -> Self {
        Self {
            cache_expires_in: Some(Duration::from_secs(86_400)),
            cache_refreshes_after: Some(Duration::from_secs(900)),
            cache_refresh_jitter: None,
            cool_down: Duration::from_secs(300),
            evaluation_window: Duration::from_secs(60),
            rate_threshold: 0.5,
            sample_threshold: 3,
            max_sample_size: 100,
            sample_ttl: Duration::from_secs(1800),
            circuit_ttl: Duration::from_secs(604_800),
            errors: None,
            exclude: None,
            error_mapper: None,
        }
    }
}

impl CircuitOptions {
    /// Starts building options from the defaults.
    #[must_use]
    pub fn builder() -> CircuitOptionsBuilder {
        CircuitOptionsBuilder {
            options: Self::default(),
        }
    }

    /// Starts building options from this value, for deriving per-circuit
    /// options from instance defaults.
    #[must_use]
    pub fn to_builder(&self) -> CircuitOptionsBuilder {
        CircuitOptionsBuilder {
            options: self.clone(),
        }
    }

    /// The wait between opening and the first half-open probe.
    #[must_use]
    pub fn cool_down(&self) -> Duration {
        self.cool_down
    }

    /// The recency horizon for failure-rate computation.
    #[must_use]
    pub fn evaluation_window(&self) -> Duration {
        self.evaluation_window
    }

    /// The failure fraction at which the circuit trips.
    #[must_use]
    pub fn rate_threshold(&self) -> f64 {
        self.rate_threshold
    }

    /// The minimum in-window sample size required before tripping.
    #[must_use]
    pub fn sample_threshold(&self) -> u32 {
        self.sample_threshold
    }

    /// The refresh jitter, in seconds: the configured value, or 20% of
    /// `cache_refreshes_after` when unset.
    #[must_use]
    pub fn refresh_jitter_seconds(&self) -> f64 {
        self.cache_refresh_jitter.map_or_else(
            || {
                self.cache_refreshes_after
                    .map_or(0.0, |refresh| refresh.as_secs_f64() * DEFAULT_JITTER_FACTOR)
            },
            |jitter| jitter.as_secs_f64(),
        )
    }

    /// True when the given user error counts as a circuit failure.
    ///
    /// `exclude` wins over `errors`; with neither configured, every error
    /// counts.
    pub(crate) fn counts_as_failure(&self, error: &(dyn std::error::Error + Send + Sync + 'static)) -> bool {
        if self.exclude.as_ref().is_some_and(|excluded| excluded(error)) {
            return false;
        }

        self.errors.as_ref().is_none_or(|counted| counted(error))
    }

    /// The storage-facing view of these options.
    pub(crate) fn profile(&self, name: &str) -> CircuitProfile {
        CircuitProfile {
            name: name.to_owned(),
            cool_down: self.cool_down.as_secs_f64(),
            evaluation_window: self.evaluation_window.as_secs_f64(),
            rate_threshold: self.rate_threshold,
            sample_threshold: self.sample_threshold,
            max_sample_size: self.max_sample_size,
            sample_ttl: self.sample_ttl.as_secs_f64(),
            circuit_ttl: self.circuit_ttl.as_secs_f64(),
        }
    }

    /// The primitive projection persisted via `set_options`.
    pub(crate) fn to_map(&self) -> OptionsMap {
        let mut map = OptionsMap::new();

        map.insert("cool_down".to_owned(), self.cool_down.as_secs_f64().into());
        map.insert("evaluation_window".to_owned(), self.evaluation_window.as_secs_f64().into());
        map.insert("rate_threshold".to_owned(), self.rate_threshold.into());
        map.insert("sample_threshold".to_owned(), self.sample_threshold.into());
        map.insert("max_sample_size".to_owned(), i64::try_from(self.max_sample_size).unwrap_or(i64::MAX).into());
        map.insert("sample_ttl".to_owned(), self.sample_ttl.as_secs_f64().into());
        map.insert("circuit_ttl".to_owned(), self.circuit_ttl.as_secs_f64().into());
        map.insert("cache_refresh_jitter".to_owned(), self.refresh_jitter_seconds().into());

        if let Some(expires) = self.cache_expires_in {
            map.insert("cache_expires_in".to_owned(), expires.as_secs_f64().into());
        }
        if let Some(refresh) = self.cache_refreshes_after {
            map.insert("cache_refreshes_after".to_owned(), refresh.as_secs_f64().into());
        }

        map
    }

    /// A profile overlaid with thresholds another process persisted, used so
    /// observers of a not-yet-executed circuit see consistent values.
    pub(crate) fn overlaid_profile(&self, name: &str, stored: &OptionsMap) -> CircuitProfile {
        let mut profile = self.profile(name);

        let float = |key: &str| stored.get(key).and_then(fusebox_store::OptionValue::as_f64);

        if let Some(value) = float("cool_down") {
            profile.cool_down = value;
        }
        if let Some(value) = float("evaluation_window") {
            profile.evaluation_window = value;
        }
        if let Some(value) = float("rate_threshold") {
            profile.rate_threshold = value;
        }
        if let Some(value) = stored.get("sample_threshold").and_then(fusebox_store::OptionValue::as_u32) {
            profile.sample_threshold = value;
        }
        if let Some(value) = float("sample_ttl") {
            profile.sample_ttl = value;
        }
        if let Some(value) = float("circuit_ttl") {
            profile.circuit_ttl = value;
        }

        profile
    }
}

/// Builder for [`CircuitOptions`].
#[derive(Debug)]
pub struct CircuitOptionsBuilder {
    options: CircuitOptions,
}

impl CircuitOptionsBuilder {
    /// Sets the cache hard TTL; `None` keeps cached values indefinitely.
    #[must_use]
    pub fn cache_expires_in(mut self, expires_in: Option<Duration>) -> Self {
        self.options.cache_expires_in = expires_in;
        self
    }

    /// Sets the age after which a cached value is due for refresh; `None`
    /// disables refresh (values stay fresh until they expire).
    #[must_use]
    pub fn cache_refreshes_after(mut self, refreshes_after: Option<Duration>) -> Self {
        self.options.cache_refreshes_after = refreshes_after;
        self
    }

    /// Sets the uniform jitter applied to the refresh age.
    #[must_use]
    pub fn cache_refresh_jitter(mut self, jitter: Duration) -> Self {
        self.options.cache_refresh_jitter = Some(jitter);
        self
    }

    /// Sets the wait between opening and the first half-open probe.
    #[must_use]
    pub fn cool_down(mut self, cool_down: Duration) -> Self {
        self.options.cool_down = cool_down;
        self
    }

    /// Sets the recency horizon for failure-rate computation.
    #[must_use]
    pub fn evaluation_window(mut self, window: Duration) -> Self {
        self.options.evaluation_window = window;
        self
    }

    /// Sets the failure fraction in `[0, 1]` at which the circuit trips.
    #[must_use]
    pub fn rate_threshold(mut self, threshold: f64) -> Self {
        self.options.rate_threshold = threshold;
        self
    }

    /// Sets the minimum in-window sample size required before tripping.
    #[must_use]
    pub fn sample_threshold(mut self, threshold: u32) -> Self {
        self.options.sample_threshold = threshold;
        self
    }

    /// Sets how many samples storage retains per circuit.
    #[must_use]
    pub fn max_sample_size(mut self, size: usize) -> Self {
        self.options.max_sample_size = size;
        self
    }

    /// Sets how long an idle sample list is retained.
    #[must_use]
    pub fn sample_ttl(mut self, ttl: Duration) -> Self {
        self.options.sample_ttl = ttl;
        self
    }

    /// Sets how long non-lock circuit state is retained.
    #[must_use]
    pub fn circuit_ttl(mut self, ttl: Duration) -> Self {
        self.options.circuit_ttl = ttl;
        self
    }

    /// Restricts counted failures to errors matching the predicate.
    ///
    /// Build per-type predicates with [`error_kind`][crate::errors::error_kind].
    #[must_use]
    pub fn errors(mut self, predicate: ErrorPredicate) -> Self {
        self.options.errors = Some(predicate);
        self
    }

    /// Excludes errors matching the predicate from counting as failures,
    /// taking precedence over [`errors`][Self::errors].
    #[must_use]
    pub fn exclude(mut self, predicate: ErrorPredicate) -> Self {
        self.options.exclude = Some(predicate);
        self
    }

    /// Installs a hook that reshapes every surfaced circuit error.
    #[must_use]
    pub fn error_mapper(mut self, mapper: ErrorMapper) -> Self {
        self.options.error_mapper = Some(mapper);
        self
    }

    /// Validates and freezes the options.
    ///
    /// # Errors
    ///
    /// Fails when `rate_threshold` is outside `[0, 1]`, `sample_threshold`
    /// is zero, or `max_sample_size` is zero.
    pub fn build(self) -> Result<CircuitOptions, OptionsError> {
        let options = self.options;

        if !(0.0..=1.0).contains(&options.rate_threshold) {
            return Err(OptionsError(format!(
                "rate_threshold must be within [0, 1], got {}",
                options.rate_threshold
            )));
        }
        if options.sample_threshold == 0 {
            return Err(OptionsError("sample_threshold must be at least 1".to_owned()));
        }
        if options.max_sample_size == 0 {
            return Err(OptionsError("max_sample_size must be at least 1".to_owned()));
        }

        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::float_cmp, reason = "Test")]

    use super::*;
    use crate::errors::error_kind;

    #[derive(Debug, thiserror::Error)]
    #[error("database down")]
    struct DbError;

    #[derive(Debug, thiserror::Error)]
    #[error("not found")]
    struct NotFound;

    #[test]
    fn defaults_match_the_documented_policy() {
        let options = CircuitOptions::default();

        assert_eq!(options.cache_expires_in, Some(Duration::from_secs(86_400)));
        assert_eq!(options.cache_refreshes_after, Some(Duration::from_secs(900)));
        assert_eq!(options.cool_down(), Duration::from_secs(300));
        assert_eq!(options.evaluation_window(), Duration::from_secs(60));
        assert_eq!(options.rate_threshold(), 0.5);
        assert_eq!(options.sample_threshold(), 3);
        assert_eq!(options.max_sample_size, 100);
        // Default jitter is 20% of the refresh age.
        assert_eq!(options.refresh_jitter_seconds(), 180.0);
    }

    #[test]
    fn builder_validates_thresholds() {
        assert!(CircuitOptions::builder().rate_threshold(1.5).build().is_err());
        assert!(CircuitOptions::builder().rate_threshold(-0.1).build().is_err());
        assert!(CircuitOptions::builder().sample_threshold(0).build().is_err());
        assert!(CircuitOptions::builder().max_sample_size(0).build().is_err());

        assert!(CircuitOptions::builder().rate_threshold(1.0).build().is_ok());
        assert!(CircuitOptions::builder().rate_threshold(0.0).build().is_ok());
    }

    #[test]
    fn explicit_jitter_overrides_the_derived_default() {
        let options = CircuitOptions::builder()
            .cache_refresh_jitter(Duration::from_secs(5))
            .build()
            .unwrap();
        assert_eq!(options.refresh_jitter_seconds(), 5.0);

        let options = CircuitOptions::builder().cache_refreshes_after(None).build().unwrap();
        assert_eq!(options.refresh_jitter_seconds(), 0.0);
    }

    #[test]
    fn all_errors_count_by_default() {
        let options = CircuitOptions::default();
        assert!(options.counts_as_failure(&DbError));
        assert!(options.counts_as_failure(&NotFound));
    }

    #[test]
    fn errors_predicate_narrows_counted_failures() {
        let options = CircuitOptions::builder().errors(error_kind::<DbError>()).build().unwrap();

        assert!(options.counts_as_failure(&DbError));
        assert!(!options.counts_as_failure(&NotFound));
    }

    #[test]
    fn exclude_takes_precedence_over_errors() {
        let options = CircuitOptions::builder()
            .errors(error_kind::<DbError>())
            .exclude(error_kind::<DbError>())
            .build()
            .unwrap();

        assert!(!options.counts_as_failure(&DbError));
    }

    #[test]
    fn profile_projects_durations_to_seconds() {
        let options = CircuitOptions::builder()
            .cool_down(Duration::from_secs(60))
            .evaluation_window(Duration::from_secs(30))
            .build()
            .unwrap();

        let profile = options.profile("api");
        assert_eq!(profile.name, "api");
        assert_eq!(profile.cool_down, 60.0);
        assert_eq!(profile.evaluation_window, 30.0);
    }

    #[test]
    fn map_round_trips_through_overlay() {
        let options = CircuitOptions::builder()
            .cool_down(Duration::from_secs(42))
            .rate_threshold(0.75)
            .sample_threshold(7)
            .build()
            .unwrap();

        let map = options.to_map();
        let overlaid = CircuitOptions::default().overlaid_profile("api", &map);

        assert_eq!(overlaid.cool_down, 42.0);
        assert_eq!(overlaid.rate_threshold, 0.75);
        assert_eq!(overlaid.sample_threshold, 7);
    }
}
