// Copyright (c) Microsoft Corporation.

//! The circuit state machine and execution pipeline.
//!
//! A [`Circuit`] wraps calls to one unreliable dependency. Each execution
//! walks the same pipeline:
//!
//! 1. Resolve the circuit against the registry (first execution wins the
//!    name) and persist its options for external observers.
//! 2. Consult the cache when a cache key is given; a fresh value
//!    short-circuits everything else.
//! 3. Gate on the status derived from storage: open or locked-open circuits
//!    skip the work (returning a stale cached value when one exists).
//! 4. Run the user work.
//! 5. Record the outcome, perform any state transition through storage's
//!    compare-and-set operations, emit events, and write back to the cache.
//!
//! Transitions are decided against the status snapshot observed before the
//! work ran; the storage CAS contract resolves races so that each
//! closed-to-open crossing emits exactly one `circuit_opened` event no matter
//! how many threads fail simultaneously.

mod options;

use std::fmt;
use std::sync::{Arc, OnceLock};

use tick::Clock;

use fusebox_store::{CircuitProfile, Lock, SampleEntry, Status, Store, StoreAction, wall_seconds};

pub use options::{CircuitOptions, CircuitOptionsBuilder, OptionsError};

use crate::cache::{Cache, NullCache};
use crate::errors::{BoxError, Error};
use crate::events::{CacheAction, Event, Notifier, Notify};
use crate::jitter::JitterSource;
use crate::registry::Registry;
use crate::storage::NullStore;

/// Suffix of the sibling cache entry holding a value's refresh deadline.
const REFRESH_SUFFIX: &str = ".refresh";

pub(crate) struct CircuitShared {
    pub(crate) name: String,
    pub(crate) options: CircuitOptions,
    pub(crate) profile: CircuitProfile,
    pub(crate) storage: Arc<dyn Store>,
    pub(crate) cache: Arc<dyn Cache>,
    pub(crate) notifier: Arc<dyn Notify>,
    pub(crate) clock: Clock,
    pub(crate) jitter: JitterSource,
}

impl fmt::Debug for CircuitShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitShared")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

struct CircuitInner {
    seed: Arc<CircuitShared>,
    resolved: OnceLock<Arc<CircuitShared>>,
    registry: Option<Arc<Registry>>,
}

/// A named unit of fault policy wrapping calls to one unreliable dependency.
///
/// Handles are cheap to clone and share one underlying circuit. A handle is
/// advisory until its first execution: if another circuit with the same name
/// has already executed within the same instance, that circuit's options and
/// state win and this handle attaches to them.
#[derive(Clone)]
pub struct Circuit {
    inner: Arc<CircuitInner>,
}

impl fmt::Debug for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Circuit").field("name", &self.current().name).finish_non_exhaustive()
    }
}

/// Builder for standalone circuits.
///
/// Circuits spawned through a [`Fusebox`][crate::Fusebox] instance share its
/// hardened storage, cache, notifier, and registry; this builder is for
/// wiring a circuit by hand, and uses whatever collaborators it is given
/// without hardening them.
pub struct CircuitBuilder {
    name: String,
    clock: Clock,
    options: CircuitOptions,
    storage: Option<Arc<dyn Store>>,
    cache: Option<Arc<dyn Cache>>,
    notifier: Option<Arc<dyn Notify>>,
    jitter: JitterSource,
}

impl fmt::Debug for CircuitBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBuilder").field("name", &self.name).finish_non_exhaustive()
    }
}

impl CircuitBuilder {
    /// Sets the circuit's options.
    #[must_use]
    pub fn options(mut self, options: CircuitOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the storage backend (used as given, without hardening).
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn Store>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Sets the cache backend (used as given, without hardening).
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the event notifier.
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn Notify>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    #[cfg(test)]
    #[must_use]
    pub(crate) fn jitter(mut self, jitter: JitterSource) -> Self {
        self.jitter = jitter;
        self
    }

    /// Builds the circuit.
    #[must_use]
    pub fn build(mut self) -> Circuit {
        let storage = self
            .storage
            .take()
            .unwrap_or_else(|| Arc::new(fusebox_memory::MemoryStore::new(&self.clock)));
        let cache = self.cache.take().unwrap_or_else(|| Arc::new(NullCache::new()));
        let notifier = self.notifier.take().unwrap_or_else(|| Arc::new(Notifier::log()));

        self.into_circuit(storage, cache, notifier, None)
    }

    pub(crate) fn into_circuit(
        self,
        storage: Arc<dyn Store>,
        cache: Arc<dyn Cache>,
        notifier: Arc<dyn Notify>,
        registry: Option<Arc<Registry>>,
    ) -> Circuit {
        let profile = self.options.profile(&self.name);

        let shared = Arc::new(CircuitShared {
            name: self.name,
            options: self.options,
            profile,
            storage,
            cache,
            notifier,
            clock: self.clock,
            jitter: self.jitter,
        });

        Circuit {
            inner: Arc::new(CircuitInner {
                seed: shared,
                resolved: OnceLock::new(),
                registry,
            }),
        }
    }
}

struct CacheBinding<'a, T> {
    key: &'a str,
    decode: fn(&[u8]) -> Option<T>,
    encode: fn(&T) -> Option<Vec<u8>>,
}

impl Circuit {
    /// Starts building a standalone circuit with default collaborators
    /// (in-process storage, no cache, log notifier).
    #[must_use]
    pub fn builder(name: impl Into<String>, clock: &Clock) -> CircuitBuilder {
        CircuitBuilder {
            name: name.into(),
            clock: clock.clone(),
            options: CircuitOptions::default(),
            storage: None,
            cache: None,
            notifier: None,
            jitter: JitterSource::default(),
        }
    }

    /// The circuit's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.current().name
    }

    /// The options this handle currently sees.
    ///
    /// Before the first execution these are the handle's own options; after
    /// it, the options of whichever circuit won the name.
    #[must_use]
    pub fn options(&self) -> &CircuitOptions {
        &self.current().options
    }

    /// Runs user work under this circuit's policy.
    ///
    /// # Errors
    ///
    /// - [`Error::Open`] when the circuit is open or locked open.
    /// - [`Error::Tripped`] when the work failed and that failure opened
    ///   (or re-opened) the circuit.
    /// - [`Error::Failure`] when the work failed with a counted error.
    /// - [`Error::Passthrough`] when the work failed with an error the
    ///   circuit does not count; the original error is carried unwrapped.
    pub fn run<T, E, F>(&self, work: F) -> Result<T, Error>
    where
        E: Into<BoxError>,
        F: FnOnce() -> Result<T, E>,
    {
        self.execute(None, work)
    }

    /// Runs user work with read-through caching.
    ///
    /// The cache is consulted before the circuit's own state: a fresh cached
    /// value is returned without running the work, and a stale one is
    /// returned as a fallback when the circuit is open or the work fails
    /// (the failure is still recorded). Successful results are written back
    /// along with a jittered refresh marker.
    ///
    /// # Errors
    ///
    /// As for [`run`][Self::run]; a usable cached value converts open-circuit
    /// rejections and counted failures into successes.
    pub fn run_cached<T, E, F>(&self, key: &str, work: F) -> Result<T, Error>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
        E: Into<BoxError>,
        F: FnOnce() -> Result<T, E>,
    {
        self.execute(
            Some(CacheBinding {
                key,
                decode: |bytes| serde_json::from_slice(bytes).ok(),
                encode: |value| serde_json::to_vec(value).ok(),
            }),
            work,
        )
    }

    /// Pins the circuit open: every execution is rejected until
    /// [`unlock`][Self::unlock] or [`reset`][Self::reset].
    ///
    /// # Errors
    ///
    /// Fails when storage rejects the administrative write.
    pub fn lock_open(&self) -> fusebox_store::Result<()> {
        let shared = self.current();
        shared.storage.lock(&shared.profile, Lock::Open)
    }

    /// Pins the circuit closed: every execution proceeds regardless of the
    /// failure history.
    ///
    /// # Errors
    ///
    /// Fails when storage rejects the administrative write.
    pub fn lock_closed(&self) -> fusebox_store::Result<()> {
        let shared = self.current();
        shared.storage.lock(&shared.profile, Lock::Closed)
    }

    /// Clears an administrative lock.
    ///
    /// # Errors
    ///
    /// Fails when storage rejects the administrative write.
    pub fn unlock(&self) -> fusebox_store::Result<()> {
        let shared = self.current();
        shared.storage.unlock(&shared.profile)
    }

    /// Removes all stored state, returning the circuit to its initial
    /// closed, unlocked, history-free condition.
    ///
    /// # Errors
    ///
    /// Fails when storage rejects the administrative write.
    pub fn reset(&self) -> fusebox_store::Result<()> {
        let shared = self.current();
        shared.storage.reset(&shared.profile)
    }

    /// Returns the current status snapshot.
    ///
    /// Before the first execution, thresholds persisted by another process
    /// supplement this handle's own options so external observers see
    /// consistent values.
    ///
    /// # Errors
    ///
    /// Fails when storage cannot produce a status (hardened storage returns
    /// a stub instead of failing).
    pub fn status(&self) -> fusebox_store::Result<Status> {
        let shared = self.current();
        shared.storage.status(&self.observed_profile(shared))
    }

    /// Returns the full retained sample, oldest first.
    ///
    /// # Errors
    ///
    /// Fails when storage cannot read the sample.
    pub fn history(&self) -> fusebox_store::Result<Vec<SampleEntry>> {
        let shared = self.current();
        shared.storage.history(&self.observed_profile(shared))
    }

    /// The shared state this handle currently sees, without resolving.
    fn current(&self) -> &Arc<CircuitShared> {
        self.inner.resolved.get().unwrap_or(&self.inner.seed)
    }

    #[cfg(test)]
    pub(crate) fn current_for_tests(&self) -> &Arc<CircuitShared> {
        self.current()
    }

    /// Resolves this handle against the registry, persisting options on the
    /// winning circuit's first execution.
    fn resolve(&self) -> &Arc<CircuitShared> {
        self.inner.resolved.get_or_init(|| {
            let shared = match &self.inner.registry {
                Some(registry) => registry.resolve(Arc::clone(&self.inner.seed)),
                None => Arc::clone(&self.inner.seed),
            };

            if Arc::ptr_eq(&shared, &self.inner.seed) {
                if let Err(error) = shared.storage.set_options(&shared.profile, &shared.options.to_map()) {
                    shared.notifier.notify(Event::StorageFailure {
                        circuit: Some(shared.name.clone()),
                        action: StoreAction::SetOptions,
                        error: error.to_string(),
                    });
                }
            }

            shared
        })
    }

    /// The profile used for observation: once executed, the circuit's own;
    /// before that, the handle's options supplemented from storage.
    fn observed_profile(&self, shared: &CircuitShared) -> CircuitProfile {
        if self.inner.resolved.get().is_some() {
            return shared.profile.clone();
        }

        match shared.storage.get_options(&shared.profile) {
            Ok(Some(stored)) => shared.options.overlaid_profile(&shared.name, &stored),
            _ => shared.profile.clone(),
        }
    }

    fn execute<T, E, F>(&self, cache: Option<CacheBinding<'_, T>>, work: F) -> Result<T, Error>
    where
        E: Into<BoxError>,
        F: FnOnce() -> Result<T, E>,
    {
        let shared = self.resolve();
        let profile = &shared.profile;

        // The disable switch substitutes no-op storage: user work always
        // runs and no state is recorded, but the cache is still consulted.
        let null_store;
        let storage: &dyn Store = if crate::disabled() {
            null_store = NullStore::new(&shared.clock);
            &null_store
        } else {
            shared.storage.as_ref()
        };

        let now = wall_seconds(&shared.clock);

        let mut cached_bytes = None;
        if let Some(binding) = &cache {
            let (bytes, fresh) = self.cache_lookup(shared, binding.key, now);

            if let Some(bytes) = bytes {
                if fresh && let Some(value) = (binding.decode)(&bytes) {
                    return Ok(value);
                }
                cached_bytes = Some(bytes);
            }
        }

        let status = match storage.status(profile) {
            Ok(status) => status,
            Err(error) => {
                self.storage_failure(shared, StoreAction::Status, &error);
                Status::stub(profile, now)
            }
        };

        if !status.can_run() {
            shared.notifier.notify(Event::CircuitSkipped {
                circuit: shared.name.clone(),
            });

            if let Some(binding) = &cache
                && let Some(value) = cached_bytes.as_deref().and_then(|bytes| (binding.decode)(bytes))
            {
                return Ok(value);
            }

            return Err(self.surface(
                shared,
                Error::Open {
                    circuit: shared.name.clone(),
                },
            ));
        }

        match work() {
            Ok(value) => {
                let at = wall_seconds(&shared.clock);

                if let Err(error) = storage.entry(profile, at, true, None) {
                    self.storage_failure(shared, StoreAction::Entry, &error);
                }

                if status.half_open() && self.transition(shared, StoreAction::Close, storage.close(profile)) {
                    shared.notifier.notify(Event::CircuitClosed {
                        circuit: shared.name.clone(),
                    });
                }

                shared.notifier.notify(Event::CircuitSuccess {
                    circuit: shared.name.clone(),
                });

                if let Some(binding) = &cache {
                    self.cache_store(shared, binding.key, (binding.encode)(&value), at);
                }

                Ok(value)
            }
            Err(error) => {
                let error: BoxError = error.into();

                if !shared.options.counts_as_failure(error.as_ref()) {
                    return Err(Error::Passthrough(error));
                }

                let at = wall_seconds(&shared.clock);

                let new_status = match storage.entry(profile, at, false, Some(&status)) {
                    Ok(updated) => updated,
                    Err(storage_error) => {
                        self.storage_failure(shared, StoreAction::Entry, &storage_error);
                        None
                    }
                }
                .unwrap_or_else(|| Status::stub(profile, at));

                shared.notifier.notify(Event::CircuitFailure {
                    circuit: shared.name.clone(),
                    error: error.to_string(),
                    status: new_status.clone(),
                });

                let mut tripped = false;
                if status.half_open() {
                    let previous = status.opened_at.unwrap_or(at);
                    if self.transition(shared, StoreAction::Reopen, storage.reopen(profile, at, previous)) {
                        tripped = true;
                        shared.notifier.notify(Event::CircuitReopened {
                            circuit: shared.name.clone(),
                            error: error.to_string(),
                        });
                    }
                } else if new_status.fails_threshold()
                    && self.transition(shared, StoreAction::Open, storage.open(profile, at))
                {
                    tripped = true;
                    shared.notifier.notify(Event::CircuitOpened {
                        circuit: shared.name.clone(),
                        error: error.to_string(),
                    });
                }

                // Fallback-on-failure: a cached value beats surfacing the
                // error. The failure stays recorded either way.
                if let Some(binding) = &cache
                    && let Some(value) = cached_bytes.as_deref().and_then(|bytes| (binding.decode)(bytes))
                {
                    return Ok(value);
                }

                let surfaced = if tripped {
                    Error::Tripped {
                        circuit: shared.name.clone(),
                        source: error,
                    }
                } else {
                    Error::Failure {
                        circuit: shared.name.clone(),
                        source: error,
                    }
                };

                Err(self.surface(shared, surfaced))
            }
        }
    }

    /// Reads the cached value and decides freshness from the refresh marker.
    fn cache_lookup(&self, shared: &CircuitShared, key: &str, now: f64) -> (Option<Vec<u8>>, bool) {
        let bytes = match shared.cache.read(key) {
            Ok(bytes) => bytes,
            Err(error) => {
                self.cache_failure(shared, key, CacheAction::Read, &error);
                None
            }
        };

        let Some(bytes) = bytes else {
            shared.notifier.notify(Event::CircuitCacheMiss {
                circuit: shared.name.clone(),
                key: key.to_owned(),
            });
            return (None, false);
        };

        shared.notifier.notify(Event::CircuitCacheHit {
            circuit: shared.name.clone(),
            key: key.to_owned(),
        });

        let fresh = if shared.options.cache_refreshes_after.is_some() {
            let marker = match shared.cache.read(&format!("{key}{REFRESH_SUFFIX}")) {
                Ok(marker) => marker,
                Err(error) => {
                    self.cache_failure(shared, key, CacheAction::Read, &error);
                    None
                }
            };

            marker
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .and_then(|raw| raw.parse::<f64>().ok())
                .is_some_and(|refresh_at| {
                    refresh_at + shared.jitter.offset(shared.options.refresh_jitter_seconds()) >= now
                })
        } else {
            // Without a refresh age, values stay fresh until they expire.
            true
        };

        (Some(bytes), fresh)
    }

    /// Writes the value and its refresh marker back to the cache.
    fn cache_store(&self, shared: &CircuitShared, key: &str, bytes: Option<Vec<u8>>, now: f64) {
        let Some(bytes) = bytes else {
            shared.notifier.notify(Event::CacheFailure {
                key: Some(key.to_owned()),
                action: CacheAction::Write,
                error: "value could not be serialized".to_owned(),
            });
            return;
        };

        let expires_in = shared.options.cache_expires_in;

        if let Err(error) = shared.cache.write(key, &bytes, expires_in) {
            self.cache_failure(shared, key, CacheAction::Write, &error);
            return;
        }

        if let Some(refresh) = shared.options.cache_refreshes_after {
            let marker = (now + refresh.as_secs_f64()).to_string();
            if let Err(error) = shared.cache.write(&format!("{key}{REFRESH_SUFFIX}"), marker.as_bytes(), expires_in) {
                self.cache_failure(shared, key, CacheAction::Write, &error);
            }
        }

        shared.notifier.notify(Event::CircuitCacheWrite {
            circuit: shared.name.clone(),
            key: key.to_owned(),
        });
    }

    /// Unwraps a transition result, absorbing storage failures as "no
    /// transition happened".
    fn transition(&self, shared: &CircuitShared, action: StoreAction, result: fusebox_store::Result<bool>) -> bool {
        match result {
            Ok(transitioned) => transitioned,
            Err(error) => {
                self.storage_failure(shared, action, &error);
                false
            }
        }
    }

    fn storage_failure(&self, shared: &CircuitShared, action: StoreAction, error: &fusebox_store::Error) {
        shared.notifier.notify(Event::StorageFailure {
            circuit: Some(shared.name.clone()),
            action,
            error: error.to_string(),
        });
    }

    fn cache_failure(&self, shared: &CircuitShared, key: &str, action: CacheAction, error: &crate::cache::Error) {
        shared.notifier.notify(Event::CacheFailure {
            key: Some(key.to_owned()),
            action,
            error: error.to_string(),
        });
    }

    fn surface(&self, shared: &CircuitShared, error: Error) -> Error {
        match &shared.options.error_mapper {
            Some(mapper) => mapper(error),
            None => error,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use tick::ClockControl;

    use fusebox_store::testing::MockStore;

    use super::*;
    use crate::events::{EventName, Listener, MemoryListener};

    #[derive(Debug, thiserror::Error)]
    #[error("dependency failed")]
    struct DependencyError;

    fn control() -> ClockControl {
        ClockControl::new_at(SystemTime::UNIX_EPOCH + Duration::from_secs(1000))
    }

    fn recording_circuit(control: &ClockControl) -> (Circuit, Arc<MemoryListener>) {
        let listener = Arc::new(MemoryListener::new());
        let notifier = Arc::new(Notifier::new(vec![Arc::clone(&listener) as Arc<dyn Listener>]));

        let circuit = Circuit::builder("api", &control.to_clock()).notifier(notifier).build();

        (circuit, listener)
    }

    #[test]
    fn successful_run_returns_the_value_and_records_success() {
        let control = control();
        let (circuit, listener) = recording_circuit(&control);

        let value = circuit.run(|| Ok::<_, DependencyError>(42)).unwrap();

        assert_eq!(value, 42);
        assert_eq!(listener.names(), vec![EventName::CircuitSuccess]);
        assert_eq!(circuit.history().unwrap().len(), 1);
        assert!(circuit.history().unwrap()[0].success);
    }

    #[test]
    fn failures_below_threshold_keep_the_circuit_closed() {
        let control = control();
        let (circuit, listener) = recording_circuit(&control);

        let error = circuit.run(|| Err::<(), _>(DependencyError)).unwrap_err();

        assert!(matches!(error, Error::Failure { .. }));
        assert!(circuit.status().unwrap().closed());
        assert_eq!(listener.count(EventName::CircuitOpened), 0);
    }

    #[test]
    fn the_tripping_failure_surfaces_as_tripped() {
        let control = control();
        let (circuit, listener) = recording_circuit(&control);

        for _ in 0..2 {
            let error = circuit.run(|| Err::<(), _>(DependencyError)).unwrap_err();
            assert!(matches!(error, Error::Failure { .. }));
        }

        let error = circuit.run(|| Err::<(), _>(DependencyError)).unwrap_err();
        assert!(error.is_tripped(), "third failure should trip: {error:?}");
        assert_eq!(listener.count(EventName::CircuitOpened), 1);

        let error = circuit.run(|| Ok::<_, DependencyError>(1)).unwrap_err();
        assert!(error.is_open());
        assert_eq!(listener.count(EventName::CircuitSkipped), 1);
    }

    #[test]
    fn passthrough_errors_are_not_recorded() {
        let control = control();
        let options = CircuitOptions::builder()
            .errors(crate::errors::error_kind::<DependencyError>())
            .build()
            .unwrap();
        let circuit = Circuit::builder("filtered", &control.to_clock()).options(options).build();

        let error = circuit.run(|| Err::<(), _>(std::fmt::Error)).unwrap_err();
        assert!(matches!(error, Error::Passthrough(_)));
        assert!(circuit.history().unwrap().is_empty());
    }

    #[test]
    fn error_mapper_reshapes_surfaced_errors() {
        let control = control();
        let options = CircuitOptions::builder()
            .error_mapper(Arc::new(|error| match error {
                Error::Failure { circuit, source } => Error::Tripped { circuit, source },
                other => other,
            }))
            .build()
            .unwrap();

        let circuit = Circuit::builder("mapped", &control.to_clock()).options(options).build();

        let error = circuit.run(|| Err::<(), _>(DependencyError)).unwrap_err();
        assert!(error.is_tripped());
    }

    #[test]
    fn registry_first_execution_wins_the_name() {
        let control = control();
        let clock = control.to_clock();
        let registry = Arc::new(Registry::new());
        let storage: Arc<dyn Store> = Arc::new(fusebox_memory::MemoryStore::new(&clock));
        let notifier: Arc<dyn Notify> = Arc::new(Notifier::new(Vec::new()));

        let build = |threshold: u32| {
            let options = CircuitOptions::builder().sample_threshold(threshold).build().unwrap();
            Circuit::builder("shared", &clock).options(options).into_circuit(
                Arc::clone(&storage),
                Arc::new(NullCache::new()),
                Arc::clone(&notifier),
                Some(Arc::clone(&registry)),
            )
        };

        let first = build(7);
        let second = build(9);

        // Neither has executed; each sees its own options.
        assert_eq!(first.options().sample_threshold(), 7);
        assert_eq!(second.options().sample_threshold(), 9);

        second.run(|| Ok::<_, DependencyError>(())).unwrap();
        first.run(|| Ok::<_, DependencyError>(())).unwrap();

        // The first to execute won; the other handle attached to it.
        assert_eq!(first.options().sample_threshold(), 9);
        assert_eq!(second.options().sample_threshold(), 9);
    }

    #[test]
    fn first_execution_persists_options() {
        let control = control();
        let clock = control.to_clock();
        let store = Arc::new(MockStore::fault_tolerant(&clock));

        let circuit = Circuit::builder("api", &clock)
            .storage(Arc::clone(&store) as Arc<dyn Store>)
            .build();

        circuit.run(|| Ok::<_, DependencyError>(())).unwrap();
        circuit.run(|| Ok::<_, DependencyError>(())).unwrap();

        assert_eq!(store.calls(StoreAction::SetOptions), 1);
        let stored = store.get_options(&CircuitProfile::new("api")).unwrap().unwrap();
        assert!(stored.contains_key("cool_down"));
    }

    #[test]
    fn status_before_execution_is_supplemented_from_storage() {
        let control = control();
        let clock = control.to_clock();
        let storage: Arc<dyn Store> = Arc::new(fusebox_memory::MemoryStore::new(&clock));

        let options = CircuitOptions::builder().cool_down(Duration::from_secs(500)).build().unwrap();
        let writer = Circuit::builder("api", &clock)
            .storage(Arc::clone(&storage))
            .options(options)
            .build();
        writer.run(|| Ok::<_, DependencyError>(())).unwrap();

        // A fresh handle with default options sees the persisted cool-down
        // until it executes.
        let reader = Circuit::builder("api", &clock).storage(Arc::clone(&storage)).build();
        let status = reader.status().unwrap();
        assert!((status.cool_down - 500.0).abs() < f64::EPSILON);
    }

    mod cache {
        use super::*;
        use crate::cache::MemoryCache;

        fn cached_circuit(control: &ClockControl, jitter: JitterSource) -> (Circuit, Arc<MemoryListener>) {
            let clock = control.to_clock();
            let listener = Arc::new(MemoryListener::new());
            let notifier = Arc::new(Notifier::new(vec![Arc::clone(&listener) as Arc<dyn Listener>]));

            let options = CircuitOptions::builder()
                .cache_expires_in(Some(Duration::from_secs(86_400)))
                .cache_refreshes_after(Some(Duration::from_secs(900)))
                .cache_refresh_jitter(Duration::ZERO)
                .build()
                .unwrap();

            let circuit = Circuit::builder("cached", &clock)
                .options(options)
                .cache(Arc::new(MemoryCache::new(&clock)))
                .notifier(notifier)
                .jitter(jitter)
                .build();

            (circuit, listener)
        }

        #[test]
        fn fresh_cached_values_short_circuit_the_work() {
            let control = control();
            let (circuit, listener) = cached_circuit(&control, JitterSource::pinned(0.5));

            let first = circuit.run_cached("k", || Ok::<_, DependencyError>("v".to_owned())).unwrap();
            assert_eq!(first, "v");
            assert_eq!(listener.count(EventName::CircuitCacheMiss), 1);
            assert_eq!(listener.count(EventName::CircuitCacheWrite), 1);

            let second = circuit
                .run_cached("k", || -> Result<String, DependencyError> {
                    unreachable!("fresh cache should skip the work")
                })
                .unwrap();
            assert_eq!(second, "v");
            assert_eq!(listener.count(EventName::CircuitCacheHit), 1);
        }

        #[test]
        fn stale_values_rerun_the_work_and_refresh() {
            let control = control();
            let (circuit, _listener) = cached_circuit(&control, JitterSource::pinned(0.5));

            circuit.run_cached("k", || Ok::<_, DependencyError>("old".to_owned())).unwrap();

            control.advance(Duration::from_secs(901));

            let refreshed = circuit.run_cached("k", || Ok::<_, DependencyError>("new".to_owned())).unwrap();
            assert_eq!(refreshed, "new");
        }

        #[test]
        fn stale_value_is_returned_when_the_work_fails() {
            let control = control();
            let (circuit, _listener) = cached_circuit(&control, JitterSource::pinned(0.5));

            circuit.run_cached("k", || Ok::<_, DependencyError>("old".to_owned())).unwrap();

            control.advance(Duration::from_secs(901));

            let fallback = circuit
                .run_cached("k", || Err::<String, _>(DependencyError))
                .unwrap();
            assert_eq!(fallback, "old");

            let history = circuit.history().unwrap();
            assert!(!history.last().unwrap().success, "failure must still be recorded");
        }

        #[test]
        fn jitter_can_hold_a_due_value_fresh() {
            let control = control();
            // Maximum positive jitter: +20% of 900s = +180s.
            let (circuit, _listener) = {
                let clock = control.to_clock();
                let options = CircuitOptions::builder()
                    .cache_refreshes_after(Some(Duration::from_secs(900)))
                    .build()
                    .unwrap();
                let listener = Arc::new(MemoryListener::new());
                let notifier = Arc::new(Notifier::new(vec![Arc::clone(&listener) as Arc<dyn Listener>]));
                let circuit = Circuit::builder("jittered", &clock)
                    .options(options)
                    .cache(Arc::new(MemoryCache::new(&clock)))
                    .notifier(notifier)
                    .jitter(JitterSource::pinned(1.0))
                    .build();
                (circuit, listener)
            };

            circuit.run_cached("k", || Ok::<_, DependencyError>(1)).unwrap();

            // 1000s past the marker but within the +180s jitter window.
            control.advance(Duration::from_secs(1000));

            let value = circuit
                .run_cached("k", || -> Result<i32, DependencyError> {
                    unreachable!("jitter should keep the value fresh")
                })
                .unwrap();
            assert_eq!(value, 1);
        }
    }
}
