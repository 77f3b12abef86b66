// Copyright (c) Microsoft Corporation.

//! Event vocabulary and notification fan-out.
//!
//! Every observable thing a circuit does is described by one [`Event`] from a
//! closed vocabulary and fanned out to an immutable set of [`Listener`]s
//! through a [`Notifier`]. Listeners are observers only: a listener that
//! fails (or is slow) must never affect circuit behavior, so the notifier
//! catches listener errors and routes them to the log.
//!
//! [`FilteredNotifier`] narrows the vocabulary a wrapped notifier sees; the
//! storage-guarding circuits use it to drop their own success chatter.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use fusebox_store::{Status, StoreAction};

use crate::BoxError;

/// The name of an event, separate from its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum EventName {
    /// User work completed successfully.
    CircuitSuccess,
    /// User work failed with a counted error.
    CircuitFailure,
    /// A circuit transitioned closed to open.
    CircuitOpened,
    /// A failed half-open probe re-armed an open circuit.
    CircuitReopened,
    /// A successful half-open probe closed a circuit.
    CircuitClosed,
    /// Execution was skipped because the circuit cannot run.
    CircuitSkipped,
    /// A cached value was found for the execution's cache key.
    CircuitCacheHit,
    /// No cached value was found for the execution's cache key.
    CircuitCacheMiss,
    /// A value was written back to the cache.
    CircuitCacheWrite,
    /// A cache backend failed; the failure was absorbed.
    CacheFailure,
    /// A storage backend failed; the failure was absorbed.
    StorageFailure,
}

impl EventName {
    /// Every event name, in a stable order.
    pub const ALL: [Self; 11] = [
        Self::CircuitSuccess,
        Self::CircuitFailure,
        Self::CircuitOpened,
        Self::CircuitReopened,
        Self::CircuitClosed,
        Self::CircuitSkipped,
        Self::CircuitCacheHit,
        Self::CircuitCacheMiss,
        Self::CircuitCacheWrite,
        Self::CacheFailure,
        Self::StorageFailure,
    ];

    /// The snake_case name used in logs and filters.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CircuitSuccess => "circuit_success",
            Self::CircuitFailure => "circuit_failure",
            Self::CircuitOpened => "circuit_opened",
            Self::CircuitReopened => "circuit_reopened",
            Self::CircuitClosed => "circuit_closed",
            Self::CircuitSkipped => "circuit_skipped",
            Self::CircuitCacheHit => "circuit_cache_hit",
            Self::CircuitCacheMiss => "circuit_cache_miss",
            Self::CircuitCacheWrite => "circuit_cache_write",
            Self::CacheFailure => "cache_failure",
            Self::StorageFailure => "storage_failure",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies a cache operation in failure events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// A cache read.
    Read,
    /// A cache write.
    Write,
}

impl fmt::Display for CacheAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}

/// One observable occurrence inside a circuit or its collaborators.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Event {
    /// User work completed successfully.
    CircuitSuccess {
        /// The circuit that ran.
        circuit: String,
    },

    /// User work failed with a counted error.
    CircuitFailure {
        /// The circuit that recorded the failure.
        circuit: String,
        /// Rendered user error.
        error: String,
        /// Status computed after recording the failure.
        status: Status,
    },

    /// A circuit transitioned closed to open.
    CircuitOpened {
        /// The circuit that tripped.
        circuit: String,
        /// Rendered user error that tripped it.
        error: String,
    },

    /// A failed half-open probe re-armed an open circuit.
    CircuitReopened {
        /// The circuit that re-opened.
        circuit: String,
        /// Rendered user error the probe failed with.
        error: String,
    },

    /// A successful half-open probe closed a circuit.
    CircuitClosed {
        /// The circuit that closed.
        circuit: String,
    },

    /// Execution was skipped because the circuit cannot run.
    CircuitSkipped {
        /// The circuit that rejected the execution.
        circuit: String,
    },

    /// A cached value was found for the execution's cache key.
    CircuitCacheHit {
        /// The circuit that consulted the cache.
        circuit: String,
        /// The user-supplied cache key.
        key: String,
    },

    /// No cached value was found for the execution's cache key.
    CircuitCacheMiss {
        /// The circuit that consulted the cache.
        circuit: String,
        /// The user-supplied cache key.
        key: String,
    },

    /// A value was written back to the cache.
    CircuitCacheWrite {
        /// The circuit that wrote the value.
        circuit: String,
        /// The user-supplied cache key.
        key: String,
    },

    /// A cache backend failed; the failure was absorbed.
    CacheFailure {
        /// The cache key involved, when known.
        key: Option<String>,
        /// The failed operation.
        action: CacheAction,
        /// Rendered backend error.
        error: String,
    },

    /// A storage backend failed; the failure was absorbed.
    StorageFailure {
        /// The circuit involved, when the operation had one.
        circuit: Option<String>,
        /// The failed operation.
        action: StoreAction,
        /// Rendered backend error.
        error: String,
    },
}

impl Event {
    /// The name of this event.
    #[must_use]
    pub fn name(&self) -> EventName {
        match self {
            Self::CircuitSuccess { .. } => EventName::CircuitSuccess,
            Self::CircuitFailure { .. } => EventName::CircuitFailure,
            Self::CircuitOpened { .. } => EventName::CircuitOpened,
            Self::CircuitReopened { .. } => EventName::CircuitReopened,
            Self::CircuitClosed { .. } => EventName::CircuitClosed,
            Self::CircuitSkipped { .. } => EventName::CircuitSkipped,
            Self::CircuitCacheHit { .. } => EventName::CircuitCacheHit,
            Self::CircuitCacheMiss { .. } => EventName::CircuitCacheMiss,
            Self::CircuitCacheWrite { .. } => EventName::CircuitCacheWrite,
            Self::CacheFailure { .. } => EventName::CacheFailure,
            Self::StorageFailure { .. } => EventName::StorageFailure,
        }
    }

    /// The circuit this event belongs to, when it has one.
    #[must_use]
    pub fn circuit(&self) -> Option<&str> {
        match self {
            Self::CircuitSuccess { circuit }
            | Self::CircuitFailure { circuit, .. }
            | Self::CircuitOpened { circuit, .. }
            | Self::CircuitReopened { circuit, .. }
            | Self::CircuitClosed { circuit }
            | Self::CircuitSkipped { circuit }
            | Self::CircuitCacheHit { circuit, .. }
            | Self::CircuitCacheMiss { circuit, .. }
            | Self::CircuitCacheWrite { circuit, .. } => Some(circuit),
            Self::CacheFailure { .. } => None,
            Self::StorageFailure { circuit, .. } => circuit.as_deref(),
        }
    }
}

/// A receiver of circuit events.
///
/// Listener failures are caught by the notifier, logged, and never propagate
/// into circuit execution.
pub trait Listener: Send + Sync {
    /// Handles one event.
    ///
    /// # Errors
    ///
    /// Any error returned is logged by the notifier and otherwise ignored.
    fn handle(&self, event: &Event) -> Result<(), BoxError>;
}

/// A sink for events; implemented by [`Notifier`] and [`FilteredNotifier`].
pub trait Notify: Send + Sync + fmt::Debug {
    /// Delivers one event.
    fn notify(&self, event: Event);
}

/// Fans events out to an immutable set of listeners.
#[derive(Clone)]
pub struct Notifier {
    listeners: Arc<[Arc<dyn Listener>]>,
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier").field("listeners", &self.listeners.len()).finish()
    }
}

impl Notifier {
    /// Creates a notifier over the given listeners.
    #[must_use]
    pub fn new(listeners: Vec<Arc<dyn Listener>>) -> Self {
        Self {
            listeners: listeners.into(),
        }
    }

    /// Creates the default notifier, which logs every event.
    #[must_use]
    pub fn log() -> Self {
        Self::new(vec![Arc::new(LogListener)])
    }
}

impl Notify for Notifier {
    fn notify(&self, event: Event) {
        for listener in self.listeners.iter() {
            if let Err(error) = listener.handle(&event) {
                tracing::error!(event = %event.name(), %error, "event listener failed");
            }
        }
    }
}

/// Passes only a whitelisted subset of events to a wrapped notifier.
pub struct FilteredNotifier {
    inner: Arc<dyn Notify>,
    allowed: Vec<EventName>,
}

impl fmt::Debug for FilteredNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilteredNotifier").field("allowed", &self.allowed).finish_non_exhaustive()
    }
}

impl FilteredNotifier {
    /// Creates a notifier passing only the given event names.
    #[must_use]
    pub fn new(inner: Arc<dyn Notify>, allowed: impl IntoIterator<Item = EventName>) -> Self {
        Self {
            inner,
            allowed: allowed.into_iter().collect(),
        }
    }

    /// Creates a notifier passing everything except the given event names.
    #[must_use]
    pub fn excluding(inner: Arc<dyn Notify>, excluded: impl IntoIterator<Item = EventName>) -> Self {
        let excluded: Vec<_> = excluded.into_iter().collect();
        Self::new(inner, EventName::ALL.into_iter().filter(|name| !excluded.contains(name)))
    }
}

impl Notify for FilteredNotifier {
    fn notify(&self, event: Event) {
        if self.allowed.contains(&event.name()) {
            self.inner.notify(event);
        }
    }
}

/// The default listener: renders every event as a structured log record.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogListener;

impl Listener for LogListener {
    fn handle(&self, event: &Event) -> Result<(), BoxError> {
        match event {
            Event::CircuitSuccess { circuit } => {
                tracing::debug!(%circuit, "circuit_success");
            }
            Event::CircuitFailure { circuit, error, status } => {
                tracing::warn!(
                    %circuit,
                    %error,
                    failure_rate = status.failure_rate,
                    sample_size = status.sample_size,
                    "circuit_failure"
                );
            }
            Event::CircuitOpened { circuit, error } => {
                tracing::error!(%circuit, %error, "circuit_opened");
            }
            Event::CircuitReopened { circuit, error } => {
                tracing::error!(%circuit, %error, "circuit_reopened");
            }
            Event::CircuitClosed { circuit } => {
                tracing::info!(%circuit, "circuit_closed");
            }
            Event::CircuitSkipped { circuit } => {
                tracing::warn!(%circuit, "circuit_skipped");
            }
            Event::CircuitCacheHit { circuit, key } => {
                tracing::debug!(%circuit, %key, "circuit_cache_hit");
            }
            Event::CircuitCacheMiss { circuit, key } => {
                tracing::debug!(%circuit, %key, "circuit_cache_miss");
            }
            Event::CircuitCacheWrite { circuit, key } => {
                tracing::debug!(%circuit, %key, "circuit_cache_write");
            }
            Event::CacheFailure { key, action, error } => {
                tracing::error!(?key, %action, %error, "cache_failure");
            }
            Event::StorageFailure { circuit, action, error } => {
                tracing::error!(?circuit, %action, %error, "storage_failure");
            }
        }

        Ok(())
    }
}

type Callback = Box<dyn Fn(&Event) + Send + Sync>;

/// A listener assembled from per-event closures.
///
/// Useful for wiring application behavior (alerts, counters) to specific
/// events without defining a listener type.
///
/// # Examples
///
/// ```
/// use fusebox::events::{CallbackListener, EventName};
///
/// let listener = CallbackListener::new()
///     .on(EventName::CircuitOpened, |event| eprintln!("tripped: {:?}", event.circuit()))
///     .on(EventName::CircuitClosed, |event| eprintln!("recovered: {:?}", event.circuit()));
/// # let _listener = listener;
/// ```
#[derive(Default)]
pub struct CallbackListener {
    handlers: HashMap<EventName, Vec<Callback>>,
}

impl fmt::Debug for CallbackListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackListener").field("events", &self.handlers.keys()).finish()
    }
}

impl CallbackListener {
    /// Creates a listener with no callbacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback for one event name.
    #[must_use]
    pub fn on(mut self, name: EventName, callback: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.handlers.entry(name).or_default().push(Box::new(callback));
        self
    }
}

impl Listener for CallbackListener {
    fn handle(&self, event: &Event) -> Result<(), BoxError> {
        if let Some(callbacks) = self.handlers.get(&event.name()) {
            for callback in callbacks {
                callback(event);
            }
        }
        Ok(())
    }
}

/// A listener that records every event it receives.
///
/// Intended for tests and diagnostics; the recorded log grows without bound.
#[derive(Debug, Default)]
pub struct MemoryListener {
    events: Mutex<Vec<Event>>,
}

impl MemoryListener {
    /// Creates an empty listener.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every recorded event, in delivery order.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Returns the names of every recorded event, in delivery order.
    #[must_use]
    pub fn names(&self) -> Vec<EventName> {
        self.events.lock().iter().map(Event::name).collect()
    }

    /// Returns how many events with the given name were recorded.
    #[must_use]
    pub fn count(&self, name: EventName) -> usize {
        self.events.lock().iter().filter(|event| event.name() == name).count()
    }
}

impl Listener for MemoryListener {
    fn handle(&self, event: &Event) -> Result<(), BoxError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
