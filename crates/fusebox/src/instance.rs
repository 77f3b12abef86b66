// Copyright (c) Microsoft Corporation.

use std::fmt;
use std::sync::Arc;

use tick::Clock;

use fusebox_store::Store;

use crate::cache::{self, Cache};
use crate::circuit::{Circuit, CircuitOptions, CircuitOptionsBuilder, OptionsError};
use crate::events::{Listener, Notifier, Notify};
use crate::registry::Registry;
use crate::storage;

struct FuseboxInner {
    clock: Clock,
    storage: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
    notifier: Arc<dyn Notify>,
    defaults: CircuitOptions,
    registry: Arc<Registry>,
}

/// A top-level instance: shared defaults, hardened storage and cache, an
/// event notifier, and the registry its circuits are memoized in.
///
/// Instances are cheap to clone and safe to share across threads. Most
/// applications build one at startup (optionally registering it as the
/// process-wide default with [`init`][crate::init]) and spawn every circuit
/// from it.
///
/// # Examples
///
/// ```
/// use fusebox::Fusebox;
/// use tick::Clock;
///
/// # fn example(clock: &Clock) -> Result<(), fusebox::Error> {
/// let fusebox = Fusebox::builder(clock).build();
///
/// let value = fusebox.circuit("api").run(|| Ok::<_, std::io::Error>("response"))?;
/// # let _value = value;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Fusebox {
    inner: Arc<FuseboxInner>,
}

impl fmt::Debug for Fusebox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fusebox")
            .field("storage", &self.inner.storage)
            .field("cache", &self.inner.cache)
            .finish_non_exhaustive()
    }
}

impl Fusebox {
    /// Starts building an instance.
    #[must_use]
    pub fn builder(clock: &Clock) -> FuseboxBuilder {
        FuseboxBuilder {
            clock: clock.clone(),
            storages: Vec::new(),
            cache: None,
            listeners: None,
            defaults: CircuitOptions::default(),
        }
    }

    /// Returns a circuit handle with this instance's default options.
    ///
    /// Handles are memoized by name on first execution: if a circuit with
    /// this name has already run within this instance, the returned handle
    /// attaches to it.
    #[must_use]
    pub fn circuit(&self, name: impl Into<String>) -> Circuit {
        self.make_circuit(name.into(), self.inner.defaults.clone())
    }

    /// Returns a circuit handle with options derived from this instance's
    /// defaults.
    ///
    /// The configured options only take effect if this circuit (or another
    /// handle sharing them) is the first under its name to execute; see
    /// [`circuit`][Self::circuit].
    ///
    /// # Errors
    ///
    /// Fails when the configured options are invalid.
    pub fn circuit_with(
        &self,
        name: impl Into<String>,
        configure: impl FnOnce(CircuitOptionsBuilder) -> CircuitOptionsBuilder,
    ) -> Result<Circuit, OptionsError> {
        let options = configure(self.inner.defaults.to_builder()).build()?;
        Ok(self.make_circuit(name.into(), options))
    }

    /// Returns the names of every circuit known to this instance's storage.
    ///
    /// # Errors
    ///
    /// Fails when storage cannot be listed.
    pub fn list_circuits(&self) -> fusebox_store::Result<Vec<String>> {
        self.inner.storage.list()
    }

    /// The clock this instance reads time from.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.inner.clock
    }

    /// The hardened storage this instance's circuits run against.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn Store> {
        &self.inner.storage
    }

    /// The hardened cache this instance's circuits consult.
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.inner.cache
    }

    fn make_circuit(&self, name: String, options: CircuitOptions) -> Circuit {
        Circuit::builder(name, &self.inner.clock).options(options).into_circuit(
            Arc::clone(&self.inner.storage),
            Arc::clone(&self.inner.cache),
            Arc::clone(&self.inner.notifier),
            Some(Arc::clone(&self.inner.registry)),
        )
    }
}

/// Builder for [`Fusebox`] instances.
///
/// User-supplied storage and cache backends are hardened during
/// [`build`][Self::build]: non-fault-tolerant backends run behind guard
/// circuits inside fault-tolerant shells, and a list of storage backends
/// becomes a fallback chain. Nothing supplied means in-process storage and
/// no cache.
pub struct FuseboxBuilder {
    clock: Clock,
    storages: Vec<Arc<dyn Store>>,
    cache: Option<Arc<dyn Cache>>,
    listeners: Option<Vec<Arc<dyn Listener>>>,
    defaults: CircuitOptions,
}

impl fmt::Debug for FuseboxBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuseboxBuilder")
            .field("storages", &self.storages.len())
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl FuseboxBuilder {
    /// Sets a single storage backend.
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn Store>) -> Self {
        self.storages = vec![storage];
        self
    }

    /// Sets an ordered fallback chain of storage backends.
    #[must_use]
    pub fn storage_chain(mut self, backends: Vec<Arc<dyn Store>>) -> Self {
        self.storages = backends;
        self
    }

    /// Sets the cache backend.
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Adds an event listener.
    ///
    /// When no listener is added, instances default to the structured
    /// [`LogListener`][crate::events::LogListener].
    #[must_use]
    pub fn listener(mut self, listener: Arc<dyn Listener>) -> Self {
        self.listeners.get_or_insert_with(Vec::new).push(listener);
        self
    }

    /// Replaces the listener set (an empty set silences events).
    #[must_use]
    pub fn listeners(mut self, listeners: Vec<Arc<dyn Listener>>) -> Self {
        self.listeners = Some(listeners);
        self
    }

    /// Sets the default options circuits are spawned with.
    #[must_use]
    pub fn circuit_defaults(mut self, defaults: CircuitOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Assembles the instance, hardening storage and cache.
    #[must_use]
    pub fn build(self) -> Fusebox {
        let notifier: Arc<dyn Notify> = Arc::new(match self.listeners {
            Some(listeners) => Notifier::new(listeners),
            None => Notifier::log(),
        });

        let storage = storage::auto_wire(self.storages, &self.clock, &notifier);
        let cache = cache::auto_wire(self.cache, &self.clock, &notifier);

        Fusebox {
            inner: Arc::new(FuseboxInner {
                clock: self.clock,
                storage,
                cache,
                notifier,
                defaults: self.defaults,
                registry: Arc::new(Registry::new()),
            }),
        }
    }
}
