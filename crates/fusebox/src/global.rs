// Copyright (c) Microsoft Corporation.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;

use crate::instance::Fusebox;

/// Name under which [`init`] registers the default instance.
const DEFAULT_INSTANCE: &str = "default";

static DISABLED: AtomicBool = AtomicBool::new(false);

fn instances() -> &'static DashMap<String, Fusebox> {
    static INSTANCES: OnceLock<DashMap<String, Fusebox>> = OnceLock::new();
    INSTANCES.get_or_init(DashMap::new)
}

/// Registers an instance as the process-wide default and returns the one
/// that ended up registered.
///
/// Registration is put-if-absent: when a default already exists it wins and
/// is returned unchanged. Initialize before spawning worker threads;
/// registration itself is atomic but *which* thread initializes first is
/// not otherwise coordinated.
pub fn init(instance: Fusebox) -> Fusebox {
    register_instance(DEFAULT_INSTANCE, instance)
}

/// Returns the process-wide default instance, if one was initialized.
#[must_use]
pub fn default_instance() -> Option<Fusebox> {
    get_instance(DEFAULT_INSTANCE)
}

/// Returns a named instance, if one was registered.
#[must_use]
pub fn get_instance(name: &str) -> Option<Fusebox> {
    instances().get(name).map(|entry| entry.value().clone())
}

/// Registers a named instance (put-if-absent) and returns the one that ended
/// up registered under the name.
pub fn register_instance(name: impl Into<String>, instance: Fusebox) -> Fusebox {
    instances().entry(name.into()).or_insert(instance).value().clone()
}

/// Removes every registered instance.
///
/// Registered instances live for the rest of the process otherwise; this is
/// primarily for tests that set up their own defaults.
pub fn clear_instances() {
    instances().clear();
}

/// Disables every circuit in the process: user work always runs, no state
/// is recorded, and no transitions happen. The cache is still consulted.
pub fn disable() {
    DISABLED.store(true, Ordering::SeqCst);
}

/// Re-enables circuits after [`disable`].
pub fn enable() {
    DISABLED.store(false, Ordering::SeqCst);
}

/// True while circuits are disabled process-wide.
#[must_use]
pub fn disabled() -> bool {
    DISABLED.load(Ordering::SeqCst)
}
