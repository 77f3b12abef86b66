// Copyright (c) Microsoft Corporation.

//! Storage hardening wrappers.
//!
//! Circuits must keep working when their storage tier does not. These
//! wrappers compose over any [`Store`] implementation:
//!
//! - [`CircuitGuardedStore`] bounds repeated round-trips to a sick backend
//!   with an internal guard circuit (running on its own in-process storage).
//! - [`FaultTolerantStore`] absorbs residual failures, reporting them as
//!   `storage_failure` events and answering with conservative stubs.
//! - [`FallbackChain`] tries an ordered list of backends: reads take the
//!   first success, consistency-critical writes fan out to every backend.
//! - [`NullStore`] remembers nothing; it backs the process-wide disable
//!   switch.
//!
//! [`auto_wire`] assembles the standard composition the instance builder
//! applies to user-supplied storage.

mod fallback;
mod fault_tolerant;
mod guarded;
mod null;

use std::sync::Arc;

use tick::Clock;

pub use fallback::FallbackChain;
pub use fault_tolerant::FaultTolerantStore;
pub use guarded::CircuitGuardedStore;
pub use null::NullStore;

use fusebox_store::Store;

use crate::events::Notify;

/// Hardens user-supplied storage.
///
/// A fault-tolerant backend is used as-is. A non-tolerant backend runs
/// behind a guard circuit inside a fault-tolerant shell. A list of backends
/// becomes a fallback chain (each non-tolerant element individually
/// guarded), itself wrapped in the fault-tolerant shell.
pub(crate) fn auto_wire(mut backends: Vec<Arc<dyn Store>>, clock: &Clock, notifier: &Arc<dyn Notify>) -> Arc<dyn Store> {
    let guard = |store: Arc<dyn Store>, name: String| -> Arc<dyn Store> {
        if store.is_fault_tolerant() {
            store
        } else {
            Arc::new(CircuitGuardedStore::with_circuit_name(store, clock, notifier, name))
        }
    };

    match backends.len() {
        0 => Arc::new(fusebox_memory::MemoryStore::new(clock)),
        1 => {
            let store = backends.remove(0);
            if store.is_fault_tolerant() {
                store
            } else {
                let guarded = guard(store, "fusebox.storage".to_owned());
                Arc::new(FaultTolerantStore::new(guarded, Arc::clone(notifier), clock))
            }
        }
        _ => {
            let guarded: Vec<Arc<dyn Store>> = backends
                .into_iter()
                .enumerate()
                .map(|(index, store)| guard(store, format!("fusebox.storage.{index}")))
                .collect();

            let chain = Arc::new(FallbackChain::new(guarded, Arc::clone(notifier)));
            Arc::new(FaultTolerantStore::new(chain, Arc::clone(notifier), clock))
        }
    }
}

#[cfg(test)]
mod tests {
    use fusebox_store::testing::MockStore;

    use super::*;
    use crate::events::Notifier;

    fn notifier() -> Arc<dyn Notify> {
        Arc::new(Notifier::new(Vec::new()))
    }

    #[test]
    fn empty_config_defaults_to_memory() {
        let clock = Clock::new_frozen();
        let store = auto_wire(Vec::new(), &clock, &notifier());
        assert!(store.is_fault_tolerant());
    }

    #[test]
    fn tolerant_backends_pass_through_unchanged() {
        let clock = Clock::new_frozen();
        let backend: Arc<dyn Store> = Arc::new(MockStore::fault_tolerant(&clock));

        let wired = auto_wire(vec![Arc::clone(&backend)], &clock, &notifier());
        assert!(Arc::ptr_eq(&wired, &backend));
    }

    #[test]
    fn non_tolerant_backends_are_shelled() {
        let clock = Clock::new_frozen();
        let backend: Arc<dyn Store> = Arc::new(MockStore::new(&clock));

        let wired = auto_wire(vec![backend], &clock, &notifier());

        // The outer shell promises fault tolerance even though the backend
        // does not.
        assert!(wired.is_fault_tolerant());
    }

    #[test]
    fn chains_are_wrapped_and_tolerant() {
        let clock = Clock::new_frozen();
        let primary: Arc<dyn Store> = Arc::new(MockStore::new(&clock));
        let secondary: Arc<dyn Store> = Arc::new(MockStore::fault_tolerant(&clock));

        let wired = auto_wire(vec![primary, secondary], &clock, &notifier());
        assert!(wired.is_fault_tolerant());
    }
}
