// Copyright (c) Microsoft Corporation.

//! Contract-level tests exercised through `dyn Store`, the way wrappers and
//! the circuit runner consume a backend.

use std::sync::Arc;

use tick::Clock;

use fusebox_store::testing::MockStore;
use fusebox_store::{CircuitProfile, Lock, OptionsMap, Store};

fn store() -> Arc<dyn Store> {
    Arc::new(MockStore::new(&Clock::new_frozen()))
}

#[test]
fn transition_cycle_reports_each_crossing_once() {
    let store = store();
    let circuit = CircuitProfile::new("api");

    assert!(store.open(&circuit, 100.0).unwrap());
    assert!(!store.open(&circuit, 101.0).unwrap());

    assert!(store.reopen(&circuit, 200.0, 100.0).unwrap());
    assert!(!store.reopen(&circuit, 300.0, 100.0).unwrap());

    assert!(store.close(&circuit).unwrap());
    assert!(!store.close(&circuit).unwrap());

    assert!(store.open(&circuit, 400.0).unwrap());
}

#[test]
fn close_clears_the_sample() {
    let store = store();
    let circuit = CircuitProfile::new("api");

    store.entry(&circuit, 50.0, false, None).unwrap();
    store.open(&circuit, 100.0).unwrap();
    store.close(&circuit).unwrap();

    assert!(store.history(&circuit).unwrap().is_empty());
}

#[test]
fn options_round_trip_through_the_contract() {
    let store = store();
    let circuit = CircuitProfile::new("api");

    assert_eq!(store.get_options(&circuit).unwrap(), None);

    let mut options = OptionsMap::new();
    options.insert("rate_threshold".to_owned(), 0.5.into());
    options.insert("sample_threshold".to_owned(), 3_u32.into());
    options.insert("locked".to_owned(), false.into());

    store.set_options(&circuit, &options).unwrap();
    assert_eq!(store.get_options(&circuit).unwrap(), Some(options));
}

#[test]
fn reset_then_reset_equals_reset() {
    let store = store();
    let circuit = CircuitProfile::new("api");

    store.entry(&circuit, 50.0, false, None).unwrap();
    store.open(&circuit, 100.0).unwrap();
    store.lock(&circuit, Lock::Closed).unwrap();

    store.reset(&circuit).unwrap();
    let after_once = store.status(&circuit).unwrap();

    store.reset(&circuit).unwrap();
    let after_twice = store.status(&circuit).unwrap();

    assert!(after_once.closed() && after_once.lock.is_none());
    assert_eq!(after_once.state, after_twice.state);
    assert_eq!(after_once.lock, after_twice.lock);
    assert_eq!(after_once.sample_size, after_twice.sample_size);
}
