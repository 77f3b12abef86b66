// Copyright (c) Microsoft Corporation.

//! Demonstrates storage hardening: a fallback chain whose primary backend
//! dies keeps circuits working, with failures reported as events.
//!
//! Run with: `cargo run --example fallback_storage`

use std::sync::Arc;

use fusebox::Fusebox;
use fusebox::events::{CallbackListener, EventName};
use fusebox_store::Store;
use fusebox_store::testing::MockStore;
use tick::runtime::InactiveClock;

#[derive(Debug, thiserror::Error)]
#[error("search cluster timed out")]
struct SearchError;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (clock, _driver) = InactiveClock::default().activate();

    // A flaky "networked" backend and an in-process fallback. MockStore
    // stands in for a real networked backend so the failure can be scripted.
    let primary = Arc::new(MockStore::new(&clock));
    let fallback = Arc::new(MockStore::new(&clock));

    let listener = CallbackListener::new()
        .on(EventName::StorageFailure, |event| println!("event: {event:?}"))
        .on(EventName::CircuitOpened, |event| println!("event: {event:?}"));

    let fusebox = Fusebox::builder(&clock)
        .storage_chain(vec![
            Arc::clone(&primary) as Arc<dyn Store>,
            Arc::clone(&fallback) as Arc<dyn Store>,
        ])
        .listener(Arc::new(listener))
        .build();

    let circuit = fusebox.circuit("search");

    // Healthy: the primary answers everything.
    circuit.run(|| Ok::<_, SearchError>("hit"))?;
    println!("healthy run served by the primary backend");

    // The primary dies. Circuits keep recording and gating through the
    // fallback backend; each absorbed failure surfaces as an event.
    primary.fail_always();

    for _ in 0..3 {
        let _ = circuit.run(|| Err::<&str, _>(SearchError));
    }

    println!("circuit open: {}", circuit.status()?.open());
    Ok(())
}
