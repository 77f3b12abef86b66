// Copyright (c) Microsoft Corporation.

//! Demonstrates a circuit tripping open, failing fast, and recovering.
//!
//! Run with: `cargo run --example circuit_breaker`

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use fusebox::{CircuitOptions, Error, Fusebox};
use tick::runtime::InactiveClock;

#[derive(Debug, thiserror::Error)]
#[error("upstream service refused the connection")]
struct UpstreamError;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (clock, _driver) = InactiveClock::default().activate();

    let options = CircuitOptions::builder()
        .rate_threshold(0.5)
        .sample_threshold(3)
        .cool_down(Duration::from_millis(200))
        .build()?;

    let fusebox = Fusebox::builder(&clock).build();
    let circuit = fusebox.circuit_with("upstream", |_| options.to_builder())?;

    let healthy = Arc::new(AtomicBool::new(false));

    // The upstream is down: after enough failures the circuit trips and
    // later calls fail fast without touching the dependency.
    for attempt in 1..=5 {
        let healthy = Arc::clone(&healthy);
        let result = circuit.run(move || {
            if healthy.load(Ordering::Relaxed) {
                Ok("response")
            } else {
                Err(UpstreamError)
            }
        });

        match result {
            Ok(response) => println!("attempt {attempt}: ok: {response}"),
            Err(Error::Open { .. }) => println!("attempt {attempt}: skipped, circuit open"),
            Err(Error::Tripped { .. }) => println!("attempt {attempt}: failed and tripped the circuit"),
            Err(error) => println!("attempt {attempt}: failed: {error}"),
        }
    }

    // The upstream recovers; once the cool-down elapses a probe closes the
    // circuit again.
    healthy.store(true, Ordering::Relaxed);
    std::thread::sleep(Duration::from_millis(250));

    let response = circuit.run(|| Ok::<_, UpstreamError>("response"))?;
    println!("after cool-down: ok: {response}");
    println!("circuit closed again: {}", circuit.status()?.closed());

    Ok(())
}
