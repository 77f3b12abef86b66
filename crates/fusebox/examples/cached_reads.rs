// Copyright (c) Microsoft Corporation.

//! Demonstrates read-through caching: fresh hits skip the work, and stale
//! values serve as a fallback when the dependency fails.
//!
//! Run with: `cargo run --example cached_reads`

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use fusebox::Fusebox;
use fusebox::cache::MemoryCache;
use tick::runtime::InactiveClock;

#[derive(Debug, thiserror::Error)]
#[error("pricing service unavailable")]
struct PricingError;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (clock, _driver) = InactiveClock::default().activate();

    let fusebox = Fusebox::builder(&clock)
        .cache(Arc::new(MemoryCache::new(&clock)))
        .build();

    // Refresh after 100ms so the example can demonstrate staleness quickly.
    let circuit = fusebox.circuit_with("pricing", |options| {
        options
            .cache_expires_in(Some(Duration::from_secs(60)))
            .cache_refreshes_after(Some(Duration::from_millis(100)))
            .cache_refresh_jitter(Duration::ZERO)
    })?;

    let calls = Arc::new(AtomicU32::new(0));

    let fetch = {
        let calls = Arc::clone(&calls);
        move || {
            calls.fetch_add(1, Ordering::Relaxed);
            Ok::<_, PricingError>(42_u32)
        }
    };

    // First read populates the cache; the immediate second read is a fresh
    // hit and never reaches the dependency.
    let price = circuit.run_cached("sku-1", fetch.clone())?;
    let again = circuit.run_cached("sku-1", fetch.clone())?;
    println!("price={price}, again={again}, dependency calls={}", calls.load(Ordering::Relaxed));

    // Once the refresh age passes, the work runs again. If it fails, the
    // stale value is served instead of the error.
    std::thread::sleep(Duration::from_millis(150));
    let fallback = circuit.run_cached("sku-1", || Err::<u32, _>(PricingError))?;
    println!("dependency down, served stale price={fallback}");

    Ok(())
}
