// Copyright (c) Microsoft Corporation.

//! Circuit-breaker fault tolerance with integrated caching, pluggable
//! storage, and event notifications.
//!
//! Applications wrap calls to unreliable dependencies (APIs, databases,
//! caches) in named [`Circuit`]s. Each circuit observes the outcomes of its
//! executions over a sliding time window and, when failures exceed a
//! configured rate, trips *open*: further calls fail fast for a cool-down
//! period, after which the circuit becomes *half-open* and lets probes
//! through to test recovery.
//!
//! # Quick Start
//!
//! ```
//! use fusebox::{Error, Fusebox};
//! use tick::Clock;
//!
//! # #[derive(Debug, thiserror::Error)]
//! # #[error("connection refused")]
//! # struct ApiError;
//! # fn call_flaky_api() -> Result<String, ApiError> { Ok("response".to_owned()) }
//! # fn example(clock: &Clock) -> Result<(), Box<dyn std::error::Error>> {
//! let fusebox = Fusebox::builder(clock).build();
//!
//! match fusebox.circuit("api").run(call_flaky_api) {
//!     Ok(response) => println!("{response}"),
//!     Err(Error::Open { .. }) => println!("failing fast, dependency still recovering"),
//!     Err(error) => return Err(error.into()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # States and transitions
//!
//! ```text
//! ┌────────┐   failure rate over threshold   ┌──────────┐
//! │ Closed │ ───────────────────────────────▶│   Open   │
//! └────────┘                                 └──────────┘
//!      ▲                                           │
//!      │ probe                                     │ cool-down
//!      │ succeeds   ┌────────────────┐             │ elapses
//!      └────────────│   Half-Open    │◀────────────┘
//!                   └────────────────┘
//!                     │ probe fails
//!                     ▼ back to Open (cool-down restarts)
//! ```
//!
//! Only `Closed` and `Open` are stored; `Half-Open` is derived from an open
//! circuit whose cool-down has elapsed. Transitions go through storage-level
//! compare-and-set operations, so concurrent failures produce exactly one
//! `circuit_opened` event per crossing — in one process or many.
//!
//! # Caching
//!
//! [`Circuit::run_cached`] consults the cache before the circuit state.
//! A fresh value short-circuits the call entirely; a stale value is served
//! as a fallback when the circuit is open or the work fails (the failure is
//! still recorded). Staleness is decided by a refresh marker written next to
//! each value, with uniform jitter applied so that many processes do not
//! refresh the same key at the same instant.
//!
//! # Storage
//!
//! Circuit state lives behind the storage contract in `fusebox_store`.
//! In-process state is `fusebox_memory`; shared state across processes is
//! `fusebox_redis`. The instance builder hardens whatever it is given: a
//! non-fault-tolerant backend runs behind an internal guard circuit (so a
//! sick backend is not hammered by every protected call) inside a
//! fault-tolerant shell (so residual failures degrade to conservative stub
//! answers instead of surfacing), and a list of backends becomes a fallback
//! chain. See [`storage`] for the wrappers.
//!
//! # Events
//!
//! Everything observable is reported through a closed event vocabulary
//! (`circuit_opened`, `circuit_cache_hit`, `storage_failure`, ...) fanned
//! out to listeners; see [`events`]. By default, events are rendered as
//! `tracing` records by [`events::LogListener`].
//!
//! # The process-wide default
//!
//! For applications that want a global entry point, [`init`] registers a
//! default instance reachable from anywhere in the process, and [`disable`]
//! bypasses every circuit (user work always runs) for tests and emergency
//! switches.
//!
//! # Time
//!
//! All time comes from a [`tick::Clock`] supplied at construction. Tests
//! drive the clock with `tick::ClockControl`; production constructs one
//! clock at startup (`tick::runtime::InactiveClock::default().activate()`
//! works without an async runtime) and hands it to the instance builder.

pub mod cache;
pub mod errors;
pub mod events;
pub mod storage;

mod circuit;
mod global;
mod instance;
mod jitter;
mod registry;

pub use circuit::{Circuit, CircuitBuilder, CircuitOptions, CircuitOptionsBuilder, OptionsError};
pub use errors::{BoxError, Error};
pub use global::{
    clear_instances, default_instance, disable, disabled, enable, get_instance, init, register_instance,
};
pub use instance::{Fusebox, FuseboxBuilder};
