// Copyright (c) Microsoft Corporation.

//! Storage contract and status model for the fusebox circuit breaker.
//!
//! This crate defines the types every storage backend and every consumer of the
//! circuit-breaker state machine agree on:
//!
//! - [`Store`] is the uniform persistence contract. Backends implement it over
//!   process memory, Redis, or anything else that can hold a small amount of
//!   per-circuit state.
//! - [`CircuitProfile`] is the view of a circuit that storage needs: its name
//!   plus the thresholds and retention settings that drive status computation.
//! - [`Status`] is the immutable snapshot derived from stored state and the
//!   recent sample history, including the `open`/`half_open`/`can_run`
//!   predicates the runner gates on.
//! - [`SampleEntry`] is one `(timestamp, success)` observation, with the
//!   compact wire codec shared by networked backends.
//!
//! The contract is deliberately synchronous and object-safe: backends are
//! shared behind `Arc<dyn Store>` across threads, and every state transition
//! method reports whether it actually performed the transition so callers can
//! emit each transition event exactly once.
//!
//! # Time
//!
//! All timestamps are float seconds since the Unix epoch, projected from a
//! [`tick::Clock`] with [`wall_seconds`]. Backends persist wall-clock seconds
//! so that processes sharing a backend agree on window and cool-down math.
//!
//! # Testing
//!
//! The [`testing`] module provides [`MockStore`][testing::MockStore], a
//! recording, failure-injecting implementation of the contract for exercising
//! wrappers and the runner without a real backend.

mod error;
mod options_map;
mod profile;
mod sample;
mod status;
mod store;
mod time;

pub mod testing;

pub use error::{Error, ErrorKind, Result};
pub use options_map::{OptionValue, OptionsMap};
pub use profile::CircuitProfile;
pub use sample::SampleEntry;
pub use status::{Lock, RawState, State, Status};
pub use store::{Store, StoreAction};
pub use time::wall_seconds;
