// Copyright (c) Microsoft Corporation.

//! Redis-backed storage for the fusebox circuit breaker.
//!
//! [`RedisStore`] persists circuit state in a shared Redis instance so that
//! every process wrapping the same dependency shares one view of each
//! circuit's health. Per circuit, the backend keeps a handful of namespaced
//! keys (state, open timestamp, lock, sample list, options hash) plus a
//! global set of known circuit names; see the key layout below.
//!
//! State transitions use `WATCH`/`MULTI`/`EXEC` compare-and-set so that under
//! concurrent failures exactly one caller observes the closed-to-open
//! crossing, which is what keeps transition notifications from duplicating
//! across processes. Sample writes are pipelined (push, trim, expire) and
//! never contend with transitions.
//!
//! This backend can fail like any networked dependency and therefore
//! advertises `is_fault_tolerant() == false`. Run it behind the hardening
//! wrappers in the `fusebox` crate (the instance builder wires those
//! automatically).
//!
//! # Key layout
//!
//! For a key prefix `fusebox` and a circuit named `api`:
//!
//! | Key | Content |
//! |---|---|
//! | `fusebox:list` | set of known circuit names |
//! | `fusebox:api:state` | `"open"` or `"closed"` |
//! | `fusebox:api:opened_at` | float seconds since the epoch |
//! | `fusebox:api:lock` | `"open"` or `"closed"`, absent when unlocked |
//! | `fusebox:api:entries` | list of `<timestamp>:<0|1>`, newest first |
//! | `fusebox:api:options` | hash of JSON scalar option values |
//!
//! Non-lock keys carry the circuit TTL (default one week); the sample list
//! additionally carries the shorter sample TTL so idle histories vanish
//! early. Locks are deliberately indefinite.
//!
//! # Client settings
//!
//! A circuit breaker sits on the hot path of every protected call, so slow
//! storage hurts more than unavailable storage. The builder applies socket
//! timeouts to every pooled connection and logs a warning when they are
//! disabled or configured above two seconds.
//!
//! # Example
//!
//! ```no_run
//! use fusebox_redis::RedisStore;
//! use tick::Clock;
//!
//! # fn example(clock: &Clock) -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisStore::builder("redis://127.0.0.1/")
//!     .key_prefix("myapp")
//!     .build(clock)?;
//! # let _store = store;
//! # Ok(())
//! # }
//! ```

mod manager;
mod store;

pub use manager::ConnectionManager;
pub use store::{RedisStore, RedisStoreBuilder};
