// Copyright (c) Microsoft Corporation.

//! In-process storage backend for the fusebox circuit breaker.
//!
//! [`MemoryStore`] keeps all circuit state in process memory: an atomic for
//! the stored state, an atomic for the open timestamp, and a mutex-guarded
//! ring for the sample history. State transitions are compare-and-set
//! operations, so the exactly-once transition-reporting contract of the
//! storage trait holds under arbitrary thread interleavings without a global
//! lock.
//!
//! This backend cannot fail on its own operations and therefore advertises
//! itself as fault tolerant. It is the default backend, the recommended
//! backend for single-process deployments, and the backend the storage
//! wrappers use internally for their own guard circuits.
//!
//! # Example
//!
//! ```
//! use fusebox_memory::MemoryStore;
//! use fusebox_store::{CircuitProfile, Store};
//! use tick::Clock;
//!
//! let store = MemoryStore::new(&Clock::new_frozen());
//! let circuit = CircuitProfile::new("api");
//!
//! store.entry(&circuit, 100.0, false, None).unwrap();
//! assert!(store.open(&circuit, 100.0).unwrap());
//! assert!(!store.open(&circuit, 100.0).unwrap());
//! ```

mod store;

pub use store::MemoryStore;
