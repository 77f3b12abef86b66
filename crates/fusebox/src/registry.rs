// Copyright (c) Microsoft Corporation.

use std::sync::Arc;

use dashmap::DashMap;

use crate::circuit::CircuitShared;

/// Memoizes circuits by name within one instance.
///
/// Circuit handles are advisory until they execute: the first handle to run
/// under a name claims it with a put-if-absent insert, and every later
/// handle of that name attaches to the winner's shared state. This is what
/// makes two `circuit("api")` calls — possibly with different options —
/// behave as one circuit.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    circuits: DashMap<String, Arc<CircuitShared>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the canonical shared state for the seed's name, inserting the
    /// seed when the name is unclaimed.
    pub fn resolve(&self, seed: Arc<CircuitShared>) -> Arc<CircuitShared> {
        Arc::clone(&self.circuits.entry(seed.name.clone()).or_insert(seed))
    }
}
