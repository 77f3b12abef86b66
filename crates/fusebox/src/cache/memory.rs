// Copyright (c) Microsoft Corporation.

use std::time::Duration;

use dashmap::DashMap;
use tick::Clock;

use fusebox_store::wall_seconds;

use super::{Cache, Result};

#[derive(Debug, Clone)]
struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Option<f64>,
}

/// A TTL-aware in-process cache.
///
/// Expired values are dropped lazily on read; there is no background sweeper
/// and no size bound, so this is suitable for modest working sets (and for
/// tests). For shared or bounded caching, supply your own backend.
#[derive(Debug)]
pub struct MemoryCache {
    clock: Clock,
    values: DashMap<String, StoredValue>,
}

impl MemoryCache {
    /// Creates an empty cache reading time from the given clock.
    #[must_use]
    pub fn new(clock: &Clock) -> Self {
        Self {
            clock: clock.clone(),
            values: DashMap::new(),
        }
    }
}

impl Cache for MemoryCache {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = wall_seconds(&self.clock);

        if let Some(stored) = self.values.get(key) {
            if stored.expires_at.is_some_and(|expires_at| expires_at <= now) {
                drop(stored);
                self.values.remove(key);
                return Ok(None);
            }
            return Ok(Some(stored.bytes.clone()));
        }

        Ok(None)
    }

    fn write(&self, key: &str, value: &[u8], expires_in: Option<Duration>) -> Result<()> {
        let expires_at = expires_in.map(|ttl| wall_seconds(&self.clock) + ttl.as_secs_f64());

        self.values.insert(
            key.to_owned(),
            StoredValue {
                bytes: value.to_vec(),
                expires_at,
            },
        );

        Ok(())
    }

    fn is_fault_tolerant(&self) -> bool {
        true
    }
}
