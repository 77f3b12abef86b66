// Copyright (c) Microsoft Corporation.

use std::time::Duration;

use super::{Cache, Result};

/// A cache that stores nothing.
///
/// This is the default cache: every read misses and every write is dropped,
/// which turns the caching portions of the execution pipeline into no-ops.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

impl NullCache {
    /// Creates the null cache.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Cache for NullCache {
    fn read(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn write(&self, _key: &str, _value: &[u8], _expires_in: Option<Duration>) -> Result<()> {
        Ok(())
    }

    fn is_fault_tolerant(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_misses_and_accepts_writes() {
        let cache = NullCache::new();

        cache.write("k", b"v", None).unwrap();
        assert_eq!(cache.read("k").unwrap(), None);
        assert!(cache.is_fault_tolerant());
    }
}
