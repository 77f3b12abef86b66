// Copyright (c) Microsoft Corporation.

use std::time::UNIX_EPOCH;

use tick::Clock;

/// Projects the clock's wall time onto float seconds since the Unix epoch.
///
/// This is the single time representation used for persisted circuit state;
/// processes sharing a networked backend compare these values directly.
#[must_use]
pub fn wall_seconds(clock: &Clock) -> f64 {
    clock
        .system_time()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |elapsed| elapsed.as_secs_f64())
}
