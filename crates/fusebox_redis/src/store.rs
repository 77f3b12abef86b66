// Copyright (c) Microsoft Corporation.

use std::collections::HashMap;
use std::time::Duration;

use r2d2::Pool;
use redis::Commands;
use tick::Clock;

use fusebox_store::{
    CircuitProfile, Error, Lock, OptionValue, OptionsMap, RawState, Result, SampleEntry, State, Status, Store,
    wall_seconds,
};

use crate::ConnectionManager;

/// Socket timeouts above this raise an advisory warning; a circuit breaker
/// that blocks for longer than this on its own storage defeats its purpose.
const MAX_ADVISED_TIMEOUT: Duration = Duration::from_secs(2);

const ATTR_STATE: &str = "state";
const ATTR_OPENED_AT: &str = "opened_at";
const ATTR_LOCK: &str = "lock";
const ATTR_ENTRIES: &str = "entries";
const ATTR_OPTIONS: &str = "options";

/// Builder for [`RedisStore`].
#[derive(Debug, Clone)]
pub struct RedisStoreBuilder {
    url: String,
    key_prefix: String,
    key_separator: String,
    max_pool_size: u32,
    connection_timeout: Duration,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl RedisStoreBuilder {
    fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key_prefix: "fusebox".to_owned(),
            key_separator: ":".to_owned(),
            max_pool_size: 5,
            connection_timeout: Duration::from_secs(1),
            read_timeout: Some(Duration::from_secs(1)),
            write_timeout: Some(Duration::from_secs(1)),
        }
    }

    /// Sets the namespace prefix for every key this store writes.
    #[must_use]
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Sets the separator between key segments.
    #[must_use]
    pub fn key_separator(mut self, separator: impl Into<String>) -> Self {
        self.key_separator = separator.into();
        self
    }

    /// Sets the maximum number of pooled connections.
    #[must_use]
    pub fn max_pool_size(mut self, size: u32) -> Self {
        self.max_pool_size = size;
        self
    }

    /// Sets how long a caller waits for a free pooled connection.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Sets the socket read timeout; `None` disables it (not advised).
    #[must_use]
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the socket write timeout; `None` disables it (not advised).
    #[must_use]
    pub fn write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Connects the pool and builds the store.
    ///
    /// # Errors
    ///
    /// Fails when the URL cannot be parsed or the connection pool cannot be
    /// initialized.
    pub fn build(self, clock: &Clock) -> Result<RedisStore> {
        self.warn_on_risky_settings();

        let client = redis::Client::open(self.url.as_str()).map_err(Error::backend)?;
        let manager = ConnectionManager::new(client, self.read_timeout, self.write_timeout);
        let pool = Pool::builder()
            .max_size(self.max_pool_size)
            .connection_timeout(self.connection_timeout)
            // Connections are established lazily so that building a store
            // never blocks on an unreachable server.
            .min_idle(Some(0))
            .build_unchecked(manager);

        Ok(RedisStore {
            clock: clock.clone(),
            pool,
            key_prefix: self.key_prefix,
            key_separator: self.key_separator,
        })
    }

    fn warn_on_risky_settings(&self) {
        for (name, timeout) in [("read", self.read_timeout), ("write", self.write_timeout)] {
            match timeout {
                None => tracing::warn!(
                    timeout = name,
                    "no socket {name} timeout configured; a slow Redis server will stall circuits"
                ),
                Some(timeout) if timeout > MAX_ADVISED_TIMEOUT => tracing::warn!(
                    timeout = name,
                    seconds = timeout.as_secs_f64(),
                    "socket {name} timeout exceeds the advised maximum of {}s",
                    MAX_ADVISED_TIMEOUT.as_secs()
                ),
                Some(_) => {}
            }
        }

        if self.connection_timeout > MAX_ADVISED_TIMEOUT {
            tracing::warn!(
                seconds = self.connection_timeout.as_secs_f64(),
                "pool connection timeout exceeds the advised maximum of {}s",
                MAX_ADVISED_TIMEOUT.as_secs()
            );
        }
    }
}

/// Storage backend persisting circuit state in a shared Redis instance.
///
/// See the [crate docs][crate] for the key layout and atomicity model.
#[derive(Debug)]
pub struct RedisStore {
    clock: Clock,
    pool: Pool<ConnectionManager>,
    key_prefix: String,
    key_separator: String,
}

impl RedisStore {
    /// Starts building a store for the given Redis URL.
    #[must_use]
    pub fn builder(url: impl Into<String>) -> RedisStoreBuilder {
        RedisStoreBuilder::new(url)
    }

    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager>> {
        self.pool.get().map_err(Error::backend)
    }

    fn key(&self, circuit: &CircuitProfile, attribute: &str) -> String {
        format!(
            "{prefix}{sep}{circuit}{sep}{attribute}",
            prefix = self.key_prefix,
            sep = self.key_separator,
            circuit = circuit.name,
        )
    }

    fn list_key(&self) -> String {
        format!("{}{}list", self.key_prefix, self.key_separator)
    }

    fn fetch_entries(&self, connection: &mut redis::Connection, circuit: &CircuitProfile) -> Result<Vec<SampleEntry>> {
        let raw: Vec<String> = connection
            .lrange(self.key(circuit, ATTR_ENTRIES), 0, -1)
            .map_err(Error::backend)?;

        // Stored newest first; decode into oldest-first order.
        let mut entries = raw.iter().map(|value| SampleEntry::decode(value)).collect::<Result<Vec<_>>>()?;
        entries.reverse();
        Ok(entries)
    }

    /// Adds the circuit to the global name set.
    ///
    /// Every operation that touches a circuit's keys registers it, so
    /// [`list`][Store::list] reports circuits that were only ever locked or
    /// transitioned, the same way the in-process backend does.
    fn register(&self, connection: &mut redis::Connection, circuit: &CircuitProfile) -> Result<()> {
        connection.sadd(self.list_key(), &circuit.name).map_err(Error::backend)
    }
}

#[expect(clippy::cast_possible_truncation, reason = "TTLs are far below i64::MAX seconds")]
fn ttl_seconds(seconds: f64) -> i64 {
    seconds.max(1.0) as i64
}

fn parse_state(raw: Option<&str>) -> Result<State> {
    raw.map_or(Ok(State::Closed), str::parse)
}

fn parse_opened_at(raw: Option<&str>) -> Result<Option<f64>> {
    raw.map(|value| value.parse::<f64>().map_err(|_| Error::codec(value))).transpose()
}

fn parse_lock(raw: Option<&str>) -> Result<Option<Lock>> {
    raw.map(str::parse).transpose()
}

impl Store for RedisStore {
    fn get_options(&self, circuit: &CircuitProfile) -> Result<Option<OptionsMap>> {
        let mut connection = self.connection()?;

        let raw: HashMap<String, String> = connection
            .hgetall(self.key(circuit, ATTR_OPTIONS))
            .map_err(Error::backend)?;

        if raw.is_empty() {
            return Ok(None);
        }

        let mut options = OptionsMap::new();
        for (name, value) in raw {
            let value: OptionValue = serde_json::from_str(&value).map_err(|_| Error::codec(value))?;
            options.insert(name, value);
        }

        Ok(Some(options))
    }

    fn set_options(&self, circuit: &CircuitProfile, options: &OptionsMap) -> Result<()> {
        let mut connection = self.connection()?;
        let options_key = self.key(circuit, ATTR_OPTIONS);

        let fields = options
            .iter()
            .map(|(name, value)| {
                serde_json::to_string(value)
                    .map(|encoded| (name.clone(), encoded))
                    .map_err(Error::backend)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut pipe = redis::pipe();
        // Last write wins wholesale, so drop fields from any earlier map.
        pipe.cmd("DEL").arg(&options_key).ignore();
        if !fields.is_empty() {
            pipe.cmd("HSET").arg(&options_key);
            for (name, encoded) in &fields {
                pipe.arg(name).arg(encoded);
            }
            pipe.ignore();
        }
        pipe.cmd("EXPIRE")
            .arg(&options_key)
            .arg(ttl_seconds(circuit.circuit_ttl))
            .ignore();
        pipe.cmd("SADD").arg(self.list_key()).arg(&circuit.name).ignore();

        pipe.query::<()>(&mut *connection).map_err(Error::backend)
    }

    fn entry(
        &self,
        circuit: &CircuitProfile,
        time: f64,
        success: bool,
        snapshot: Option<&Status>,
    ) -> Result<Option<Status>> {
        let mut connection = self.connection()?;
        let entries_key = self.key(circuit, ATTR_ENTRIES);

        #[expect(clippy::cast_possible_wrap, reason = "sample sizes are small")]
        let keep = circuit.max_sample_size as i64 - 1;

        redis::pipe()
            .cmd("LPUSH")
            .arg(&entries_key)
            .arg(SampleEntry::new(time, success).encode())
            .ignore()
            .cmd("LTRIM")
            .arg(&entries_key)
            .arg(0)
            .arg(keep)
            .ignore()
            .cmd("EXPIRE")
            .arg(&entries_key)
            .arg(ttl_seconds(circuit.sample_ttl))
            .ignore()
            .cmd("SADD")
            .arg(self.list_key())
            .arg(&circuit.name)
            .ignore()
            .query::<()>(&mut *connection)
            .map_err(Error::backend)?;

        match snapshot {
            None => Ok(None),
            Some(snapshot) => {
                let entries = self.fetch_entries(&mut *connection, circuit)?;
                let raw = RawState {
                    state: snapshot.state,
                    opened_at: snapshot.opened_at,
                    lock: snapshot.lock,
                };
                Ok(Some(Status::compute(circuit, raw, &entries, time)))
            }
        }
    }

    fn open(&self, circuit: &CircuitProfile, opened_at: f64) -> Result<bool> {
        let mut connection = self.connection()?;
        let state_key = self.key(circuit, ATTR_STATE);
        let opened_at_key = self.key(circuit, ATTR_OPENED_AT);
        let ttl = ttl_seconds(circuit.circuit_ttl);

        self.register(&mut *connection, circuit)?;

        redis::transaction(&mut *connection, &[&state_key], |connection, pipe| {
            let state: Option<String> = connection.get(&state_key)?;
            if state.as_deref() == Some("open") {
                return Ok(Some(false));
            }

            // On success EXEC yields the (ignored) command results; on a
            // conflicting write to the watched key it yields nil, which
            // surfaces here as `None` and makes the helper retry.
            let executed: Option<()> = pipe
                .cmd("SET")
                .arg(&opened_at_key)
                .arg(opened_at)
                .arg("EX")
                .arg(ttl)
                .ignore()
                .cmd("SET")
                .arg(&state_key)
                .arg("open")
                .arg("EX")
                .arg(ttl)
                .ignore()
                .query(connection)?;

            Ok(executed.map(|()| true))
        })
        .map_err(Error::backend)
    }

    fn reopen(&self, circuit: &CircuitProfile, opened_at: f64, previous_opened_at: f64) -> Result<bool> {
        let mut connection = self.connection()?;
        let opened_at_key = self.key(circuit, ATTR_OPENED_AT);
        let ttl = ttl_seconds(circuit.circuit_ttl);

        self.register(&mut *connection, circuit)?;

        redis::transaction(&mut *connection, &[&opened_at_key], |connection, pipe| {
            let current: Option<String> = connection.get(&opened_at_key)?;
            #[expect(clippy::float_cmp, reason = "compare-and-set against the exact persisted value")]
            let unchanged = current
                .as_deref()
                .and_then(|value| value.parse::<f64>().ok())
                .is_some_and(|value| value == previous_opened_at);

            if !unchanged {
                return Ok(Some(false));
            }

            let executed: Option<()> = pipe
                .cmd("SET")
                .arg(&opened_at_key)
                .arg(opened_at)
                .arg("EX")
                .arg(ttl)
                .ignore()
                .query(connection)?;

            Ok(executed.map(|()| true))
        })
        .map_err(Error::backend)
    }

    fn close(&self, circuit: &CircuitProfile) -> Result<bool> {
        let mut connection = self.connection()?;
        let state_key = self.key(circuit, ATTR_STATE);
        let opened_at_key = self.key(circuit, ATTR_OPENED_AT);
        let entries_key = self.key(circuit, ATTR_ENTRIES);
        let ttl = ttl_seconds(circuit.circuit_ttl);

        self.register(&mut *connection, circuit)?;

        redis::transaction(&mut *connection, &[&state_key], |connection, pipe| {
            let state: Option<String> = connection.get(&state_key)?;
            if state.as_deref() != Some("open") {
                return Ok(Some(false));
            }

            let executed: Option<()> = pipe
                .cmd("DEL")
                .arg(&entries_key)
                .arg(&opened_at_key)
                .ignore()
                .cmd("SET")
                .arg(&state_key)
                .arg("closed")
                .arg("EX")
                .arg(ttl)
                .ignore()
                .query(connection)?;

            Ok(executed.map(|()| true))
        })
        .map_err(Error::backend)
    }

    fn lock(&self, circuit: &CircuitProfile, lock: Lock) -> Result<()> {
        let mut connection = self.connection()?;

        // Locks are explicit operator state and never expire.
        redis::pipe()
            .cmd("SET")
            .arg(self.key(circuit, ATTR_LOCK))
            .arg(lock.to_string())
            .ignore()
            .cmd("SADD")
            .arg(self.list_key())
            .arg(&circuit.name)
            .ignore()
            .query::<()>(&mut *connection)
            .map_err(Error::backend)
    }

    fn unlock(&self, circuit: &CircuitProfile) -> Result<()> {
        let mut connection = self.connection()?;

        redis::pipe()
            .cmd("DEL")
            .arg(self.key(circuit, ATTR_LOCK))
            .ignore()
            .cmd("SADD")
            .arg(self.list_key())
            .arg(&circuit.name)
            .ignore()
            .query::<()>(&mut *connection)
            .map_err(Error::backend)
    }

    fn reset(&self, circuit: &CircuitProfile) -> Result<()> {
        let mut connection = self.connection()?;

        redis::pipe()
            .cmd("DEL")
            .arg(self.key(circuit, ATTR_STATE))
            .arg(self.key(circuit, ATTR_OPENED_AT))
            .arg(self.key(circuit, ATTR_LOCK))
            .arg(self.key(circuit, ATTR_ENTRIES))
            .arg(self.key(circuit, ATTR_OPTIONS))
            .ignore()
            .cmd("SREM")
            .arg(self.list_key())
            .arg(&circuit.name)
            .ignore()
            .query::<()>(&mut *connection)
            .map_err(Error::backend)
    }

    fn status(&self, circuit: &CircuitProfile) -> Result<Status> {
        let mut connection = self.connection()?;
        let now = wall_seconds(&self.clock);

        let (state, opened_at, lock, raw_entries): (Option<String>, Option<String>, Option<String>, Vec<String>) =
            redis::pipe()
                .cmd("GET")
                .arg(self.key(circuit, ATTR_STATE))
                .cmd("GET")
                .arg(self.key(circuit, ATTR_OPENED_AT))
                .cmd("GET")
                .arg(self.key(circuit, ATTR_LOCK))
                .cmd("LRANGE")
                .arg(self.key(circuit, ATTR_ENTRIES))
                .arg(0)
                .arg(-1)
                .query(&mut *connection)
                .map_err(Error::backend)?;

        let raw = RawState {
            state: parse_state(state.as_deref())?,
            opened_at: parse_opened_at(opened_at.as_deref())?,
            lock: parse_lock(lock.as_deref())?,
        };

        let entries = raw_entries
            .iter()
            .map(|value| SampleEntry::decode(value))
            .collect::<Result<Vec<_>>>()?;

        Ok(Status::compute(circuit, raw, &entries, now))
    }

    fn history(&self, circuit: &CircuitProfile) -> Result<Vec<SampleEntry>> {
        let mut connection = self.connection()?;
        self.fetch_entries(&mut *connection, circuit)
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut connection = self.connection()?;

        let mut names: Vec<String> = connection.smembers(self.list_key()).map_err(Error::backend)?;
        names.sort();
        Ok(names)
    }

    fn is_fault_tolerant(&self) -> bool {
        false
    }
}
