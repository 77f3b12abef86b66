// Copyright (c) Microsoft Corporation.

use std::time::Duration;

/// An [`r2d2`] connection manager that applies socket timeouts to every
/// connection it hands out.
///
/// The stock manager shipped by the redis crate opens connections with no
/// read or write timeout, which would let a sick Redis server stall every
/// circuit that consults it. Connections produced here always carry the
/// timeouts configured on the [builder][crate::RedisStoreBuilder].
#[derive(Debug)]
pub struct ConnectionManager {
    client: redis::Client,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl ConnectionManager {
    /// Creates a manager producing connections from the given client.
    #[must_use]
    pub fn new(client: redis::Client, read_timeout: Option<Duration>, write_timeout: Option<Duration>) -> Self {
        Self {
            client,
            read_timeout,
            write_timeout,
        }
    }
}

impl r2d2::ManageConnection for ConnectionManager {
    type Connection = redis::Connection;
    type Error = redis::RedisError;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let connection = self.client.get_connection()?;
        connection.set_read_timeout(self.read_timeout)?;
        connection.set_write_timeout(self.write_timeout)?;
        Ok(connection)
    }

    fn is_valid(&self, connection: &mut Self::Connection) -> Result<(), Self::Error> {
        redis::cmd("PING").query::<String>(connection).map(|_| ())
    }

    fn has_broken(&self, _connection: &mut Self::Connection) -> bool {
        false
    }
}
