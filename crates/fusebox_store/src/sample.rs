// Copyright (c) Microsoft Corporation.

use crate::{Error, Result};

/// One observed execution outcome: a wall-clock timestamp and whether the
/// execution succeeded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleEntry {
    /// Seconds since the Unix epoch at which the outcome was recorded.
    pub time: f64,

    /// Whether the execution succeeded.
    pub success: bool,
}

impl SampleEntry {
    /// Creates a new sample entry.
    #[must_use]
    pub fn new(time: f64, success: bool) -> Self {
        Self { time, success }
    }

    /// Encodes the entry in the `<timestamp>:<0|1>` wire form used by
    /// networked backends.
    #[must_use]
    pub fn encode(&self) -> String {
        format!("{}:{}", self.time, u8::from(self.success))
    }

    /// Decodes an entry from its `<timestamp>:<0|1>` wire form.
    ///
    /// # Errors
    ///
    /// Returns a codec error when the value does not match the wire form.
    pub fn decode(raw: &str) -> Result<Self> {
        let (time, success) = raw.rsplit_once(':').ok_or_else(|| Error::codec(raw))?;

        let time: f64 = time.parse().map_err(|_| Error::codec(raw))?;
        let success = match success {
            "0" => false,
            "1" => true,
            _ => return Err(Error::codec(raw)),
        };

        Ok(Self { time, success })
    }
}
