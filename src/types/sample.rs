//! Count-rate samples

use serde::{Deserialize, Serialize};

/// One count-rate reading, emitted by the instrument once per second while counting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct TimeSample {
    /// Seconds since the run started; strictly increasing within a run
    pub elapsed_seconds: u32,

    /// Counts per minute
    pub count_rate: f64,

    /// Integrity flag. Time lines carry no digest, so this is only ever
    /// false if a future digest check rejects the line.
    pub checksum_ok: bool,
}

impl TimeSample {
    pub fn new(elapsed_seconds: u32, count_rate: f64) -> Self {
        Self { elapsed_seconds, count_rate, checksum_ok: true }
    }
}
