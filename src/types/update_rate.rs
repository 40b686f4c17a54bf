//! Update rate control for snapshot streams

use serde::{Deserialize, Serialize};

/// Update rate for snapshot streams
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum UpdateRate {
    /// Every snapshot the driver publishes (one per received chunk)
    Native,

    /// Throttled to maximum Hz
    /// A rate of zero is treated as Native
    Max(u32),
}

impl UpdateRate {
    /// Get throttle interval if needed
    pub fn throttle_interval(self) -> Option<std::time::Duration> {
        match self {
            UpdateRate::Native | UpdateRate::Max(0) => None,
            UpdateRate::Max(hz) => Some(std::time::Duration::from_secs_f64(1.0 / hz as f64)),
        }
    }
}
