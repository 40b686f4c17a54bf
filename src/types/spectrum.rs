//! Spectrum records

use serde::{Deserialize, Serialize};

use super::RunHeader;

/// Transmitted and locally computed spectrum digests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct BitsumCheck {
    /// Value from the instrument's `Bitsum:` line
    pub transmitted: u64,
    /// Value computed over the received binary block
    pub computed: u64,
}

impl BitsumCheck {
    pub fn matches(&self) -> bool {
        self.transmitted == self.computed
    }
}

/// A completed multi-channel spectrum, one per counting run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct Spectrum {
    /// Counts per channel in transmission order
    pub channel_counts: Vec<u32>,

    /// Advisory digest verdict; false when the digest mismatched or never arrived
    pub checksum_ok: bool,

    /// Digest values when a `Bitsum:` line was received
    pub bitsum: Option<BitsumCheck>,

    /// Preamble information, when the spectrum's preamble was seen
    pub header: Option<RunHeader>,
}

impl Spectrum {
    /// Number of channels
    pub fn channel_count(&self) -> usize {
        self.channel_counts.len()
    }

    /// Sum of all channel counts
    pub fn total_counts(&self) -> u64 {
        self.channel_counts.iter().map(|&c| u64::from(c)).sum()
    }

    /// Index and count of the fullest channel
    pub fn peak(&self) -> Option<(usize, u32)> {
        self.channel_counts
            .iter()
            .copied()
            .enumerate()
            .max_by_key(|&(index, count)| (count, std::cmp::Reverse(index)))
    }
}
