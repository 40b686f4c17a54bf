//! Events and run metadata produced by a protocol session

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Spectrum, TimeSample};
use crate::error::DecodeError;

/// Which product of a run is being accumulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum RunKind {
    TimeSeries,
    Spectrum,
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunKind::TimeSeries => f.write_str("time"),
            RunKind::Spectrum => f.write_str("spectrum"),
        }
    }
}

/// Wall-clock start time reported by the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct StartTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl fmt::Display for StartTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

/// Descriptive information about a run, gathered from preamble and label lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct RunHeader {
    pub kind: RunKind,
    /// Counting protocol name as configured on the instrument
    pub protocol: String,
    /// Measurement date as printed by the instrument, e.g. `14 Mar. 2022`
    pub date: String,
    pub start_time: Option<StartTime>,
    pub sample_number: Option<u32>,
}

impl RunHeader {
    pub fn new(kind: RunKind, protocol: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            kind,
            protocol: protocol.into(),
            date: date.into(),
            start_time: None,
            sample_number: None,
        }
    }
}

/// Accumulator state as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum RunState {
    #[default]
    Idle,
    CollectingTimeSeries,
    /// A spectrum block is open, or closed and waiting for its digest line
    HoldingSpectrum { awaiting_digest: bool },
}

/// Read-only copy of in-progress accumulation, for live display.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct RunSnapshot {
    pub state: RunState,
    /// Samples of the current (or most recently finished) time run
    pub samples: Vec<TimeSample>,
    /// Channels received so far for the open spectrum
    pub partial_spectrum: Vec<u32>,
    pub channel_count: usize,
    pub time_header: Option<RunHeader>,
    pub spectrum_header: Option<RunHeader>,
}

impl RunSnapshot {
    /// Spectrum progress in `0.0..=1.0`
    pub fn spectrum_progress(&self) -> f64 {
        if self.channel_count == 0 {
            return 0.0;
        }
        (self.partial_spectrum.len() as f64 / self.channel_count as f64).min(1.0)
    }
}

/// The externally observable output of a protocol session.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    /// A count-rate sample, streamed as soon as it is decoded
    TimeSample(TimeSample),

    /// A spectrum whose channels are complete and whose digest is settled
    SpectrumComplete(Spectrum),

    /// Accumulated data of `previous` kind is being dropped from memory
    RunReset { previous: RunKind, discarded: usize },

    /// A frame could not be decoded; the session continues
    DecodeError(DecodeError),

    /// A preamble and start time announced a new run
    RunStarted(RunHeader),

    /// A sample label named the protocol and sample being counted
    SampleIdentified { protocol: String, sample_number: u32 },

    /// A frame outgrew the framing buffer and was discarded.
    ///
    /// Repeated occurrences mean the stream is persistently malformed and
    /// the transport should consider disconnecting.
    BufferExhausted { discarded: usize },
}

impl ProtocolEvent {
    /// Short name for logs and displays
    pub fn name(&self) -> &'static str {
        match self {
            ProtocolEvent::TimeSample(_) => "time_sample",
            ProtocolEvent::SpectrumComplete(_) => "spectrum_complete",
            ProtocolEvent::RunReset { .. } => "run_reset",
            ProtocolEvent::DecodeError(_) => "decode_error",
            ProtocolEvent::RunStarted(_) => "run_started",
            ProtocolEvent::SampleIdentified { .. } => "sample_identified",
            ProtocolEvent::BufferExhausted { .. } => "buffer_exhausted",
        }
    }

    /// Whether the event reports an anomaly in the stream
    pub fn is_anomaly(&self) -> bool {
        matches!(self, ProtocolEvent::DecodeError(_) | ProtocolEvent::BufferExhausted { .. })
    }
}
