//! Frame types for the decode pipeline

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One delimiter-separated frame of the instrument stream.
///
/// Holds the bytes between two delimiters, delimiter excluded. Cloning is
/// cheap since the bytes are reference counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    bytes: Bytes,
}

impl RawFrame {
    /// Create a frame from its bytes
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self { bytes: bytes.into() }
    }

    /// Frame content as a slice
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Frame content as shared bytes
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Consume the frame, returning its bytes
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Content with leading and trailing line feeds removed.
    ///
    /// Text lines end with `\n\r` and the delimiter is `\r`, so the line feed
    /// stays attached to the frame. Only meaningful for text frames; binary
    /// fragments must be read untrimmed.
    pub fn trimmed(&self) -> &[u8] {
        let bytes = self.as_bytes();
        let start = bytes.iter().position(|&b| b != b'\n').unwrap_or(bytes.len());
        let end = bytes.iter().rposition(|&b| b != b'\n').map_or(start, |i| i + 1);
        &bytes[start..end]
    }
}

/// Payload kind of a frame, decided from its leading markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum FrameKind {
    /// `{t<elapsed>R:<cpm>` count-rate update
    TimeSample,
    /// `[<protocol>S: <n>` line interleaved with time samples
    SampleLabel,
    /// `Name:<protocol><date>` line preceding a time run's start time
    TimePreamble,
    /// `[ protocol] <date>` line preceding a spectrum's start time
    SpectrumPreamble,
    /// `Start Time HH:MM:SS`
    StartTime,
    /// `=>Start(binary)`
    BinaryStart,
    /// Any frame inside a binary block
    SpectrumFragment,
    /// `=>End(binary)`
    BinaryEnd,
    /// `Bitsum:<n>`
    Bitsum,
    /// Nothing left after trimming line feeds
    Blank,
    /// No recognised shape
    Unknown,
}

/// A frame tagged with its payload kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedFrame {
    pub kind: FrameKind,
    pub frame: RawFrame,
}

impl ClassifiedFrame {
    pub fn new(kind: FrameKind, frame: RawFrame) -> Self {
        Self { kind, frame }
    }
}
