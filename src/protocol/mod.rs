//! Commfil v.2 decoding pipeline.
//!
//! Bytes flow through four stages, all owned by one [`ProtocolSession`]:
//!
//! ```text
//! bytes -> ByteFramer -> RawFrame -> FrameClassifier -> ClassifiedFrame
//!       -> PayloadParser -> Payload -> RunAccumulator -> ProtocolEvent
//! ```
//!
//! Every stage is synchronous and bounded by the maximum frame length. No
//! stage returns an error to the caller: anomalies become
//! [`ProtocolEvent::DecodeError`](crate::ProtocolEvent) or
//! [`ProtocolEvent::BufferExhausted`](crate::ProtocolEvent) in the output.

mod accumulator;
mod classifier;
mod framer;
mod parser;
mod session;
mod spectrum;

pub use accumulator::RunAccumulator;
pub use classifier::FrameClassifier;
pub use framer::{ByteFramer, FramerOutput};
pub use parser::{Payload, PayloadParser};
pub use session::{CallbackSink, EventSink, ProtocolSession};
pub use spectrum::{PopcountDigest, SpectrumChunk, SpectrumDecoder, SpectrumDigest, SpectrumFault};

/// Leading byte markers of Commfil v.2 text frames.
pub mod markers {
    pub const TIME_SAMPLE: &[u8] = b"{t";
    pub const SAMPLE_LABEL: &[u8] = b"[<";
    pub const TIME_PREAMBLE: &[u8] = b"Name:<";
    pub const SPECTRUM_PREAMBLE: &[u8] = b"[ ";
    pub const START_TIME: &[u8] = b"Start Time ";
    pub const BINARY_START: &[u8] = b"=>Start(binary)";
    pub const BINARY_END: &[u8] = b"=>End(binary)";
    pub const BITSUM: &[u8] = b"Bitsum:";
}

/// Reserved bytes of the binary spectrum encoding.
pub mod binary {
    /// Never transmitted
    pub const RESERVED: u8 = 0xFA;
    /// Followed by a zero-run length
    pub const ZERO_RUN: u8 = 0xFB;
    /// End of spectrum data
    pub const END_OF_DATA: u8 = 0xFC;
    /// Stands in for digit 13, which would collide with the `\r` delimiter
    pub const ESCAPED_13: u8 = 0xFD;
    /// Stands in for digit 35
    pub const ESCAPED_35: u8 = 0xFE;
    /// Terminates a non-zero value
    pub const VALUE_END: u8 = 0xFF;
    /// Digit base of multi-byte values
    pub const BASE: u64 = 250;
}
