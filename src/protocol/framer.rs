//! Delimiter framing over an unreliable byte stream.
//!
//! Uses `bytes::BytesMut` for the partial frame, so completed frames are
//! split off and frozen without copying. The framer is a two-state machine:
//!
//! - `Collecting`: bytes accumulate until the delimiter arrives
//! - `Discarding`: a frame outgrew `max_frame_len`; bytes are skipped up to
//!   and including the next delimiter
//!
//! Output depends only on the bytes fed, never on how they were chunked.

use bytes::BytesMut;
use tracing::{trace, warn};

use crate::types::RawFrame;

/// One item produced by [`ByteFramer::feed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramerOutput {
    /// A complete frame, delimiter excluded
    Frame(RawFrame),
    /// A partial frame reached the size limit and was dropped
    Overflow { discarded: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Collecting,
    Discarding,
}

/// Splits a byte stream into frames on a single delimiter byte.
#[derive(Debug)]
pub struct ByteFramer {
    buffer: BytesMut,
    mode: Mode,
    delimiter: u8,
    max_frame_len: usize,
}

impl ByteFramer {
    pub fn new(delimiter: u8, max_frame_len: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(max_frame_len.min(4096)),
            mode: Mode::Collecting,
            delimiter,
            max_frame_len,
        }
    }

    /// Push a chunk and extract every frame it completes.
    ///
    /// A trailing partial frame stays buffered for the next call.
    pub fn feed(&mut self, mut data: &[u8]) -> Vec<FramerOutput> {
        let mut output = Vec::new();

        while !data.is_empty() {
            let delimiter_at = data.iter().position(|&b| b == self.delimiter);

            match self.mode {
                Mode::Discarding => match delimiter_at {
                    Some(index) => {
                        trace!("Framer resynchronized after {} skipped bytes", index);
                        self.mode = Mode::Collecting;
                        data = &data[index + 1..];
                    }
                    None => data = &[],
                },
                Mode::Collecting => {
                    let content_len = delimiter_at.unwrap_or(data.len());
                    let room = self.max_frame_len - self.buffer.len();

                    if content_len > room {
                        // Fill to the limit; the byte past it triggers the overflow
                        let discarded = self.buffer.len() + room;
                        warn!(
                            "Frame exceeded {} bytes without a delimiter, discarding",
                            self.max_frame_len
                        );
                        self.buffer.clear();
                        self.mode = Mode::Discarding;
                        output.push(FramerOutput::Overflow { discarded });
                        data = &data[room..];
                        continue;
                    }

                    self.buffer.extend_from_slice(&data[..content_len]);

                    if delimiter_at.is_some() {
                        let frame = self.buffer.split().freeze();
                        trace!("Framed {} bytes", frame.len());
                        output.push(FramerOutput::Frame(RawFrame::new(frame)));
                        data = &data[content_len + 1..];
                    } else {
                        data = &[];
                    }
                }
            }
        }

        output
    }

    /// Drop buffered bytes and leave any discard state.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.mode = Mode::Collecting;
    }

    /// Number of bytes held for an incomplete frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }
}
