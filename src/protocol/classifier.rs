//! Frame classification by leading markers

use crate::types::{FrameKind, RawFrame};

use super::markers;

/// Decides a frame's payload kind from its leading bytes.
///
/// Classification looks at nothing but the frame itself. Whether the stream
/// is inside a binary block is session state, so the session applies that
/// override on top of this result.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameClassifier;

impl FrameClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a frame. Never fails; unmatched frames are `Unknown`.
    pub fn classify(&self, frame: &RawFrame) -> FrameKind {
        let text = frame.trimmed();

        if text.is_empty() {
            return FrameKind::Blank;
        }

        // Order matters: `[<` must be tested before `[`
        const TABLE: &[(&[u8], FrameKind)] = &[
            (markers::TIME_SAMPLE, FrameKind::TimeSample),
            (markers::SAMPLE_LABEL, FrameKind::SampleLabel),
            (markers::TIME_PREAMBLE, FrameKind::TimePreamble),
            (markers::SPECTRUM_PREAMBLE, FrameKind::SpectrumPreamble),
            (markers::START_TIME, FrameKind::StartTime),
            (markers::BINARY_START, FrameKind::BinaryStart),
            (markers::BINARY_END, FrameKind::BinaryEnd),
            (markers::BITSUM, FrameKind::Bitsum),
        ];

        TABLE
            .iter()
            .find(|(marker, _)| text.starts_with(marker))
            .map_or(FrameKind::Unknown, |&(_, kind)| kind)
    }
}
