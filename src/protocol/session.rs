//! Byte-stream-in, event-out decoding session

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::{
    ByteFramer, FrameClassifier, FramerOutput, PayloadParser, RunAccumulator, SpectrumDigest,
    markers,
};
use crate::config::DecoderConfig;
use crate::types::{ClassifiedFrame, FrameKind, ProtocolEvent, RawFrame, RunSnapshot};

/// Receives events from a [`ProtocolSession`] in emission order.
pub trait EventSink {
    fn emit(&mut self, event: ProtocolEvent);
}

impl EventSink for Vec<ProtocolEvent> {
    fn emit(&mut self, event: ProtocolEvent) {
        self.push(event);
    }
}

/// Hands events to another task. Events for a dropped receiver are discarded.
impl EventSink for mpsc::UnboundedSender<ProtocolEvent> {
    fn emit(&mut self, event: ProtocolEvent) {
        if self.send(event).is_err() {
            trace!("Event receiver dropped");
        }
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn emit(&mut self, event: ProtocolEvent) {
        (**self).emit(event);
    }
}

/// Adapts a closure into an [`EventSink`].
pub struct CallbackSink<F>(pub F);

impl<F: FnMut(ProtocolEvent)> EventSink for CallbackSink<F> {
    fn emit(&mut self, event: ProtocolEvent) {
        (self.0)(event);
    }
}

/// One decoding session per physical connection.
///
/// Owns all mutable decoding state; there is nothing process-wide, so any
/// number of sessions can run side by side.
///
/// ```rust
/// use commfil::{DecoderConfig, ProtocolEvent, ProtocolSession};
///
/// let mut session = ProtocolSession::new(&DecoderConfig::default(), Vec::new());
/// session.feed(b"{t     1R:   120\r{t    ");
/// session.feed(b" 2R:   118\r");
///
/// let events = session.into_sink();
/// assert_eq!(events.len(), 2);
/// assert!(matches!(events[1], ProtocolEvent::TimeSample(s) if s.elapsed_seconds == 2));
/// ```
#[derive(Debug)]
pub struct ProtocolSession<S: EventSink> {
    framer: ByteFramer,
    classifier: FrameClassifier,
    parser: PayloadParser,
    accumulator: RunAccumulator,
    in_binary_block: bool,
    pending: Vec<ProtocolEvent>,
    sink: S,
}

impl<S: EventSink> ProtocolSession<S> {
    pub fn new(config: &DecoderConfig, sink: S) -> Self {
        Self::with_parser(config, PayloadParser::new(config), sink)
    }

    /// Use a different digest algorithm for spectrum verification.
    pub fn with_digest(config: &DecoderConfig, digest: Box<dyn SpectrumDigest>, sink: S) -> Self {
        Self::with_parser(config, PayloadParser::with_digest(config, digest), sink)
    }

    fn with_parser(config: &DecoderConfig, parser: PayloadParser, sink: S) -> Self {
        Self {
            framer: ByteFramer::new(config.delimiter, config.max_frame_len),
            classifier: FrameClassifier::new(),
            parser,
            accumulator: RunAccumulator::new(config),
            in_binary_block: false,
            pending: Vec::new(),
            sink,
        }
    }

    /// Decode a chunk of bytes, returning how many events were emitted.
    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        for output in self.framer.feed(bytes) {
            match output {
                FramerOutput::Frame(frame) => self.process(frame),
                FramerOutput::Overflow { discarded } => {
                    warn!("Framing buffer exhausted, {} bytes discarded", discarded);
                    self.pending.push(ProtocolEvent::BufferExhausted { discarded });
                }
            }
        }
        self.flush()
    }

    fn process(&mut self, frame: RawFrame) {
        let marker = self.classifier.classify(&frame);

        if self.in_binary_block {
            match marker {
                FrameKind::BinaryStart | FrameKind::BinaryEnd => {}
                FrameKind::Blank | FrameKind::Unknown | FrameKind::SpectrumFragment => {
                    return self.dispatch(FrameKind::SpectrumFragment, frame);
                }
                // Text after the end-of-data byte means the end marker was lost
                _ if self.parser.spectrum_finished() => self.close_block(),
                FrameKind::TimeSample if self.parser.is_time_sample(&frame) => {
                    warn!("Time sample inside an unfinished binary block, block abandoned");
                    self.in_binary_block = false;
                }
                // Binary bytes that happen to start like a marker
                _ => return self.dispatch(FrameKind::SpectrumFragment, frame),
            }
        }

        match marker {
            FrameKind::BinaryStart => self.in_binary_block = true,
            FrameKind::BinaryEnd => self.in_binary_block = false,
            _ => {}
        }
        self.dispatch(marker, frame);
    }

    fn dispatch(&mut self, kind: FrameKind, frame: RawFrame) {
        trace!("Frame {:?} ({} bytes)", kind, frame.len());
        let classified = ClassifiedFrame::new(kind, frame);
        let parsed = self.parser.parse(&classified);
        self.accumulator.apply(&classified, parsed, &mut self.pending);
    }

    /// Close the open binary block as if its end marker had arrived.
    fn close_block(&mut self) {
        debug!("Binary block closed without its end marker");
        self.in_binary_block = false;
        self.dispatch(FrameKind::BinaryEnd, RawFrame::new(markers::BINARY_END));
    }

    fn flush(&mut self) -> usize {
        let count = self.pending.len();
        for event in self.pending.drain(..) {
            self.sink.emit(event);
        }
        count
    }

    /// Read-only copy of in-progress accumulation.
    pub fn snapshot(&self) -> RunSnapshot {
        self.accumulator.snapshot()
    }

    /// Settle whatever the end of input leaves behind.
    ///
    /// A complete spectrum still waiting for its digest line is emitted
    /// unverified; a block whose data ended without its end marker is closed
    /// first. A partial spectrum or time series stays in the snapshot.
    /// Returns the number of events emitted.
    pub fn finish(&mut self) -> usize {
        if self.in_binary_block && self.parser.spectrum_finished() {
            self.close_block();
        }
        self.accumulator.finish(&mut self.pending);
        self.flush()
    }

    /// Discard all decoding state, e.g. on reconnect.
    ///
    /// Buffered data is reported through `RunReset` events before it is
    /// dropped. Returns the number of events emitted.
    pub fn reset(&mut self) -> usize {
        debug!("Session reset");
        self.framer.reset();
        self.parser.reset();
        self.in_binary_block = false;
        self.accumulator.reset(&mut self.pending);
        self.flush()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
