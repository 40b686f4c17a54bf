//! Run accumulation state machine.
//!
//! ```text
//!                 TimeSample                 BinaryStart
//!   Idle ─────────────────────▶ Collecting ─────────────▶ Holding
//!    ▲  ◀──── rewind: RunReset ───┘                         │
//!    │                                                      │ BinaryEnd (full)
//!    │        Bitsum / any other frame                      ▼
//!    └──────────────────────────────────────── Holding { awaiting_digest }
//! ```
//!
//! Time samples stream out as they arrive. A spectrum is only emitted once
//! its block has closed and its digest line has settled the checksum flag.

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::config::{DecoderConfig, RepeatedTimePolicy};
use crate::error::DecodeError;
use crate::types::{
    BitsumCheck, ClassifiedFrame, FrameKind, ProtocolEvent, RunHeader, RunKind, RunSnapshot,
    RunState, Spectrum, TimeSample,
};

use super::parser::Payload;
use super::spectrum::SpectrumChunk;

/// A preamble waiting for the `Start Time` line that follows it.
#[derive(Debug, Clone)]
struct PendingPreamble {
    kind: RunKind,
    protocol: String,
    date: String,
}

/// Assembles payloads into runs and decides when a new run has begun.
#[derive(Debug)]
pub struct RunAccumulator {
    channel_count: usize,
    repeated_time: RepeatedTimePolicy,
    state: RunState,

    samples: Vec<TimeSample>,
    last_raw_elapsed: Option<u32>,
    /// Repeated raw times seen: elapsed seconds are synthesized from here on
    coarse_units: bool,

    spectrum: Vec<u32>,

    pending_preamble: Option<PendingPreamble>,
    time_header: Option<RunHeader>,
    spectrum_header: Option<RunHeader>,
}

impl RunAccumulator {
    pub fn new(config: &DecoderConfig) -> Self {
        Self {
            channel_count: config.channel_count,
            repeated_time: config.repeated_time,
            state: RunState::Idle,
            samples: Vec::new(),
            last_raw_elapsed: None,
            coarse_units: false,
            spectrum: Vec::with_capacity(config.channel_count),
            pending_preamble: None,
            time_header: None,
            spectrum_header: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Apply one parsed frame, appending resulting events in order.
    pub fn apply(
        &mut self,
        frame: &ClassifiedFrame,
        parsed: Result<Payload, DecodeError>,
        events: &mut Vec<ProtocolEvent>,
    ) {
        if matches!(parsed, Ok(Payload::Blank)) {
            return;
        }

        let awaiting_digest = self.state == (RunState::HoldingSpectrum { awaiting_digest: true });
        let payload = match parsed {
            Ok(payload) => payload,
            Err(error) => {
                // A digest line that cannot be read still ends the wait
                if awaiting_digest && frame.kind == FrameKind::Bitsum {
                    debug!("Unreadable digest line, spectrum left unverified");
                    self.complete_spectrum(None, events);
                }
                warn!("Decode error: {}", error);
                events.push(ProtocolEvent::DecodeError(error));
                return;
            }
        };

        // A closed spectrum settles on its digest line or on whatever comes instead
        if awaiting_digest && !matches!(payload, Payload::Bitsum(_)) {
            debug!("Spectrum closed without a digest line");
            self.complete_spectrum(None, events);
        }

        // A preamble only applies to the frame right after it
        let preamble = self.pending_preamble.take();
        let raw = frame.frame.bytes();

        match payload {
            Payload::Blank => {}
            Payload::TimeSample { raw_elapsed, count_rate } => {
                self.on_time_sample(raw_elapsed, count_rate, events)
            }
            Payload::SampleLabel { protocol, sample_number } => {
                let header = self
                    .time_header
                    .get_or_insert_with(|| RunHeader::new(RunKind::TimeSeries, "", ""));
                header.protocol.clone_from(&protocol);
                header.sample_number = Some(sample_number);
                events.push(ProtocolEvent::SampleIdentified { protocol, sample_number });
            }
            Payload::TimePreamble { protocol, date } => {
                self.pending_preamble =
                    Some(PendingPreamble { kind: RunKind::TimeSeries, protocol, date });
            }
            Payload::SpectrumPreamble { protocol, date } => {
                self.pending_preamble =
                    Some(PendingPreamble { kind: RunKind::Spectrum, protocol, date });
            }
            Payload::StartTime(start) => {
                let Some(preamble) = preamble else {
                    events.push(out_of_sequence(frame.kind, raw));
                    return;
                };

                let mut header = RunHeader::new(preamble.kind, preamble.protocol, preamble.date);
                header.start_time = Some(start);

                self.discard_spectrum(events);
                if preamble.kind == RunKind::TimeSeries {
                    self.discard_time_series(events);
                    self.time_header = Some(header.clone());
                } else {
                    self.spectrum_header = Some(header.clone());
                }
                self.transition(RunState::Idle);

                debug!("{} run started at {}", header.kind, start);
                events.push(ProtocolEvent::RunStarted(header));
            }
            Payload::BinaryStart => {
                // A restart of the cursor abandons the partial spectrum
                self.discard_spectrum(events);
                self.transition(RunState::HoldingSpectrum { awaiting_digest: false });
            }
            Payload::SpectrumFragment(chunk) => {
                if self.state != (RunState::HoldingSpectrum { awaiting_digest: false }) {
                    events.push(out_of_sequence(frame.kind, raw));
                    return;
                }
                self.append_chunk(chunk, "spectrum fragment", raw, events);
            }
            Payload::BinaryEnd(tail) => {
                if self.state != (RunState::HoldingSpectrum { awaiting_digest: false }) {
                    events.push(out_of_sequence(frame.kind, raw));
                    return;
                }
                self.append_chunk(tail, "binary block", raw, events);

                if self.spectrum.len() == self.channel_count {
                    self.transition(RunState::HoldingSpectrum { awaiting_digest: true });
                } else {
                    let details = format!(
                        "block ended with {} of {} channels",
                        self.spectrum.len(),
                        self.channel_count
                    );
                    warn!("Incomplete spectrum: {}", details);
                    events.push(ProtocolEvent::DecodeError(DecodeError::structural(
                        "spectrum",
                        details,
                        raw.clone(),
                    )));
                    self.discard_spectrum(events);
                    self.transition(RunState::Idle);
                }
            }
            Payload::Bitsum(check) => {
                if self.state != (RunState::HoldingSpectrum { awaiting_digest: true }) {
                    events.push(out_of_sequence(frame.kind, raw));
                    return;
                }
                self.complete_spectrum(Some(check), events);
            }
        }
    }

    fn on_time_sample(&mut self, raw_elapsed: u32, count_rate: f64, events: &mut Vec<ProtocolEvent>) {
        match self.state {
            RunState::HoldingSpectrum { .. } => {
                // New run began before the spectrum finished
                self.discard_spectrum(events);
                self.discard_time_series(events);
            }
            RunState::Idle => self.discard_time_series(events),
            RunState::CollectingTimeSeries => {
                if let Some(previous) = self.last_raw_elapsed {
                    let rewound = match self.repeated_time {
                        RepeatedTimePolicy::NewRun => raw_elapsed <= previous,
                        RepeatedTimePolicy::CoarseUnits => raw_elapsed < previous,
                    };
                    if rewound {
                        debug!("Elapsed time went from {} to {}, new run", previous, raw_elapsed);
                        self.discard_time_series(events);
                    } else if raw_elapsed == previous {
                        if !self.coarse_units {
                            debug!("Repeated elapsed time {}, counting in coarse units", raw_elapsed);
                        }
                        self.coarse_units = true;
                    }
                }
            }
        }
        self.transition(RunState::CollectingTimeSeries);

        let elapsed_seconds = match self.samples.last() {
            Some(last) if self.coarse_units => last.elapsed_seconds.saturating_add(1),
            _ => raw_elapsed,
        };

        let sample = TimeSample::new(elapsed_seconds, count_rate);
        trace!("Time sample {}s: {} cpm", sample.elapsed_seconds, sample.count_rate);
        self.samples.push(sample);
        self.last_raw_elapsed = Some(raw_elapsed);
        events.push(ProtocolEvent::TimeSample(sample));
    }

    fn append_chunk(
        &mut self,
        chunk: SpectrumChunk,
        context: &'static str,
        raw: &Bytes,
        events: &mut Vec<ProtocolEvent>,
    ) {
        for fault in chunk.faults {
            warn!("Spectrum fault: {}", fault);
            events.push(ProtocolEvent::DecodeError(DecodeError::structural(
                context,
                fault.to_string(),
                raw.clone(),
            )));
        }

        let room = self.channel_count - self.spectrum.len();
        if chunk.values.len() > room {
            let dropped = chunk.values.len() - room;
            events.push(ProtocolEvent::DecodeError(DecodeError::structural(
                context,
                format!("{} values beyond channel {} dropped", dropped, self.channel_count),
                raw.clone(),
            )));
        }
        self.spectrum.extend(chunk.values.into_iter().take(room));
    }

    fn complete_spectrum(&mut self, check: Option<BitsumCheck>, events: &mut Vec<ProtocolEvent>) {
        let spectrum = Spectrum {
            channel_counts: std::mem::take(&mut self.spectrum),
            checksum_ok: check.is_some_and(|c| c.matches()),
            bitsum: check,
            header: self.spectrum_header.clone(),
        };
        debug!(
            "Spectrum complete: {} channels, {} counts, checksum_ok={}",
            spectrum.channel_count(),
            spectrum.total_counts(),
            spectrum.checksum_ok
        );
        self.transition(RunState::Idle);
        events.push(ProtocolEvent::SpectrumComplete(spectrum));
    }

    /// Drop buffered samples of a finished or abandoned time run.
    fn discard_time_series(&mut self, events: &mut Vec<ProtocolEvent>) {
        if !self.samples.is_empty() {
            events.push(ProtocolEvent::RunReset {
                previous: RunKind::TimeSeries,
                discarded: self.samples.len(),
            });
        }
        self.samples.clear();
        self.last_raw_elapsed = None;
        self.coarse_units = false;
    }

    /// Drop a partial (or digest-less) spectrum if one is open.
    fn discard_spectrum(&mut self, events: &mut Vec<ProtocolEvent>) {
        if matches!(self.state, RunState::HoldingSpectrum { .. }) {
            events.push(ProtocolEvent::RunReset {
                previous: RunKind::Spectrum,
                discarded: self.spectrum.len(),
            });
            self.spectrum.clear();
            self.transition(RunState::Idle);
        }
    }

    fn transition(&mut self, next: RunState) {
        if self.state != next {
            debug!("Run state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    /// Emit a complete spectrum still waiting for its digest, unverified.
    pub fn finish(&mut self, events: &mut Vec<ProtocolEvent>) {
        if self.state == (RunState::HoldingSpectrum { awaiting_digest: true }) {
            debug!("Input ended before the digest line");
            self.complete_spectrum(None, events);
        }
    }

    /// Discard all accumulated data and headers.
    pub fn reset(&mut self, events: &mut Vec<ProtocolEvent>) {
        self.discard_spectrum(events);
        self.discard_time_series(events);
        self.pending_preamble = None;
        self.time_header = None;
        self.spectrum_header = None;
        self.transition(RunState::Idle);
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            state: self.state,
            samples: self.samples.clone(),
            partial_spectrum: self.spectrum.clone(),
            channel_count: self.channel_count,
            time_header: self.time_header.clone(),
            spectrum_header: self.spectrum_header.clone(),
        }
    }
}

fn out_of_sequence(kind: FrameKind, raw: &Bytes) -> ProtocolEvent {
    warn!("{:?} frame out of sequence", kind);
    ProtocolEvent::DecodeError(DecodeError::OutOfSequence { kind, raw: raw.clone() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RawFrame, StartTime};

    struct Harness {
        accumulator: RunAccumulator,
        events: Vec<ProtocolEvent>,
    }

    impl Harness {
        fn new(config: DecoderConfig) -> Self {
            Self { accumulator: RunAccumulator::new(&config), events: Vec::new() }
        }

        fn small() -> Self {
            Self::new(DecoderConfig { channel_count: 4, ..DecoderConfig::default() })
        }

        fn apply(&mut self, kind: FrameKind, payload: Payload) -> Vec<ProtocolEvent> {
            let frame = ClassifiedFrame::new(kind, RawFrame::new(&b"raw"[..]));
            self.events.clear();
            self.accumulator.apply(&frame, Ok(payload), &mut self.events);
            std::mem::take(&mut self.events)
        }

        fn sample(&mut self, raw_elapsed: u32) -> Vec<ProtocolEvent> {
            self.apply(
                FrameKind::TimeSample,
                Payload::TimeSample { raw_elapsed, count_rate: 100.0 },
            )
        }

        fn fragment(&mut self, values: &[u32]) -> Vec<ProtocolEvent> {
            self.apply(
                FrameKind::SpectrumFragment,
                Payload::SpectrumFragment(SpectrumChunk { values: values.to_vec(), ..Default::default() }),
            )
        }

        fn end(&mut self) -> Vec<ProtocolEvent> {
            self.apply(FrameKind::BinaryEnd, Payload::BinaryEnd(SpectrumChunk::default()))
        }

        fn bitsum(&mut self, transmitted: u64, computed: u64) -> Vec<ProtocolEvent> {
            self.apply(FrameKind::Bitsum, Payload::Bitsum(BitsumCheck { transmitted, computed }))
        }
    }

    fn time_event(elapsed: u32) -> ProtocolEvent {
        ProtocolEvent::TimeSample(TimeSample::new(elapsed, 100.0))
    }

    #[test]
    fn increasing_samples_stream_without_reset() {
        let mut h = Harness::small();
        assert_eq!(h.sample(1), vec![time_event(1)]);
        assert_eq!(h.sample(2), vec![time_event(2)]);
        assert_eq!(h.accumulator.state(), RunState::CollectingTimeSeries);
    }

    #[test]
    fn rewind_resets_time_series() {
        let mut h = Harness::small();
        h.sample(5);
        assert_eq!(
            h.sample(1),
            vec![
                ProtocolEvent::RunReset { previous: RunKind::TimeSeries, discarded: 1 },
                time_event(1),
            ]
        );
        assert_eq!(h.accumulator.snapshot().samples.len(), 1);
    }

    #[test]
    fn repeated_time_starts_new_run_by_default() {
        let mut h = Harness::small();
        h.sample(3);
        let events = h.sample(3);
        assert_eq!(events[0], ProtocolEvent::RunReset { previous: RunKind::TimeSeries, discarded: 1 });
    }

    #[test]
    fn coarse_units_synthesizes_seconds() {
        let mut h = Harness::new(DecoderConfig {
            repeated_time: RepeatedTimePolicy::CoarseUnits,
            ..DecoderConfig::default()
        });
        for raw in [1, 1, 1, 2, 2] {
            h.sample(raw);
        }
        let elapsed: Vec<u32> =
            h.accumulator.snapshot().samples.iter().map(|s| s.elapsed_seconds).collect();
        assert_eq!(elapsed, vec![1, 2, 3, 4, 5]);

        // Only a decrease starts over
        let events = h.sample(1);
        assert_eq!(events[0], ProtocolEvent::RunReset { previous: RunKind::TimeSeries, discarded: 5 });
        assert_eq!(events[1], time_event(1));
    }

    #[test]
    fn spectrum_completes_on_bitsum() {
        let mut h = Harness::small();
        h.sample(1);
        assert!(h.apply(FrameKind::BinaryStart, Payload::BinaryStart).is_empty());
        assert!(h.fragment(&[1, 2]).is_empty());
        assert!(h.fragment(&[3, 4]).is_empty());
        assert!(h.end().is_empty());
        assert_eq!(
            h.accumulator.state(),
            RunState::HoldingSpectrum { awaiting_digest: true }
        );

        let events = h.bitsum(10, 10);
        let [ProtocolEvent::SpectrumComplete(spectrum)] = events.as_slice() else {
            panic!("expected one spectrum, got {events:?}");
        };
        assert_eq!(spectrum.channel_counts, vec![1, 2, 3, 4]);
        assert!(spectrum.checksum_ok);
        assert_eq!(h.accumulator.state(), RunState::Idle);

        // The time series is kept for saving
        assert_eq!(h.accumulator.snapshot().samples.len(), 1);
    }

    #[test]
    fn bitsum_mismatch_flags_but_delivers() {
        let mut h = Harness::small();
        h.apply(FrameKind::BinaryStart, Payload::BinaryStart);
        h.fragment(&[0, 0, 0, 9]);
        h.end();

        let events = h.bitsum(10, 12);
        let [ProtocolEvent::SpectrumComplete(spectrum)] = events.as_slice() else {
            panic!("expected one spectrum, got {events:?}");
        };
        assert!(!spectrum.checksum_ok);
        assert_eq!(spectrum.bitsum, Some(BitsumCheck { transmitted: 10, computed: 12 }));
    }

    #[test]
    fn missing_digest_settles_unverified() {
        let mut h = Harness::small();
        h.apply(FrameKind::BinaryStart, Payload::BinaryStart);
        h.fragment(&[1, 1, 1, 1]);
        h.end();

        let events = h.sample(1);
        assert!(matches!(
            &events[0],
            ProtocolEvent::SpectrumComplete(spectrum) if !spectrum.checksum_ok && spectrum.bitsum.is_none()
        ));
        assert_eq!(events[1], time_event(1));
    }

    #[test]
    fn short_block_is_structural_error_and_reset() {
        let mut h = Harness::small();
        h.apply(FrameKind::BinaryStart, Payload::BinaryStart);
        h.fragment(&[1, 2]);

        let events = h.end();
        assert!(matches!(
            &events[0],
            ProtocolEvent::DecodeError(DecodeError::StructuralParse { context: "spectrum", .. })
        ));
        assert_eq!(events[1], ProtocolEvent::RunReset { previous: RunKind::Spectrum, discarded: 2 });
        assert_eq!(h.accumulator.state(), RunState::Idle);
    }

    #[test]
    fn overflow_values_are_dropped() {
        let mut h = Harness::small();
        h.apply(FrameKind::BinaryStart, Payload::BinaryStart);
        let events = h.fragment(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(events.len(), 1);
        assert!(events[0].is_anomaly());
        assert_eq!(h.accumulator.snapshot().partial_spectrum, vec![1, 2, 3, 4]);
    }

    #[test]
    fn time_sample_during_spectrum_discards_it() {
        let mut h = Harness::small();
        h.sample(10);
        h.apply(FrameKind::BinaryStart, Payload::BinaryStart);
        h.fragment(&[1, 2, 3]);

        assert_eq!(
            h.sample(1),
            vec![
                ProtocolEvent::RunReset { previous: RunKind::Spectrum, discarded: 3 },
                ProtocolEvent::RunReset { previous: RunKind::TimeSeries, discarded: 1 },
                time_event(1),
            ]
        );
    }

    #[test]
    fn restarted_block_discards_partial() {
        let mut h = Harness::small();
        h.apply(FrameKind::BinaryStart, Payload::BinaryStart);
        h.fragment(&[7]);
        assert_eq!(
            h.apply(FrameKind::BinaryStart, Payload::BinaryStart),
            vec![ProtocolEvent::RunReset { previous: RunKind::Spectrum, discarded: 1 }]
        );
        assert_eq!(h.accumulator.state(), RunState::HoldingSpectrum { awaiting_digest: false });
    }

    #[test]
    fn out_of_sequence_frames() {
        let mut h = Harness::small();
        for events in [h.end(), h.bitsum(1, 1), h.fragment(&[1])] {
            assert!(matches!(
                &events[..],
                [ProtocolEvent::DecodeError(DecodeError::OutOfSequence { .. })]
            ));
        }
        let events = h.apply(
            FrameKind::StartTime,
            Payload::StartTime(StartTime { hour: 1, minute: 2, second: 3 }),
        );
        assert!(matches!(
            &events[..],
            [ProtocolEvent::DecodeError(DecodeError::OutOfSequence { kind: FrameKind::StartTime, .. })]
        ));
    }

    #[test]
    fn preamble_and_start_time_start_a_run() {
        let mut h = Harness::small();
        h.sample(4);
        h.sample(5);

        assert!(h
            .apply(
                FrameKind::TimePreamble,
                Payload::TimePreamble { protocol: "C14".into(), date: "14 Mar. 2022".into() },
            )
            .is_empty());
        let start = StartTime { hour: 10, minute: 42, second: 7 };
        let events = h.apply(FrameKind::StartTime, Payload::StartTime(start));

        assert_eq!(events[0], ProtocolEvent::RunReset { previous: RunKind::TimeSeries, discarded: 2 });
        let ProtocolEvent::RunStarted(header) = &events[1] else {
            panic!("expected RunStarted, got {:?}", events[1]);
        };
        assert_eq!(header.kind, RunKind::TimeSeries);
        assert_eq!(header.protocol, "C14");
        assert_eq!(header.start_time, Some(start));

        // The first sample of the announced run does not reset again
        assert_eq!(h.sample(1), vec![time_event(1)]);
    }

    #[test]
    fn spectrum_preamble_keeps_time_series() {
        let mut h = Harness::small();
        h.sample(1);
        h.apply(
            FrameKind::SpectrumPreamble,
            Payload::SpectrumPreamble { protocol: "C14".into(), date: "1 Jan. 2023".into() },
        );
        let events = h.apply(
            FrameKind::StartTime,
            Payload::StartTime(StartTime { hour: 0, minute: 0, second: 0 }),
        );
        assert!(matches!(
            &events[..],
            [ProtocolEvent::RunStarted(header)] if header.kind == RunKind::Spectrum
        ));
        assert_eq!(h.accumulator.snapshot().samples.len(), 1);
    }

    #[test]
    fn sample_label_identifies_run() {
        let mut h = Harness::small();
        let events = h.apply(
            FrameKind::SampleLabel,
            Payload::SampleLabel { protocol: "H3".into(), sample_number: 12 },
        );
        assert_eq!(
            events,
            vec![ProtocolEvent::SampleIdentified { protocol: "H3".into(), sample_number: 12 }]
        );
        let header = h.accumulator.snapshot().time_header.expect("header recorded");
        assert_eq!(header.sample_number, Some(12));
    }

    #[test]
    fn decode_errors_pass_through_without_state_change() {
        let mut h = Harness::small();
        h.sample(3);

        let frame = ClassifiedFrame::new(FrameKind::Unknown, RawFrame::new(&b"??"[..]));
        let mut events = Vec::new();
        h.accumulator.apply(
            &frame,
            Err(DecodeError::Framing { raw: Bytes::from_static(b"??") }),
            &mut events,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(h.accumulator.state(), RunState::CollectingTimeSeries);
        assert_eq!(h.sample(4), vec![time_event(4)]);
    }

    fn apply_error(h: &mut Harness, kind: FrameKind) -> Vec<ProtocolEvent> {
        let frame = ClassifiedFrame::new(kind, RawFrame::new(&b"??"[..]));
        let mut events = Vec::new();
        h.accumulator.apply(
            &frame,
            Err(DecodeError::Framing { raw: Bytes::from_static(b"??") }),
            &mut events,
        );
        events
    }

    #[test]
    fn decode_error_keeps_spectrum_waiting_for_digest() {
        let mut h = Harness::small();
        h.apply(FrameKind::BinaryStart, Payload::BinaryStart);
        h.fragment(&[1, 2, 3, 4]);
        h.end();

        let events = apply_error(&mut h, FrameKind::Unknown);
        assert!(matches!(&events[..], [ProtocolEvent::DecodeError(_)]));
        assert_eq!(h.accumulator.state(), RunState::HoldingSpectrum { awaiting_digest: true });

        let events = h.bitsum(8, 8);
        assert!(matches!(
            &events[..],
            [ProtocolEvent::SpectrumComplete(spectrum)] if spectrum.checksum_ok
        ));
    }

    #[test]
    fn unreadable_digest_line_settles_unverified() {
        let mut h = Harness::small();
        h.apply(FrameKind::BinaryStart, Payload::BinaryStart);
        h.fragment(&[1, 2, 3, 4]);
        h.end();

        let events = apply_error(&mut h, FrameKind::Bitsum);
        assert!(matches!(
            &events[..],
            [ProtocolEvent::SpectrumComplete(spectrum), ProtocolEvent::DecodeError(_)]
                if !spectrum.checksum_ok && spectrum.bitsum.is_none()
        ));
        assert_eq!(h.accumulator.state(), RunState::Idle);
    }

    #[test]
    fn decode_error_keeps_pending_preamble() {
        let mut h = Harness::small();
        h.apply(
            FrameKind::TimePreamble,
            Payload::TimePreamble { protocol: "C14".into(), date: "14 Mar. 2022".into() },
        );
        apply_error(&mut h, FrameKind::Unknown);

        let events = h.apply(
            FrameKind::StartTime,
            Payload::StartTime(StartTime { hour: 10, minute: 0, second: 0 }),
        );
        assert!(matches!(&events[..], [ProtocolEvent::RunStarted(header)] if header.protocol == "C14"));
    }

    #[test]
    fn finish_settles_spectrum_waiting_for_digest() {
        let mut h = Harness::small();
        h.apply(FrameKind::BinaryStart, Payload::BinaryStart);
        h.fragment(&[1, 2]);

        // Partial spectra are left alone
        let mut events = Vec::new();
        h.accumulator.finish(&mut events);
        assert!(events.is_empty());

        h.fragment(&[3, 4]);
        h.end();
        h.accumulator.finish(&mut events);
        assert!(matches!(
            &events[..],
            [ProtocolEvent::SpectrumComplete(spectrum)]
                if spectrum.channel_counts == [1, 2, 3, 4] && !spectrum.checksum_ok
        ));
        assert_eq!(h.accumulator.state(), RunState::Idle);
    }

    #[test]
    fn reset_reports_discarded_data() {
        let mut h = Harness::small();
        h.sample(1);
        h.sample(2);
        h.apply(FrameKind::BinaryStart, Payload::BinaryStart);
        h.fragment(&[5]);

        let mut events = Vec::new();
        h.accumulator.reset(&mut events);
        assert_eq!(
            events,
            vec![
                ProtocolEvent::RunReset { previous: RunKind::Spectrum, discarded: 1 },
                ProtocolEvent::RunReset { previous: RunKind::TimeSeries, discarded: 2 },
            ]
        );
        assert_eq!(h.accumulator.snapshot(), RunSnapshot { channel_count: 4, ..RunSnapshot::default() });
    }
}
