//! Builders for synthetic instrument transcripts.
//!
//! Real instrument captures are not redistributable, so tests and benches
//! build byte streams here with the same framing the counter produces.

#![cfg(any(test, feature = "benchmark"))]

use crate::protocol::binary;

/// Encode channel counts the way the instrument does in its binary block.
///
/// The result ends with the end-of-data byte and never contains `\r`.
pub fn encode_spectrum(counts: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(counts.len());
    let mut zeros = 0usize;

    for &count in counts {
        if count == 0 {
            zeros += 1;
            continue;
        }
        push_zero_run(&mut out, zeros);
        zeros = 0;

        let mut value = u64::from(count);
        while value > 0 {
            out.push(escape_digit((value % binary::BASE) as u8));
            value /= binary::BASE;
        }
        out.push(binary::VALUE_END);
    }

    push_zero_run(&mut out, zeros);
    out.push(binary::END_OF_DATA);
    out
}

fn push_zero_run(out: &mut Vec<u8>, mut zeros: usize) {
    while zeros > 0 {
        // 250 would encode as the reserved byte
        let run = match zeros.min(251) {
            250 => 249,
            n => n,
        };
        out.push(binary::ZERO_RUN);
        out.push(match run {
            251 => binary::ZERO_RUN,
            n => escape_digit(n as u8),
        });
        zeros -= run;
    }
}

fn escape_digit(digit: u8) -> u8 {
    match digit {
        13 => binary::ESCAPED_13,
        35 => binary::ESCAPED_35,
        d => d,
    }
}

/// Set bits across a byte slice, matching the default spectrum digest.
pub fn popcount(bytes: &[u8]) -> u64 {
    bytes.iter().map(|b| u64::from(b.count_ones())).sum()
}

/// Builds a Commfil v.2 byte stream line by line.
///
/// ```rust,ignore
/// let bytes = TranscriptBuilder::new()
///     .time_preamble("C14", "14 Mar.2022", (10, 42, 7))
///     .time_samples(&[(1, 120), (2, 118)])
///     .build();
/// ```
#[derive(Debug, Default, Clone)]
pub struct TranscriptBuilder {
    bytes: Vec<u8>,
}

impl TranscriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text line terminated with `\n\r`
    pub fn line(mut self, text: &str) -> Self {
        self.bytes.extend_from_slice(text.as_bytes());
        self.bytes.extend_from_slice(b"\n\r");
        self
    }

    /// Bytes appended verbatim
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    /// LCD update line, terminated with `\r` only
    pub fn time_sample(mut self, elapsed: u32, cpm: u64) -> Self {
        self.bytes.extend_from_slice(format!("{{t{elapsed:>7}R:{cpm:>7}\r").as_bytes());
        self
    }

    pub fn time_samples(self, samples: &[(u32, u64)]) -> Self {
        samples.iter().fold(self, |builder, &(elapsed, cpm)| builder.time_sample(elapsed, cpm))
    }

    pub fn sample_label(self, protocol: &str, sample_number: u32) -> Self {
        self.line(&format!("[< {protocol} >S: {sample_number}"))
    }

    pub fn time_preamble(self, protocol: &str, date: &str, start: (u8, u8, u8)) -> Self {
        self.line(&format!("Name:< {protocol} >{date}")).start_time(start)
    }

    pub fn spectrum_preamble(self, protocol: &str, date: &str, start: (u8, u8, u8)) -> Self {
        self.line(&format!("[ {protocol} ] {date}")).start_time(start)
    }

    fn start_time(self, (hour, minute, second): (u8, u8, u8)) -> Self {
        self.line(&format!("Start Time {hour:02}:{minute:02}:{second:02}"))
    }

    /// Binary block split into `fragments` frames, followed by its end marker.
    ///
    /// Returns the builder and the digest the default algorithm computes.
    pub fn binary_block(mut self, counts: &[u32], fragments: usize) -> (Self, u64) {
        let encoded = encode_spectrum(counts);
        let size = encoded.len().div_ceil(fragments.max(1)).max(1);

        self = self.line("=>Start(binary)");
        let mut digest = 0;
        let mut pieces = encoded.chunks(size).peekable();
        while let Some(piece) = pieces.next() {
            self.bytes.extend_from_slice(piece);
            digest += popcount(piece);
            if pieces.peek().is_none() {
                // The last fragment is a text-style line ending
                self.bytes.push(b'\n');
                digest += popcount(b"\n");
            }
            self.bytes.push(b'\r');
        }
        (self.line("=>End(binary)"), digest)
    }

    pub fn bitsum(self, value: u64) -> Self {
        self.line(&format!("Bitsum:{value}"))
    }

    /// Preamble, one-fragment binary block and a matching digest line.
    pub fn spectrum(self, protocol: &str, date: &str, start: (u8, u8, u8), counts: &[u32]) -> Self {
        let (builder, digest) =
            self.spectrum_preamble(protocol, date, start).binary_block(counts, 1);
        builder.bitsum(digest)
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}
