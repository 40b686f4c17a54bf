//! Typed payload extraction from classified frames.

use bytes::Bytes;
use tracing::{debug, trace, warn};

use super::markers;
use super::spectrum::{PopcountDigest, SpectrumChunk, SpectrumDecoder, SpectrumDigest};
use crate::config::DecoderConfig;
use crate::error::DecodeError;
use crate::types::{BitsumCheck, ClassifiedFrame, FrameKind, RawFrame, StartTime};

/// The typed content of one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Elapsed time exactly as transmitted; the accumulator decides its meaning
    TimeSample { raw_elapsed: u32, count_rate: f64 },
    SampleLabel { protocol: String, sample_number: u32 },
    TimePreamble { protocol: String, date: String },
    SpectrumPreamble { protocol: String, date: String },
    StartTime(StartTime),
    BinaryStart,
    SpectrumFragment(SpectrumChunk),
    /// Block closed; carries any value left pending by the last fragment
    BinaryEnd(SpectrumChunk),
    Bitsum(BitsumCheck),
    Blank,
}

/// Converts classified frames into payloads.
///
/// Holds the streaming spectrum decoder and the digest, both of which span
/// the frames of one binary block.
pub struct PayloadParser {
    decoder: SpectrumDecoder,
    digest: Box<dyn SpectrumDigest>,
    elapsed_field_width: usize,
    rate_field_width: usize,
}

impl std::fmt::Debug for PayloadParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadParser")
            .field("decoder", &self.decoder)
            .field("digest", &self.digest.value())
            .finish()
    }
}

impl PayloadParser {
    pub fn new(config: &DecoderConfig) -> Self {
        Self::with_digest(config, Box::new(PopcountDigest::default()))
    }

    /// Use a different digest algorithm for the `Bitsum:` comparison.
    pub fn with_digest(config: &DecoderConfig, digest: Box<dyn SpectrumDigest>) -> Self {
        Self {
            decoder: SpectrumDecoder::new(config.max_value_digits),
            digest,
            elapsed_field_width: config.elapsed_field_width,
            rate_field_width: config.rate_field_width,
        }
    }

    /// Forget any partially decoded binary block.
    pub fn reset(&mut self) {
        self.decoder.reset();
        self.digest.reset();
    }

    /// True once the open block's data has reached its end-of-data byte.
    pub fn spectrum_finished(&self) -> bool {
        self.decoder.is_finished()
    }

    /// Whether `frame` parses cleanly as a time sample, without touching
    /// the spectrum state.
    pub fn is_time_sample(&self, frame: &RawFrame) -> bool {
        self.parse_time_sample(frame.trimmed(), frame.bytes()).is_ok()
    }

    /// Parse one frame.
    ///
    /// A digest mismatch is not an error; it is reported through the
    /// returned [`BitsumCheck`].
    pub fn parse(&mut self, frame: &ClassifiedFrame) -> Result<Payload, DecodeError> {
        let raw = frame.frame.bytes();
        let text = frame.frame.trimmed();

        match frame.kind {
            FrameKind::Blank => Ok(Payload::Blank),
            FrameKind::Unknown => Err(DecodeError::Framing { raw: raw.clone() }),
            FrameKind::TimeSample => self.parse_time_sample(text, raw),
            FrameKind::SampleLabel => parse_sample_label(text, raw),
            FrameKind::TimePreamble => {
                let (protocol, date) =
                    parse_preamble(text, markers::TIME_PREAMBLE, b'>', "time preamble", raw)?;
                Ok(Payload::TimePreamble { protocol, date })
            }
            FrameKind::SpectrumPreamble => {
                let (protocol, date) =
                    parse_preamble(text, b"[", b']', "spectrum preamble", raw)?;
                Ok(Payload::SpectrumPreamble { protocol, date })
            }
            FrameKind::StartTime => parse_start_time(text, raw).map(Payload::StartTime),
            FrameKind::BinaryStart => {
                debug!("Binary block opened");
                self.reset();
                Ok(Payload::BinaryStart)
            }
            FrameKind::SpectrumFragment => {
                // Binary fragments are never trimmed
                let bytes = frame.frame.as_bytes();
                self.digest.update(bytes);
                let chunk = self.decoder.decode(bytes);
                trace!(
                    "Spectrum fragment: {} bytes, {} values, finished={}",
                    bytes.len(),
                    chunk.values.len(),
                    chunk.finished
                );
                Ok(Payload::SpectrumFragment(chunk))
            }
            FrameKind::BinaryEnd => {
                debug!("Binary block closed");
                Ok(Payload::BinaryEnd(self.decoder.finish()))
            }
            FrameKind::Bitsum => {
                let field = strip_marker(text, markers::BITSUM, "bitsum", raw)?;
                let transmitted = parse_number(field, 20, "bitsum", raw)?;
                let check = BitsumCheck { transmitted, computed: self.digest.value() };
                if check.matches() {
                    debug!("Spectrum bitsum matches: {}", transmitted);
                } else {
                    warn!(
                        "Spectrum bitsum mismatch: transmitted {}, computed {}",
                        check.transmitted, check.computed
                    );
                }
                Ok(Payload::Bitsum(check))
            }
        }
    }

    fn parse_time_sample(&self, text: &[u8], raw: &Bytes) -> Result<Payload, DecodeError> {
        let body = strip_marker(text, markers::TIME_SAMPLE, "time sample", raw)?;
        let split = find(body, b"R:").ok_or_else(|| {
            DecodeError::structural("time sample", "missing 'R:' separator", raw.clone())
        })?;

        let elapsed = parse_number(&body[..split], self.elapsed_field_width, "time sample", raw)?;
        let rate = parse_number(&body[split + 2..], self.rate_field_width, "time sample", raw)?;

        Ok(Payload::TimeSample {
            // elapsed_field_width <= 9 keeps this in range
            raw_elapsed: u32::try_from(elapsed).map_err(|_| {
                DecodeError::structural("time sample", "elapsed time out of range", raw.clone())
            })?,
            count_rate: rate as f64,
        })
    }
}

fn parse_sample_label(text: &[u8], raw: &Bytes) -> Result<Payload, DecodeError> {
    let body = strip_marker(text, markers::SAMPLE_LABEL, "sample label", raw)?;
    let split = find(body, b">S:").ok_or_else(|| {
        DecodeError::structural("sample label", "missing '>S:' separator", raw.clone())
    })?;

    let protocol = parse_name(&body[..split], "sample label", raw)?;
    let number = parse_number(&body[split + 3..], 9, "sample label", raw)?;

    Ok(Payload::SampleLabel {
        protocol,
        sample_number: u32::try_from(number).map_err(|_| {
            DecodeError::structural("sample label", "sample number out of range", raw.clone())
        })?,
    })
}

/// `<open><name><close><day> <month><year>`, returning `(name, "day month year")`.
fn parse_preamble(
    text: &[u8],
    open: &[u8],
    close: u8,
    context: &'static str,
    raw: &Bytes,
) -> Result<(String, String), DecodeError> {
    let body = strip_marker(text, open, context, raw)?;
    let split = body.iter().position(|&b| b == close).ok_or_else(|| {
        DecodeError::structural(context, format!("missing '{}'", close as char), raw.clone())
    })?;

    let protocol = parse_name(&body[..split], context, raw)?;
    let date = parse_date(&body[split + 1..])
        .map_err(|details| DecodeError::structural(context, details, raw.clone()))?;

    Ok((protocol, date))
}

/// `14 Mar.2022` becomes `14 Mar. 2022`.
fn parse_date(field: &[u8]) -> Result<String, String> {
    let field = trim_spaces(field);
    let space = field
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| "date has no day separator".to_string())?;

    let (day, rest) = (&field[..space], trim_spaces(&field[space + 1..]));
    if day.is_empty() || !day.iter().all(u8::is_ascii_digit) {
        return Err("date day is not a number".to_string());
    }
    if rest.len() <= 4 {
        return Err("date is missing its month or year".to_string());
    }

    let (month, year) = rest.split_at(rest.len() - 4);
    if !year.iter().all(u8::is_ascii_digit) {
        return Err("date year is not four digits".to_string());
    }
    let month = trim_spaces(month);
    if month.is_empty() || !month.iter().all(|b| b.is_ascii_alphabetic() || *b == b'.') {
        return Err("date month is not a name".to_string());
    }

    Ok(format!("{} {} {}", latin1(day), latin1(month), latin1(year)))
}

fn parse_start_time(text: &[u8], raw: &Bytes) -> Result<StartTime, DecodeError> {
    let invalid = |details: &str| DecodeError::structural("start time", details, raw.clone());

    let mut parts = text.split(|&b| b == b':');
    let (Some(hour), Some(minute), Some(second)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid("expected HH:MM:SS"));
    };

    // The hour is the last two characters before the first colon
    let hour = &hour[hour.len().saturating_sub(2)..];
    let hour = parse_number(hour, 2, "start time", raw)?;
    let minute = parse_number(minute, 2, "start time", raw)?;
    let second = parse_number(second, 2, "start time", raw)?;

    if hour > 23 || minute > 59 || second > 59 {
        return Err(invalid("time of day out of range"));
    }

    Ok(StartTime { hour: hour as u8, minute: minute as u8, second: second as u8 })
}

/// The frame body after its leading marker.
fn strip_marker<'a>(
    text: &'a [u8],
    marker: &[u8],
    context: &'static str,
    raw: &Bytes,
) -> Result<&'a [u8], DecodeError> {
    text.strip_prefix(marker)
        .ok_or_else(|| DecodeError::structural(context, "missing leading marker", raw.clone()))
}

/// A space-padded decimal field of at most `width` digits.
fn parse_number(
    field: &[u8],
    width: usize,
    context: &'static str,
    raw: &Bytes,
) -> Result<u64, DecodeError> {
    let digits = trim_spaces(field);

    if digits.is_empty() {
        return Err(DecodeError::structural(context, "empty numeric field", raw.clone()));
    }
    if let Some(bad) = digits.iter().find(|b| !b.is_ascii_digit()) {
        return Err(DecodeError::structural(
            context,
            format!("unexpected byte 0x{bad:02X} in numeric field"),
            raw.clone(),
        ));
    }
    if digits.len() > width {
        return Err(DecodeError::structural(
            context,
            format!("{} digits exceeds field width {}", digits.len(), width),
            raw.clone(),
        ));
    }

    digits
        .iter()
        .try_fold(0u64, |acc, &d| acc.checked_mul(10)?.checked_add(u64::from(d - b'0')))
        .ok_or_else(|| DecodeError::structural(context, "numeric field overflows", raw.clone()))
}

/// A protocol name: letters, digits, spaces, `-` and `_`.
fn parse_name(field: &[u8], context: &'static str, raw: &Bytes) -> Result<String, DecodeError> {
    if let Some(bad) = field.iter().find(|&&b| !(b.is_ascii_alphanumeric() || b" -_".contains(&b)))
    {
        return Err(DecodeError::structural(
            context,
            format!("unexpected byte 0x{bad:02X} in protocol name"),
            raw.clone(),
        ));
    }
    Ok(latin1(trim_spaces(field)))
}

fn trim_spaces(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != b' ').unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|&b| b != b' ').map_or(start, |i| i + 1);
    &bytes[start..end]
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// The instrument talks Latin-1, where every byte is one char.
fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
