//! Streaming decoder for the binary spectrum block.
//!
//! The block is a run-length encoding that only compresses zeros:
//!
//! | Bytes                         | Meaning                                   |
//! |-------------------------------|-------------------------------------------|
//! | `d0 [d1 ..] 0xFF`             | one non-zero value, base 250, LSB first   |
//! | `0xFB n`                      | `n` zero channels (`0xFB 0xFB` = 251)     |
//! | `0xFC`                        | end of data, remaining bytes ignored      |
//! | `0xFD` / `0xFE` as a digit    | digit 13 / digit 35                       |
//!
//! A value may be split across frames, so decoder state survives between
//! [`SpectrumDecoder::decode`] calls until [`SpectrumDecoder::reset`].

use std::fmt;

use super::binary;

/// A problem found inside a spectrum fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpectrumFault {
    /// The reserved byte appeared; the value containing it is dropped
    ReservedByte { offset: usize },
    /// A value had more base-250 digits than allowed; it is dropped
    ValueTooWide { digits: usize },
    /// A zero-run marker was not followed by a usable count
    DanglingRun,
}

impl fmt::Display for SpectrumFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpectrumFault::ReservedByte { offset } => {
                write!(f, "reserved byte 0xFA at offset {offset}")
            }
            SpectrumFault::ValueTooWide { digits } => {
                write!(f, "value wider than {digits} base-250 digits")
            }
            SpectrumFault::DanglingRun => f.write_str("zero-run marker without a count"),
        }
    }
}

/// Channel values decoded from one fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpectrumChunk {
    pub values: Vec<u32>,
    /// The end-of-data byte has been seen
    pub finished: bool,
    pub faults: Vec<SpectrumFault>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    /// Digits of a value, a zero-run marker or end of data
    Value,
    /// The count byte after a zero-run marker
    RunCount,
    /// End of data seen
    Done,
}

/// Decodes channel values from binary block bytes.
#[derive(Debug, Clone)]
pub struct SpectrumDecoder {
    expect: Expect,
    value: u64,
    digits: usize,
    /// The pending value is corrupt and will be dropped at its terminator
    poisoned: bool,
    max_value_digits: usize,
}

/// Digit value of a byte, undoing the two escapes.
fn digit(byte: u8) -> u64 {
    match byte {
        binary::ESCAPED_13 => 13,
        binary::ESCAPED_35 => 35,
        other => u64::from(other),
    }
}

impl SpectrumDecoder {
    pub fn new(max_value_digits: usize) -> Self {
        Self {
            expect: Expect::Value,
            value: 0,
            digits: 0,
            poisoned: false,
            max_value_digits,
        }
    }

    /// Start a fresh block.
    pub fn reset(&mut self) {
        self.expect = Expect::Value;
        self.clear_value();
    }

    pub fn is_finished(&self) -> bool {
        self.expect == Expect::Done
    }

    fn clear_value(&mut self) {
        self.value = 0;
        self.digits = 0;
        self.poisoned = false;
    }

    /// Emit the pending value, if any and if intact.
    fn flush(&mut self, values: &mut Vec<u32>) {
        if self.digits > 0 && !self.poisoned {
            // max_value_digits <= 4 keeps every value below 250^4
            values.push(u32::try_from(self.value).unwrap_or(u32::MAX));
        }
        self.clear_value();
    }

    /// Decode one fragment, continuing from any state left by the previous one.
    pub fn decode(&mut self, bytes: &[u8]) -> SpectrumChunk {
        let mut chunk = SpectrumChunk::default();

        for (offset, &byte) in bytes.iter().enumerate() {
            match self.expect {
                Expect::Done => break,
                Expect::RunCount => match byte {
                    binary::VALUE_END | binary::RESERVED => {
                        chunk.faults.push(SpectrumFault::DanglingRun);
                        self.expect = Expect::Value;
                    }
                    binary::END_OF_DATA => {
                        chunk.faults.push(SpectrumFault::DanglingRun);
                        self.expect = Expect::Done;
                    }
                    binary::ZERO_RUN => {
                        chunk.values.extend(std::iter::repeat_n(0, 251));
                        self.expect = Expect::Value;
                    }
                    count => {
                        let zeros = digit(count) as usize;
                        chunk.values.extend(std::iter::repeat_n(0, zeros));
                        self.expect = Expect::Value;
                    }
                },
                Expect::Value => match byte {
                    binary::VALUE_END => self.flush(&mut chunk.values),
                    binary::ZERO_RUN => {
                        self.flush(&mut chunk.values);
                        self.expect = Expect::RunCount;
                    }
                    binary::END_OF_DATA => {
                        self.flush(&mut chunk.values);
                        self.expect = Expect::Done;
                    }
                    binary::RESERVED => {
                        chunk.faults.push(SpectrumFault::ReservedByte { offset });
                        self.poisoned = true;
                        self.digits += 1;
                    }
                    d => {
                        if self.digits == self.max_value_digits && !self.poisoned {
                            chunk.faults.push(SpectrumFault::ValueTooWide {
                                digits: self.max_value_digits,
                            });
                            self.poisoned = true;
                        }
                        if !self.poisoned {
                            self.value += digit(d) * binary::BASE.pow(self.digits as u32);
                        }
                        self.digits += 1;
                    }
                },
            }
        }

        chunk.finished = self.is_finished();
        chunk
    }

    /// Close the block: flush a value left without its terminator.
    pub fn finish(&mut self) -> SpectrumChunk {
        let mut chunk = SpectrumChunk::default();
        match self.expect {
            Expect::Value => self.flush(&mut chunk.values),
            Expect::RunCount => chunk.faults.push(SpectrumFault::DanglingRun),
            Expect::Done => {}
        }
        self.expect = Expect::Done;
        chunk.finished = true;
        chunk
    }
}

/// Integrity digest over the bytes of a binary block.
///
/// The instrument's real formula is unknown; implementations are compared
/// against the transmitted `Bitsum:` value for an advisory verdict only.
pub trait SpectrumDigest: Send {
    fn reset(&mut self);
    fn update(&mut self, bytes: &[u8]);
    fn value(&self) -> u64;
}

/// Counts set bits across every fragment byte.
#[derive(Debug, Default, Clone)]
pub struct PopcountDigest {
    bits: u64,
}

impl SpectrumDigest for PopcountDigest {
    fn reset(&mut self) {
        self.bits = 0;
    }

    fn update(&mut self, bytes: &[u8]) {
        self.bits += bytes.iter().map(|b| u64::from(b.count_ones())).sum::<u64>();
    }

    fn value(&self) -> u64 {
        self.bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> SpectrumChunk {
        SpectrumDecoder::new(4).decode(bytes)
    }

    #[test]
    fn single_and_multi_digit_values() {
        // 7, then 250 = [0, 1], then 62_501 = [1, 0, 1]
        let chunk = decode_all(&[7, 0xFF, 0, 1, 0xFF, 1, 0, 1, 0xFF, 0xFC]);
        assert_eq!(chunk.values, vec![7, 250, 62_501]);
        assert!(chunk.finished);
        assert!(chunk.faults.is_empty());
    }

    #[test]
    fn escaped_digits() {
        let chunk = decode_all(&[0xFD, 0xFF, 0xFE, 0xFF, 0xFD, 0x01, 0xFF]);
        assert_eq!(chunk.values, vec![13, 35, 13 + 250]);
    }

    #[test]
    fn zero_runs() {
        let chunk = decode_all(&[0xFB, 3, 9, 0xFF, 0xFB, 0xFB, 0xFB, 0xFD, 0xFC]);
        let mut expected = vec![0, 0, 0, 9];
        expected.extend(std::iter::repeat_n(0, 251 + 13));
        assert_eq!(chunk.values, expected);
    }

    #[test]
    fn value_directly_after_run_count() {
        let chunk = decode_all(&[0xFB, 2, 5, 0xFF]);
        assert_eq!(chunk.values, vec![0, 0, 5]);
    }

    #[test]
    fn bytes_after_end_of_data_are_ignored() {
        let mut decoder = SpectrumDecoder::new(4);
        let chunk = decoder.decode(&[4, 0xFF, 0xFC, 8, 0xFF, b'\n']);
        assert_eq!(chunk.values, vec![4]);
        assert!(decoder.decode(&[1, 0xFF]).values.is_empty());
    }

    #[test]
    fn value_split_across_fragments() {
        let mut decoder = SpectrumDecoder::new(4);
        let first = decoder.decode(&[3, 0xFF, 0x10]);
        assert_eq!(first.values, vec![3]);
        assert!(!first.finished);

        let second = decoder.decode(&[0x02, 0xFF, 0xFB]);
        assert_eq!(second.values, vec![16 + 2 * 250]);

        let third = decoder.decode(&[4, 0xFC]);
        assert_eq!(third.values, vec![0, 0, 0, 0]);
        assert!(third.finished);
    }

    #[test]
    fn reserved_byte_drops_value() {
        let chunk = decode_all(&[5, 0xFA, 0xFF, 6, 0xFF]);
        assert_eq!(chunk.values, vec![6]);
        assert_eq!(chunk.faults, vec![SpectrumFault::ReservedByte { offset: 1 }]);
    }

    #[test]
    fn overlong_value_is_dropped() {
        let chunk = decode_all(&[1, 1, 1, 1, 1, 1, 0xFF, 2, 0xFF]);
        assert_eq!(chunk.values, vec![2]);
        assert_eq!(chunk.faults, vec![SpectrumFault::ValueTooWide { digits: 4 }]);
    }

    #[test]
    fn largest_four_digit_value_fits() {
        let chunk = decode_all(&[249, 249, 249, 249, 0xFF]);
        assert_eq!(chunk.values, vec![250u32.pow(4) - 1]);
    }

    #[test]
    fn dangling_run_marker() {
        let chunk = decode_all(&[0xFB, 0xFF, 3, 0xFF]);
        assert_eq!(chunk.values, vec![3]);
        assert_eq!(chunk.faults, vec![SpectrumFault::DanglingRun]);

        let mut decoder = SpectrumDecoder::new(4);
        decoder.decode(&[0xFB]);
        assert_eq!(decoder.finish().faults, vec![SpectrumFault::DanglingRun]);
    }

    #[test]
    fn finish_flushes_unterminated_value() {
        let mut decoder = SpectrumDecoder::new(4);
        decoder.decode(&[9]);
        let tail = decoder.finish();
        assert_eq!(tail.values, vec![9]);
        assert!(tail.finished);
    }

    #[test]
    fn popcount_digest() {
        let mut digest = PopcountDigest::default();
        digest.update(&[0xFF, 0x01]);
        digest.update(&[0x03]);
        assert_eq!(digest.value(), 11);
        digest.reset();
        assert_eq!(digest.value(), 0);
    }
}
