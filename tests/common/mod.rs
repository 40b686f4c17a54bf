//! Byte fixtures for integration tests, written out by hand from captures.

#![allow(dead_code)]

/// LCD update line as the counter sends it: `\r` only, fixed-width fields.
pub fn time_line(elapsed: u32, cpm: u64) -> Vec<u8> {
    format!("{{t{elapsed:>7}R:{cpm:>7}\r").into_bytes()
}

/// A text line with the counter's `\n\r` ending.
pub fn text_line(text: &str) -> Vec<u8> {
    let mut line = text.as_bytes().to_vec();
    line.extend_from_slice(b"\n\r");
    line
}

/// Binary block body: base-250 digits, LSB first, 0xFF after each value,
/// `0xFB n` for runs of zeros, 0xFC at the end.
pub fn encode_counts(counts: &[u32]) -> Vec<u8> {
    fn digit(d: u8) -> u8 {
        match d {
            13 => 0xFD,
            35 => 0xFE,
            d => d,
        }
    }

    let mut out = Vec::new();
    let mut zeros = 0usize;
    let mut flush = |out: &mut Vec<u8>, zeros: &mut usize| {
        while *zeros > 0 {
            let run = (*zeros).min(200);
            out.push(0xFB);
            out.push(digit(run as u8));
            *zeros -= run;
        }
    };

    for &count in counts {
        if count == 0 {
            zeros += 1;
            continue;
        }
        flush(&mut out, &mut zeros);
        let mut value = count;
        while value > 0 {
            out.push(digit((value % 250) as u8));
            value /= 250;
        }
        out.push(0xFF);
    }
    flush(&mut out, &mut zeros);
    out.push(0xFC);
    out
}

/// Spectrum preamble, start time and a binary block cut into `fragments`
/// frames. Returns the bytes and the popcount digest of the fragments.
pub fn spectrum_block(counts: &[u32], fragments: usize) -> (Vec<u8>, u64) {
    let body = encode_counts(counts);
    let size = body.len().div_ceil(fragments.max(1));

    let mut out = text_line("[ C14 ] 14 Mar.2022");
    out.extend(text_line("Start Time 10:45:00"));
    out.extend(text_line("=>Start(binary)"));

    let mut digest = 0u64;
    let pieces: Vec<&[u8]> = body.chunks(size.max(1)).collect();
    for (index, piece) in pieces.iter().enumerate() {
        let mut frame = piece.to_vec();
        if index + 1 == pieces.len() {
            frame.push(b'\n');
        }
        digest += frame.iter().map(|b| u64::from(b.count_ones())).sum::<u64>();
        out.extend(&frame);
        out.push(b'\r');
    }
    out.extend(text_line("=>End(binary)"));
    (out, digest)
}

/// A complete spectrum with a matching (or deliberately wrong) digest line.
pub fn spectrum_with_bitsum(counts: &[u32], fragments: usize, corrupt: bool) -> Vec<u8> {
    let (mut out, digest) = spectrum_block(counts, fragments);
    let transmitted = if corrupt { digest + 1 } else { digest };
    out.extend(text_line(&format!("Bitsum:{transmitted}")));
    out
}

/// Counts with a recognizable shape: a peak near channel 300.
pub fn peaked_counts(channels: usize) -> Vec<u32> {
    (0..channels)
        .map(|channel| {
            let distance = (channel as i64 - 300).unsigned_abs();
            if distance < 40 { (40 - distance as u32) * 1000 } else { 0 }
        })
        .collect()
}
