//! Benchmarks for end-to-end decoding throughput
//!
//! The counter sends at most 960 bytes per second, so any result in the
//! megabytes per second range leaves the decoder idle. These numbers guard
//! against regressions in the framer and the spectrum decoder.
//!
//! Platform: Cross-platform (synthetic transcripts, CI-safe)

use commfil::protocol::{ByteFramer, SpectrumDecoder};
use commfil::test_utils::{TranscriptBuilder, encode_spectrum};
use commfil::{DecoderConfig, ProtocolEvent, ProtocolSession};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

/// One realistic run: preamble, a minute of samples, a full spectrum.
fn run_transcript() -> Vec<u8> {
    let counts: Vec<u32> = (0..1024u32).map(|c| if c % 3 == 0 { c * 37 } else { 0 }).collect();
    let samples: Vec<(u32, u64)> = (1..=60).map(|s| (s, 1_000 + u64::from(s) * 13)).collect();

    TranscriptBuilder::new()
        .time_preamble("C14", "14 Mar.2022", (10, 42, 7))
        .time_samples(&samples)
        .spectrum("C14", "14 Mar.2022", (10, 43, 8), &counts)
        .build()
}

fn bench_session_feed(c: &mut Criterion) {
    let transcript = run_transcript();
    let config = DecoderConfig::default();

    let mut group = c.benchmark_group("session_feed");
    group.throughput(Throughput::Bytes(transcript.len() as u64));

    for chunk_size in [1usize, 16, 256, usize::MAX] {
        let label = if chunk_size == usize::MAX { "whole".to_string() } else { chunk_size.to_string() };
        group.bench_with_input(BenchmarkId::new("chunk", label), &chunk_size, |b, &size| {
            b.iter(|| {
                let mut session = ProtocolSession::new(&config, Vec::<ProtocolEvent>::new());
                for chunk in transcript.chunks(size.min(transcript.len())) {
                    session.feed(black_box(chunk));
                }
                black_box(session.into_sink())
            })
        });
    }

    group.finish();
}

fn bench_framer(c: &mut Criterion) {
    let transcript = run_transcript();

    let mut group = c.benchmark_group("framer");
    group.throughput(Throughput::Bytes(transcript.len() as u64));

    group.bench_function("split_frames", |b| {
        b.iter(|| {
            let mut framer = ByteFramer::new(b'\r', 16 * 1024);
            black_box(framer.feed(black_box(&transcript)))
        })
    });

    group.finish();
}

fn bench_spectrum_decoder(c: &mut Criterion) {
    let dense: Vec<u32> = (0..1024u32).map(|c| c * 1_000 + 1).collect();
    let sparse: Vec<u32> = (0..1024u32).map(|c| u32::from(c % 64 == 0)).collect();

    let mut group = c.benchmark_group("spectrum_decoder");
    for (name, counts) in [("dense", dense), ("sparse", sparse)] {
        let encoded = encode_spectrum(&counts);
        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut decoder = SpectrumDecoder::new(4);
                black_box(decoder.decode(black_box(&encoded)))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_session_feed, bench_framer, bench_spectrum_decoder);
criterion_main!(benches);
