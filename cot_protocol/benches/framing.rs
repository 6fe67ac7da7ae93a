// Throughput benchmark for the frame reassembly path.
//
// Feeds a prebuilt stream of CoT events through `FrameBuffer` in
// socket-sized chunks, measuring bytes/sec for small and large events.

use std::hint::black_box;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};

use cot_protocol::framing::{FrameBuffer, TERMINATOR};

/// Build a stream of `count` events, each with a payload of `body_len`
/// filler bytes before the terminator.
fn build_stream(count: usize, body_len: usize) -> Vec<u8> {
    let mut stream = Vec::with_capacity(count * (body_len + TERMINATOR.len() + 16));
    for i in 0..count {
        stream.extend_from_slice(format!("<event uid=\"{i}\">").as_bytes());
        stream.extend(std::iter::repeat_n(b'x', body_len));
        stream.extend_from_slice(TERMINATOR);
    }
    stream
}

fn drain_in_chunks(stream: &[u8], chunk: usize) -> usize {
    let mut buf = FrameBuffer::new();
    let mut frames = 0;
    for piece in stream.chunks(chunk) {
        frames += buf.push(piece).len();
    }
    frames
}

fn bench_framing(c: &mut Criterion) {
    let mut group = c.benchmark_group("framing");

    let small = build_stream(1000, 200);
    group.throughput(Throughput::Bytes(small.len() as u64));
    group.bench_function("small_events_4k_reads", |b| {
        b.iter(|| drain_in_chunks(black_box(&small), 4096));
    });

    let large = build_stream(50, 128 * 1024);
    group.throughput(Throughput::Bytes(large.len() as u64));
    group.bench_function("large_events_64k_reads", |b| {
        b.iter(|| drain_in_chunks(black_box(&large), 64 * 1024));
    });

    group.finish();
}

criterion_group!(benches, bench_framing);
criterion_main!(benches);
