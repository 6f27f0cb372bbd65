//! Hot-path benchmarks: batch framing, seed derivation and packet parsing.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use lockstep_sync::core::framing::FrameBuffer;
use lockstep_sync::network::header::{build_packet, parse_packet, PacketHeader};
use lockstep_sync::{entity_seeds, seed_digest};

fn bench_framing(c: &mut Criterion) {
    let payload = [0xABu8; 48];
    c.bench_function("frame_append_drain", |b| {
        b.iter(|| {
            let mut buf = FrameBuffer::new();
            while buf.append(black_box(&payload)).is_ok() {}
            let mut out = Vec::with_capacity(512);
            let mut drained = 0;
            while !buf.is_empty() {
                out.clear();
                buf.drain_up_to(&mut out, 488);
                drained += out.len();
            }
            drained
        })
    });
}

fn bench_seeds(c: &mut Criterion) {
    let mut group = c.benchmark_group("seeds");
    for count in [200usize, 1024] {
        group.bench_with_input(BenchmarkId::new("entity_seeds", count), &count, |b, &n| {
            b.iter(|| entity_seeds(black_box(1234), n).fold(0u32, |acc, s| acc ^ s))
        });
        group.bench_with_input(BenchmarkId::new("seed_digest", count), &count, |b, &n| {
            b.iter(|| seed_digest(black_box(1234), n))
        });
    }
    group.finish();
}

fn bench_packet(c: &mut Criterion) {
    let packet = build_packet(PacketHeader::blank(), &[7u8; 200]).unwrap();
    c.bench_function("parse_packet", |b| {
        b.iter(|| parse_packet(1, black_box(&packet)).map(|(_, body)| body.len()))
    });
}

criterion_group!(benches, bench_framing, bench_seeds, bench_packet);
criterion_main!(benches);
