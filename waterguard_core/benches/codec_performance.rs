//! Performance benchmarks for frame encoding and decoding
//!
//! Every poll cycle encodes and decodes a dozen or more frames, so the
//! heuristic decoder sits on the hot path of the coordinator.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use waterguard_core::protocol::codec::{Codec, DecodeContext};
use waterguard_core::protocol::objects::{ObjectType, valve};
use waterguard_core::protocol::{PROP_PRESENT_VALUE, SensorKey};
use waterguard_test_utils::builders::{water_sensor, wired_real, wired_unsigned, wireless_float};

fn benchmark_encoding(c: &mut Criterion) {
    let codec = Codec::new();
    let mut group = c.benchmark_group("encode");

    group.bench_function("read_property", |b| {
        b.iter(|| {
            let frame = codec
                .read_property(black_box(valve::STATUS1), PROP_PRESENT_VALUE)
                .unwrap();
            black_box(frame);
        })
    });

    group.bench_function("write_property", |b| {
        b.iter(|| {
            let frame = codec
                .write_property(black_box(valve::CONTROL), PROP_PRESENT_VALUE, 3u32)
                .unwrap();
            black_box(frame);
        })
    });

    group.finish();
}

fn benchmark_decoding(c: &mut Criterion) {
    let codec = Codec::new();
    let mut group = c.benchmark_group("decode");

    let cases = vec![
        (
            "wired_unsigned",
            wired_unsigned(3),
            DecodeContext::new(ObjectType::MultiStateInput),
        ),
        (
            "wired_sentinel",
            wired_unsigned(1087),
            DecodeContext::new(ObjectType::MultiStateInput),
        ),
        (
            "wired_real",
            wired_real(0.0),
            DecodeContext::new(ObjectType::AnalogInput).with_range(0.0, 1.0),
        ),
        (
            "wireless_float",
            wireless_float(13, 21.5),
            DecodeContext::new(ObjectType::AnalogInput).with_sensor(SensorKey::Temperature),
        ),
        (
            "water_sensor",
            water_sensor(11, true),
            DecodeContext::new(ObjectType::AnalogInput).with_sensor(SensorKey::Leak1),
        ),
    ];

    for (name, frame, ctx) in cases {
        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::new("present_value", name), &frame, |b, frame| {
            b.iter(|| {
                black_box(codec.decode(black_box(frame), &ctx))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_encoding, benchmark_decoding);
criterion_main!(benches);
