//! Codec benchmark suite.
//!
//! Measures the hot path of the event loop: identifying and decoding the
//! lines a busy bus produces, and encoding outgoing frames.
//!
//! Run with: cargo bench --bench codec
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use lcn_pck::{Address, AnalogMode, Codec, Request};
use lcn_pck::protocol::{StatusScope, TextField};

// ============================================================================
// Benchmark Parameters
// ============================================================================

/// Typical lines seen on a bus, one per detector family.
const LINES: &[(&str, &str)] = &[
    ("ack", "-M000005!"),
    ("nak", "-M000005010"),
    ("leds", "=M000005.TLAEBFAAAAAAAAAA"),
    ("name", "=M000005.N1Kitchen   "),
    ("status_relay", ":M000007Rx005"),
    ("status_analog", ":M000005A1050"),
    ("variable", "%M000005.A00301"),
    ("set_value", "%M000005.S1000370"),
    ("serial", "=M000005.SN17020F5566FW190011HW008"),
    ("unknown", "Hello from gateway"),
];

// ============================================================================
// Benchmark: Decode
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let codec = Codec::new(AnalogMode::default());

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(1));

    for &(name, line) in LINES {
        group.bench_with_input(BenchmarkId::new("line", name), line, |b, line| {
            b.iter(|| codec.decode(black_box(line)));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Encode
// ============================================================================

fn bench_encode(c: &mut Criterion) {
    let codec = Codec::new(AnalogMode::default());
    let address = Address::module(0, 5);

    let requests = [
        ("relay", Request::Relay { output: 3, on: true }),
        (
            "analog",
            Request::Analog {
                output: 1,
                level: 55.5,
                ramp: 0.0,
            },
        ),
        (
            "name",
            Request::GetText {
                field: TextField::Name,
                part: 1,
            },
        ),
        ("status", Request::GetStatus(StatusScope::All)),
    ];

    let mut group = c.benchmark_group("encode");

    for (name, request) in &requests {
        group.bench_with_input(BenchmarkId::new("request", name), request, |b, request| {
            b.iter(|| codec.encode(black_box(&address), black_box(request)));
        });
    }

    group.finish();
}

// ============================================================================
// Criterion Setup
// ============================================================================

criterion_group!(benches, bench_decode, bench_encode);
criterion_main!(benches);
