use bytes::Bytes;
use cast_proto::{Frame, Request};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn bench_data_frame_encode(c: &mut Criterion) {
    let chunk = Bytes::from(vec![0u8; 200 * 1024]); // Default refill block
    let frame = Frame::Request(Request::ReceiveData { chunk, last: false });

    let mut group = c.benchmark_group("frame_encode");
    group.throughput(Throughput::Bytes(200 * 1024));
    group.bench_function("receive_data", |b| {
        b.iter(|| {
            let bytes = black_box(&frame).encode();
            black_box(bytes);
        });
    });
    group.finish();
}

fn bench_data_frame_decode(c: &mut Criterion) {
    let chunk = Bytes::from(vec![0u8; 200 * 1024]);
    let frame = Frame::Request(Request::ReceiveData { chunk, last: false });
    let bytes = frame.encode();

    let mut group = c.benchmark_group("frame_decode");
    group.throughput(Throughput::Bytes(200 * 1024));
    group.bench_function("receive_data", |b| {
        b.iter(|| {
            let frame = Frame::decode(black_box(&bytes)).unwrap();
            black_box(frame);
        });
    });
    group.finish();
}

fn bench_control_frame_roundtrip(c: &mut Criterion) {
    let frame = Frame::Request(Request::Start {
        delay_micros: 250_000,
    });

    c.bench_function("control_frame_roundtrip", |b| {
        b.iter(|| {
            let bytes = black_box(&frame).encode();
            let decoded = Frame::decode(&bytes).unwrap();
            black_box(decoded);
        });
    });
}

criterion_group!(
    benches,
    bench_data_frame_encode,
    bench_data_frame_decode,
    bench_control_frame_roundtrip
);
criterion_main!(benches);
