//! Benchmarks for decode and unmask performance.
use std::io::Cursor;

use bytes::{Bytes, BytesMut};
use criterion::{black_box, BatchSize, Criterion, Throughput};
use ws_transport::{FrameDecoder, Session};

const KEY: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

fn masked_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x82];
    match payload.len() {
        0..=125 => frame.push(0x80 | payload.len() as u8),
        126..=65535 => {
            frame.push(0x80 | 126);
            frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        }
        _ => {
            frame.push(0x80 | 127);
            frame.extend_from_slice(&(payload.len() as u64).to_be_bytes());
        }
    }
    frame.extend_from_slice(&KEY);
    frame.extend(payload.iter().enumerate().map(|(i, b)| b ^ KEY[i & 3]));
    frame
}

fn benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for (name, payload_len, count) in
        [("small frames", 32usize, 4096usize), ("large frames", 64 * 1024, 16)]
    {
        let payload: Vec<u8> = (0..payload_len).map(|i| (i * 31) as u8).collect();
        let frame = masked_frame(&payload);
        let mut wire = Vec::with_capacity(frame.len() * count);
        for _ in 0..count {
            wire.extend_from_slice(&frame);
        }
        group.throughput(Throughput::Bytes(wire.len() as u64));
        group.bench_function(name, |b| {
            let session: Session<Vec<Bytes>> = Session::new(Vec::new(), false, 1);
            b.iter_batched(
                || BytesMut::from(&wire[..]),
                |mut buf| {
                    let mut decoder = FrameDecoder::new();
                    let mut out = Vec::with_capacity(count);
                    decoder
                        .decode(&mut Cursor::new(Vec::new()), &mut buf, &session, &mut out)
                        .unwrap();
                    black_box(out);
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion::criterion_group!(decode_benches, benchmark);
criterion::criterion_main!(decode_benches);
