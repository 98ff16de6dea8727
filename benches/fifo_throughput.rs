// CLASSIFICATION: COMMUNITY
// Filename: fifo_throughput.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shrm::fifo::{FifoReader, FifoWriter, SharedRing};
use shrm::L2Header;

const RING_WORDS: u32 = 0x8000;

fn bench_write_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("fifo_write_drain");
    for len in [16usize, 256, 1500] {
        let payload = vec![0xa5u8; len];
        group.throughput(Throughput::Bytes((len * 32) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &payload, |b, payload| {
            let ring = Arc::new(SharedRing::new(RING_WORDS));
            let mut writer = FifoWriter::new(Arc::clone(&ring));
            let mut reader = FifoReader::new(ring);
            b.iter(|| {
                for _ in 0..32 {
                    writer.write_msg(L2Header::ISI, payload).unwrap();
                }
                writer.publish();
                reader.refresh();
                while reader.has_unread() {
                    let msg = reader.read_one().unwrap();
                    criterion::black_box(msg);
                }
                reader.publish();
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_write_drain);
criterion_main!(benches);
