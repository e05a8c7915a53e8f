//! Transfer Benchmarks
//!
//! Planning, split/reassembly and an end-to-end in-process resolve.
//!
//! Run with: `cargo bench --bench transfer`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

use bytes::Bytes;
use chunk_relay::config::TransferConfig;
use chunk_relay::planner;
use chunk_relay::reconstruct::reconstruct;
use chunk_relay::session::PublishSession;
use chunk_relay::store::{NewObject, ObjectId, ObjectMetadata};

const MIB: usize = 1024 * 1024;

fn payload(len: usize) -> Bytes {
    Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
}

fn bench_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("planning");
    let config = TransferConfig::default();

    for size in [10 * MIB as u64, 50 * MIB as u64, 4096 * MIB as u64] {
        group.bench_with_input(BenchmarkId::new("plan", size), &size, |b, &size| {
            b.iter(|| {
                let plan = planner::plan(black_box(size), config.chunk_size, config.threshold).unwrap();
                black_box(plan.descriptors(&ObjectId::parse("bench").unwrap()))
            })
        });
    }

    group.finish();
}

fn bench_split_reconstruct(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_reconstruct");
    group.measurement_time(Duration::from_secs(10));

    let data = payload(50 * MIB);
    let plan = planner::chunked(data.len() as u64, 16 * MIB as u64).unwrap();
    let metadata = ObjectMetadata {
        name: "bench.bin".to_string(),
        mime_type: "application/octet-stream".to_string(),
        size: data.len() as u64,
        last_modified: chrono::Utc::now(),
    };
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("50mib_16mib_chunks", |b| {
        b.iter(|| {
            let parts = planner::split(black_box(&data), &plan).unwrap();
            reconstruct(ObjectId::parse("bench").unwrap(), parts, metadata.clone()).unwrap()
        })
    });

    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(20);

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let session = runtime.block_on(async { PublishSession::start(TransferConfig::default()).unwrap() });

    for (label, size) in [("fast_path_10mib", 10 * MIB), ("chunked_50mib", 50 * MIB)] {
        let id = session
            .register(payload(size), NewObject::named("bench.bin"))
            .unwrap();
        let requester = session.requester();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(label, |b| {
            b.iter(|| runtime.block_on(requester.resolve(black_box(&id))).unwrap())
        });
    }

    group.finish();
    runtime.block_on(session.end());
}

criterion_group!(benches, bench_planning, bench_split_reconstruct, bench_resolve);
criterion_main!(benches);
