//! Benchmark for reading foreign-process memory and classifying its
//! regions — the I/O path every scan pass walks before any predicate runs.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use libmemscan::io::ProcessMemory;
use libmemscan::region::{self, RegionLevel};

fn benchmark_process_memory_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_memory_read");
    let mem = ProcessMemory::new(std::process::id() as i32);

    for size in [1024, 4096, 16384, 65536].iter() {
        let backing = vec![0xAAu8; *size];
        let addr = backing.as_ptr() as usize;

        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("self_read", size), size, |b, &size| {
            let mut buf = vec![0u8; size];
            b.iter(|| mem.read(black_box(addr), black_box(&mut buf)).unwrap());
        });
    }

    group.finish();
}

fn benchmark_maps_parse_and_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("maps_parse_and_classify");
    let pid = std::process::id() as i32;

    group.bench_function("parse_maps", |b| {
        b.iter(|| region::parse_maps(black_box(pid)).unwrap());
    });

    let regions = region::parse_maps(pid).unwrap();
    for level in [
        RegionLevel::All,
        RegionLevel::AllRw,
        RegionLevel::HeapStackExecutable,
        RegionLevel::HeapStackExecutableBss,
    ] {
        group.bench_with_input(
            BenchmarkId::new("filter_regions", format!("{level:?}")),
            &level,
            |b, &level| {
                b.iter(|| region::filter_regions(black_box(&regions), level));
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_process_memory_read,
    benchmark_maps_parse_and_classify
);
criterion_main!(benches);
