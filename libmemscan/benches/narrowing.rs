//! Benchmark for the narrowing pass: re-evaluating an existing MatchArray
//! against a fresh read of the target, which is the operation repeated on
//! every scan after the first.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use libmemscan::io::ProcessMemory;
use libmemscan::predicate::RegexCache;
use libmemscan::region::{Permissions, Region, RegionClass, RegionLevel};
use libmemscan::scanner::{CancelToken, ScanOptions, first_pass_sequential, narrow_sequential};
use libmemscan::value::{DataType, MatchKind, UserValue};

fn dummy_region(start: usize, size: usize) -> Region {
    Region {
        id: 0,
        start,
        size,
        perms: Permissions {
            read: true,
            write: true,
            execute: false,
            shared: false,
        },
        load_address: start,
        filename: None,
        class: RegionClass::Misc,
    }
}

fn benchmark_narrow_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("narrow_sequential");
    let mem = ProcessMemory::new(std::process::id() as i32);
    let cancel = CancelToken::new();

    for count in [256usize, 4096, 65536].iter() {
        let buf: Vec<i32> = vec![7; *count];
        let region = dummy_region(buf.as_ptr() as usize, std::mem::size_of_val(buf.as_slice()));

        let seed_opts = ScanOptions {
            data_type: DataType::I32,
            match_kind: MatchKind::Any,
            region_level: RegionLevel::All,
            step: 4,
            ..Default::default()
        };
        let mut seed_cache = RegexCache::new();
        let (seeded, _) = first_pass_sequential(
            &mem,
            &[region.clone()],
            &seed_opts,
            None,
            &cancel,
            &mut seed_cache,
        )
        .unwrap();

        let narrow_opts = ScanOptions {
            data_type: DataType::I32,
            match_kind: MatchKind::EqualTo,
            step: 4,
            ..seed_opts.clone()
        };
        let user = UserValue::parse_integer("7", DataType::I32).unwrap();

        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("equal_to", count), count, |b, &_count| {
            let mut cache = RegexCache::new();
            b.iter(|| {
                let (narrowed, _) = narrow_sequential(
                    &mem,
                    black_box(&seeded),
                    &narrow_opts,
                    &user,
                    &cancel,
                    &mut cache,
                )
                .unwrap();
                black_box(narrowed)
            });
        });
    }

    group.finish();
}

fn benchmark_first_pass_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("first_pass_sequential");
    let mem = ProcessMemory::new(std::process::id() as i32);
    let cancel = CancelToken::new();

    for count in [256usize, 4096, 65536].iter() {
        let buf: Vec<i32> = vec![0; *count];
        let region = dummy_region(buf.as_ptr() as usize, std::mem::size_of_val(buf.as_slice()));
        let options = ScanOptions {
            data_type: DataType::I32,
            match_kind: MatchKind::Any,
            region_level: RegionLevel::All,
            step: 4,
            ..Default::default()
        };

        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("any", count), count, |b, &_count| {
            let mut cache = RegexCache::new();
            b.iter(|| {
                let (array, _) = first_pass_sequential(
                    &mem,
                    black_box(std::slice::from_ref(&region)),
                    &options,
                    None,
                    &cancel,
                    &mut cache,
                )
                .unwrap();
                black_box(array)
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_narrow_sequential,
    benchmark_first_pass_sequential
);
criterion_main!(benches);
