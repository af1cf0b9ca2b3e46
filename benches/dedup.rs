//! Benchmarks for extraction, deduplication and compile-time merging.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

use blacklist::aggregator::{deduplicate, merge, Dict};
use blacklist::extractor::extract;

/// Hosts-file text with one entry per line, every other name repeated
fn generate_hosts(count: usize) -> String {
    (0..count)
        .map(|i| format!("0.0.0.0 ads{}.tracker{}.example.com\n", i % (count / 2 + 1), i % 97))
        .collect()
}

/// Bind zone text
fn generate_zones(count: usize) -> String {
    (0..count)
        .map(|i| format!("zone \"bad{}.example.net\" {{type master; file \"/etc/null\";}};\n", i))
        .collect()
}

fn generate_domains(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("host{}.zone{}.example.com", i % (count / 2 + 1), i % 53))
        .collect()
}

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract");

    for size in [100, 1000, 10000, 50000] {
        let hosts = generate_hosts(size);
        group.bench_with_input(BenchmarkId::new("hosts", size), &hosts, |b, text| {
            b.iter(|| black_box(extract(text, None)));
        });

        let zones = generate_zones(size);
        group.bench_with_input(BenchmarkId::new("zones", size), &zones, |b, text| {
            b.iter(|| black_box(extract(text, Some("zone"))));
        });
    }

    group.finish();
}

fn bench_deduplicate(c: &mut Criterion) {
    let mut group = c.benchmark_group("deduplicate");

    let excludes: Dict = (0..500)
        .map(|i| format!("host{}.zone{}.example.com", i, i % 53))
        .collect::<Vec<_>>()
        .iter()
        .map(String::as_str)
        .collect();

    for size in [100, 1000, 10000] {
        let domains = generate_domains(size);
        group.bench_with_input(
            BenchmarkId::new("with_excludes", size),
            &domains,
            |b, domains| {
                b.iter(|| black_box(deduplicate(domains.iter().map(String::as_str), &excludes)));
            },
        );
    }

    group.finish();
}

fn bench_merge_covered(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_covered");

    // Parents of roughly a third of the generated hosts
    let covering: Dict = (0..53)
        .filter(|i| i % 3 == 0)
        .map(|i| format!("zone{}.example.com", i))
        .collect::<Vec<_>>()
        .iter()
        .map(String::as_str)
        .collect();

    for size in [1000, 10000] {
        let domains = generate_domains(size);
        group.bench_with_input(BenchmarkId::new("hosts", size), &domains, |b, domains| {
            b.iter(|| {
                let mut seen = Dict::new();
                black_box(merge(
                    domains.iter().map(String::as_str),
                    &Dict::new(),
                    &mut seen,
                    Some(&covering),
                ))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_extract, bench_deduplicate, bench_merge_covered);
criterion_main!(benches);
