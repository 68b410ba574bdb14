//! Benchmark suite for volume parsing
//!
//! Run with: cargo bench --manifest-path benches/Cargo.toml --bench prodos_walk

use a2vault_benches::populated_volume;
use a2vault_types::file::{Catalog, prodos};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

fn bench_catalog(c: &mut Criterion) {
	let mut group = c.benchmark_group("prodos_catalog");

	for (name, blocks, directories, files) in [("floppy", 280, 2, 6), ("800k", 1600, 6, 12), ("hard_disk", 65535, 40, 12)] {
		let image = populated_volume(blocks, directories, files);
		group.throughput(Throughput::Bytes(image.len() as u64));
		group.bench_with_input(BenchmarkId::new("walk", name), &image, |b, image| {
			b.iter(|| black_box(Catalog::from_bytes(black_box(image))));
		});
	}

	group.finish();
}

fn bench_volume_info(c: &mut Criterion) {
	let image = populated_volume(1600, 4, 10);
	c.bench_function("prodos_volume_info", |b| {
		b.iter(|| black_box(prodos::volume_info(black_box(&image))));
	});
}

criterion_group!(benches, bench_catalog, bench_volume_info);
criterion_main!(benches);
