//! Benchmark suite for the `ShrinkIt` codecs
//!
//! Run with: cargo bench --manifest-path benches/Cargo.toml --bench codecs

use a2vault_benches::{random_payload, sizes, text_payload};
use a2vault_types::file::codec::{compress_lzw1, compress_lzw2, compress_rle, crc16_xmodem, expand_lzw1, expand_lzw2};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

fn bench_lzw2(c: &mut Criterion) {
	let mut group = c.benchmark_group("lzw2");

	for (name, data) in [
		("text_program", text_payload(sizes::PROGRAM)),
		("text_floppy", text_payload(sizes::FLOPPY)),
		("random_program", random_payload(sizes::PROGRAM)),
	] {
		group.throughput(Throughput::Bytes(data.len() as u64));
		group.bench_with_input(BenchmarkId::new("compress", name), &data, |b, data| {
			b.iter(|| black_box(compress_lzw2(black_box(data))));
		});

		let packed = compress_lzw2(&data);
		group.bench_with_input(BenchmarkId::new("expand", name), &packed, |b, packed| {
			b.iter(|| black_box(expand_lzw2(black_box(packed), data.len())));
		});
	}

	group.finish();
}

fn bench_lzw1(c: &mut Criterion) {
	let mut group = c.benchmark_group("lzw1");
	let data = text_payload(sizes::PROGRAM);
	let packed = compress_lzw1(&data);

	group.throughput(Throughput::Bytes(data.len() as u64));
	group.bench_function("expand", |b| {
		b.iter(|| black_box(expand_lzw1(black_box(&packed), data.len())));
	});

	group.finish();
}

fn bench_small(c: &mut Criterion) {
	let mut group = c.benchmark_group("chunk");
	let data = text_payload(sizes::CHUNK);

	group.throughput(Throughput::Bytes(data.len() as u64));
	group.bench_function("rle", |b| {
		b.iter(|| black_box(compress_rle(black_box(&data), 0xDB)));
	});
	group.bench_function("crc16", |b| {
		b.iter(|| black_box(crc16_xmodem(black_box(&data))));
	});

	group.finish();
}

criterion_group!(benches, bench_lzw2, bench_lzw1, bench_small);
criterion_main!(benches);
