//! Benchmark helper utilities for a2vault-rs
//!
//! Generates synthetic payloads and populated volumes so the benchmarks do not
//! depend on real disk images being present.

use a2vault_types::file::{WriteOptions, prodos};
use rand::{Rng, SeedableRng, rngs::SmallRng};

/// Text-like payload: repeated lines with some variation, compresses well
pub fn text_payload(len: usize) -> Vec<u8> {
	let words: [&[u8]; 8] = [b"LOAD ", b"RUN ", b"CATALOG ", b"PR#6", b"\r", b"HGR ", b"POKE 49200,0", b"CALL -151"];
	let mut rng = SmallRng::seed_from_u64(0xA2);
	let mut data = Vec::with_capacity(len + 16);
	while data.len() < len {
		data.extend_from_slice(words[rng.random_range(0..words.len())]);
	}
	data.truncate(len);
	data
}

/// Incompressible payload
pub fn random_payload(len: usize) -> Vec<u8> {
	let mut rng = SmallRng::seed_from_u64(0x6502);
	(0..len).map(|_| rng.random()).collect()
}

/// Builds a `ProDOS` volume with `directories` subdirectories of `files_per_directory` files each
///
/// A new subdirectory has room for 12 entries.
pub fn populated_volume(total_blocks: usize, directories: usize, files_per_directory: usize) -> Vec<u8> {
	let options = WriteOptions::default();
	let mut image = prodos::create_volume(total_blocks, "BENCH", &options).expect("volume");
	for d in 0..directories {
		let directory = format!("DIR{}", d);
		prodos::create_directory(&mut image, "/", &directory, &options).expect("directory");
		for f in 0..files_per_directory {
			let data = text_payload(300 + f * 97);
			let name = format!("FILE{}", f);
			let file = prodos::NewFile::new(&name, &data);
			prodos::add_file(&mut image, &directory, &file, &options).expect("file");
		}
	}
	image
}

/// Common benchmark payload sizes
pub mod sizes {
	/// One LZW chunk
	pub const CHUNK: usize = 4096;
	/// A typical Apple II program
	pub const PROGRAM: usize = 16 * 1024;
	/// A 140K floppy image
	pub const FLOPPY: usize = 143_360;
}

#[cfg(test)]
mod tests {
	use super::*;
	use a2vault_types::file::Catalog;

	#[test]
	fn test_payloads() {
		assert_eq!(text_payload(1000).len(), 1000);
		assert_eq!(random_payload(64).len(), 64);
		assert_eq!(text_payload(50), text_payload(50));
	}

	#[test]
	fn test_populated_volume() {
		let image = populated_volume(1600, 3, 4);
		let catalog = Catalog::from_bytes(&image).unwrap();
		assert_eq!(catalog.entries.len(), 3);
		assert_eq!(catalog.file_count(), 12);
	}
}
