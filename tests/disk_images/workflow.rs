//! Build a volume, archive it, and read everything back

use a2vault_rs::prelude::{file::prodos, *};
use rand::{Rng, SeedableRng, rngs::SmallRng};

use crate::fixtures::stamp;

const SOURCE: &[u8] = b"* HELLO WORLD\r         LDA #$C1\r         JSR $FDED\r         RTS\r";

fn work_volume() -> (Vec<u8>, Vec<u8>) {
	let options = WriteOptions::at(stamp());
	let mut big = vec![0u8; 200_000];
	SmallRng::seed_from_u64(0x5EED).fill(&mut big[..]);

	let mut image = prodos::create_volume(1600, "WORK", &options).unwrap();
	prodos::create_directory(&mut image, "", "SRC", &options).unwrap();
	prodos::add_file(&mut image, "SRC", &ProDosNewFile::new("MAIN.S", SOURCE).with_type(0x04, 0), &options).unwrap();
	prodos::add_file(&mut image, "/", &ProDosNewFile::new("BIG.BIN", &big).with_type(0x06, 0x2000), &options).unwrap();
	(image, big)
}

#[test_log::test]
fn test_volume_contents() {
	let (image, big) = work_volume();
	let catalog = Catalog::from_bytes(&image).unwrap();

	assert_eq!(catalog.file_count(), 2);
	let paths: Vec<String> = catalog.walk().map(|(path, _)| path).collect();
	assert_eq!(paths, ["SRC", "SRC/MAIN.S", "BIG.BIN"]);

	let main = catalog.find("src/main.s").unwrap();
	assert_eq!(main.data(), Some(SOURCE));
	assert_eq!(main.file_type, 0x04);
	assert_eq!(main.modified, Some(stamp()));

	let blob = catalog.find("BIG.BIN").unwrap();
	assert_eq!(blob.aux_type, 0x2000);
	assert_eq!(blob.data(), Some(&big[..]));
	// 391 data blocks need a master index and two index blocks
	assert_eq!(blob.blocks_used, 391 + 3);

	let info = prodos::volume_info(&image).unwrap();
	assert_eq!(info.free_blocks, 1600 - 7 - 1 - 1 - 394);
}

#[test_log::test]
fn test_archive_volume_and_files() {
	let (image, _) = work_volume();
	let options = WriteOptions::at(stamp());
	let entries = [
		NewArchiveEntry::disk_image("WORK.PO", &image),
		NewArchiveEntry::new("SRC/MAIN.S", SOURCE).with_type(0x04, 0),
	];
	let archive = create_archive(&entries, &options).unwrap();
	assert!(archive.len() < image.len());

	let strict = ReadOptions::default().with_crc_policy(CrcPolicy::Strict);
	let parsed = NuFxArchive::from_bytes_with(&archive, &strict).unwrap();
	assert_eq!(parsed.records.len(), 2);
	assert!(parsed.diagnostics.is_empty());

	let volume = &parsed.records[0];
	assert!(volume.is_disk_image());
	assert_eq!(volume.aux_type, 1600);
	let restored = volume.disk_image_catalog(&strict).unwrap();
	let original = Catalog::from_bytes(&image).unwrap();
	assert_eq!(restored.disk_name, "WORK");
	assert_eq!(restored.entries, original.entries);

	let source = parsed.find("src/main.s").unwrap();
	assert_eq!(source.path_components(), ["SRC", "MAIN.S"]);
	assert_eq!(source.file_type, 0x04);
	let mut diagnostics = Diagnostics::new();
	let data = source.extract(ThreadRole::DataFork, &strict, &mut diagnostics).unwrap();
	assert_eq!(data.as_deref(), Some(SOURCE));
	assert!(diagnostics.is_empty());
}

#[test]
fn test_edit_cycle() {
	let (mut image, _) = work_volume();
	prodos::rename(&mut image, "SRC/MAIN.S", "BOOT.S").unwrap();
	prodos::delete_file(&mut image, "BIG.BIN").unwrap();

	let catalog = Catalog::from_bytes(&image).unwrap();
	assert!(catalog.find("BIG.BIN").is_none());
	assert!(catalog.find("SRC/MAIN.S").is_none());
	assert_eq!(catalog.find("SRC/BOOT.S").and_then(CatalogEntry::data), Some(SOURCE));
	assert_eq!(prodos::volume_info(&image).unwrap().free_blocks, 1600 - 7 - 1 - 1);
}
