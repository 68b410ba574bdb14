//! Format detection cascade

use a2vault_rs::prelude::{file::prodos, *};

use crate::fixtures::{dos_disk, pascal_disk, reorder, stamp};

#[test_log::test]
fn test_each_format_detected() {
	let prodos_image = prodos::create_volume(280, "SYSTEM", &WriteOptions::at(stamp())).unwrap();
	let cases = [
		(prodos_image, DiskFormat::ProDos, "SYSTEM"),
		(dos_disk(), DiskFormat::Dos33, "DOS 3.3 VOLUME 001"),
		(pascal_disk(), DiskFormat::Pascal, "APPLE"),
	];

	for (image, format, name) in cases {
		let catalog = Catalog::from_bytes(&image).unwrap();
		assert_eq!(catalog.disk_format, format);
		assert_eq!(catalog.disk_name, name);
		assert_eq!(catalog.disk_size, FLOPPY_140K);
	}
}

#[test]
fn test_dos_disk_contents() {
	let catalog = Catalog::from_bytes(&dos_disk()).unwrap();
	assert_eq!(catalog.addressing, Addressing::Interleaved);
	assert_eq!(catalog.file_count(), 2);

	let hello = catalog.find("hello").unwrap();
	assert_eq!(hello.file_type, 0x02);
	assert_eq!(hello.data(), Some(&[0xBA, 0xD5, 0x00][..]));
	assert!(!hello.locked);

	let readme = catalog.find("README").unwrap();
	assert_eq!(readme.data(), Some(&b"HELLO WORLD\r"[..]));
	assert!(readme.locked);
	assert!(catalog.diagnostics.is_empty());
}

#[test]
fn test_pascal_disk_contents() {
	let catalog = Catalog::from_bytes(&pascal_disk()).unwrap();
	assert_eq!(catalog.addressing, Addressing::Linear);

	let code = catalog.find("SYSTEM.CODE").unwrap();
	assert_eq!(code.file_type, 2);
	assert_eq!(code.size, 512 + 300);
	assert!(code.data().unwrap().iter().all(|&b| b == 0x60));
}

#[test]
fn test_prodos_volume_in_dos_order() {
	let options = WriteOptions::at(stamp());
	let mut image = prodos::create_volume(280, "MIXED", &options).unwrap();
	prodos::add_file(&mut image, "/", &ProDosNewFile::new("STARTUP", &[0xA9; 700]), &options).unwrap();

	let linear = Catalog::from_bytes(&image).unwrap();
	let interleaved = Catalog::from_bytes(&reorder(&image, Addressing::Linear, Addressing::Interleaved)).unwrap();

	assert_eq!(linear.addressing, Addressing::Linear);
	assert_eq!(interleaved.addressing, Addressing::Interleaved);
	assert_eq!(interleaved.disk_format, DiskFormat::ProDos);
	assert_eq!(interleaved.entries, linear.entries);
}

#[test]
fn test_unrecognized_image() {
	for image in [vec![0u8; FLOPPY_140K], vec![0xE5; 3 * BLOCK_SIZE], Vec::new()] {
		let err = Catalog::from_bytes(&image).unwrap_err();
		assert!(matches!(err, A2FileError::UnrecognizedImage { .. }));
		assert_eq!(err.category(), ErrorCategory::Format);
	}
}
