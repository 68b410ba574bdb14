//! Unit tests for `NuFX` reading and writing

use chrono::NaiveDate;
use rand::{Rng, SeedableRng, rngs::SmallRng};

use super::{constants::*, *};
use crate::file::{
	CrcPolicy, Diagnostics, ReadOptions, WriteOptions,
	bytes::{put_u16, put_u32},
	codec::{compress_lzw1, compress_lzw2, crc16_xmodem},
	prodos,
};

fn stamp() -> WriteOptions {
	WriteOptions::at(NaiveDate::from_ymd_opt(1986, 9, 15).unwrap().and_hms_opt(10, 20, 30).unwrap())
}

fn strict() -> ReadOptions {
	ReadOptions::default().with_crc_policy(CrcPolicy::Strict)
}

fn readme() -> Vec<u8> {
	b"THE QUICK BROWN FOX JUMPS OVER THE LAZY DOG.\r".repeat(60)
}

fn noise(len: usize) -> Vec<u8> {
	let mut rng = SmallRng::seed_from_u64(0x5EED);
	(0..len).map(|_| rng.random()).collect()
}

fn sample_archive(options: &WriteOptions) -> Vec<u8> {
	let text = readme();
	let random = noise(3000);
	let entries = [
		NewArchiveEntry::new("DOCS/README", &text).with_type(0x04, 0),
		NewArchiveEntry::new("APP", b"CODE").with_type(0xB3, 0xDB00).with_resource_fork(b"FORK"),
		NewArchiveEntry::new("NOISE", &random),
	];
	create_archive(&entries, options).unwrap()
}

/// Archive with one data thread whose header and payload are supplied directly
fn hand_built(format: ThreadFormat, eof: usize, payload: &[u8]) -> Vec<u8> {
	let name = b"HAND";
	let mut record = vec![0u8; usize::from(MIN_ATTRIB_COUNT)];
	record[..4].copy_from_slice(&RECORD_SIGNATURE_ASCII);
	put_u16(&mut record, 0x06, MIN_ATTRIB_COUNT);
	put_u16(&mut record, 0x08, 1);
	put_u32(&mut record, 0x0A, 1);
	put_u16(&mut record, 0x10, u16::from(b':'));
	put_u16(&mut record, usize::from(MIN_ATTRIB_COUNT) - 2, name.len() as u16);
	record.extend_from_slice(name);
	let header = ThreadHeader {
		class: 2,
		format,
		kind: 0,
		crc: 0,
		eof: eof as u32,
		compressed_eof: payload.len() as u32,
	};
	record.extend_from_slice(&header.to_bytes());
	let crc = crc16_xmodem(&record[0x06..]);
	put_u16(&mut record, 0x04, crc);
	record.extend_from_slice(payload);

	let master = MasterHeader {
		crc: 0,
		total_records: 1,
		created: None,
		modified: None,
		version: MASTER_VERSION,
		archive_eof: (MASTER_HEADER_SIZE + record.len()) as u32,
	};
	let mut archive = master.to_bytes().to_vec();
	archive.extend(record);
	archive
}

fn extract_data(record: &Record, options: &ReadOptions) -> (Result<Option<Vec<u8>>, A2FileError>, Diagnostics) {
	let mut diagnostics = Diagnostics::new();
	let data = record.extract(ThreadRole::DataFork, options, &mut diagnostics);
	(data, diagnostics)
}

#[test]
fn test_signature_bare_and_wrapped() {
	let mut archive = create_archive(&[], &stamp()).unwrap();
	assert_eq!(archive.len(), MASTER_HEADER_SIZE);
	assert!(Archive::from_bytes(&archive).unwrap().records.is_empty());

	// Plain ASCII spelling, outside the CRC range
	archive[..6].copy_from_slice(b"NuFile");
	assert!(is_nufx(&archive));
	assert!(!Archive::from_bytes(&archive).unwrap().binary_ii);

	let mut wrapped = vec![0u8; BINARY_II_HEADER];
	wrapped[..3].copy_from_slice(&BINARY_II_SIGNATURE);
	wrapped.extend_from_slice(&archive);
	assert!(is_nufx(&wrapped));
	assert!(Archive::from_bytes(&wrapped).unwrap().binary_ii);

	for index in 0..6 {
		let mut flipped = archive.clone();
		flipped[index] ^= 0xFF;
		assert!(!is_nufx(&flipped));
		assert!(matches!(
			Archive::from_bytes(&flipped),
			Err(A2FileError::InvalidMagic {
				..
			})
		));
	}
}

#[test]
fn test_round_trip() {
	let archive = Archive::from_bytes_with(&sample_archive(&stamp()), &strict()).unwrap();
	assert_eq!(archive.master.total_records, 3);
	assert_eq!(archive.master.created, stamp().timestamp);
	assert!(archive.diagnostics.is_empty());

	let names: Vec<&str> = archive.records.iter().map(|r| r.filename.as_str()).collect();
	assert_eq!(names, ["DOCS/README", "APP", "NOISE"]);
	assert_eq!(archive.records[0].path_components(), ["DOCS", "README"]);

	let readme_record = archive.find("docs/readme").unwrap();
	assert_eq!(readme_record.thread(ThreadRole::DataFork).unwrap().header.format, ThreadFormat::Lzw2);
	assert_eq!(readme_record.file_type, 0x04);
	assert_eq!(readme_record.modified, stamp().timestamp);
	assert_eq!(extract_data(readme_record, &strict()).0.unwrap(), Some(readme()));

	let app = archive.find("APP").unwrap();
	assert_eq!(app.storage_type, 5);
	assert_eq!(app.aux_type, 0xDB00);
	let mut diagnostics = Diagnostics::new();
	let fork = app.extract(ThreadRole::ResourceFork, &strict(), &mut diagnostics).unwrap();
	assert_eq!(fork.as_deref(), Some(&b"FORK"[..]));

	let noise_record = archive.find("NOISE").unwrap();
	assert_eq!(noise_record.thread(ThreadRole::DataFork).unwrap().header.format, ThreadFormat::Uncompressed);
	assert_eq!(extract_data(noise_record, &strict()).0.unwrap(), Some(noise(3000)));
	assert!(!noise_record.is_disk_image());
}

#[test]
fn test_compression_disabled() {
	let bytes = sample_archive(&stamp().with_compression(false));
	let archive = Archive::from_bytes(&bytes).unwrap();
	for record in &archive.records {
		for thread in &record.threads {
			assert_eq!(thread.header.format, ThreadFormat::Uncompressed);
		}
	}
	assert_eq!(extract_data(&archive.records[0], &strict()).0.unwrap(), Some(readme()));
	assert!(bytes.len() > sample_archive(&stamp()).len());
}

#[test]
fn test_thread_crc_policy() {
	let mut bytes = sample_archive(&stamp());
	// NOISE is stored and comes last, so the final byte is its data
	let last = bytes.len() - 1;
	bytes[last] ^= 0x01;

	let archive = Archive::from_bytes(&bytes).unwrap();
	let record = archive.find("NOISE").unwrap();

	let (data, diagnostics) = extract_data(record, &ReadOptions::default());
	assert_eq!(data.unwrap().map(|d| d.len()), Some(3000));
	assert_eq!(diagnostics.warning_count(), 1);

	let (data, _) = extract_data(record, &strict());
	let err = data.unwrap_err();
	assert!(matches!(
		err,
		A2FileError::CrcMismatch {
			..
		}
	));
	assert_eq!(err.category(), crate::file::ErrorCategory::Integrity);
}

#[test]
fn test_header_crc_policy() {
	let mut bytes = sample_archive(&stamp());
	// File type of the first record
	bytes[MASTER_HEADER_SIZE + 0x16] = 0x06;

	let archive = Archive::from_bytes(&bytes).unwrap();
	assert_eq!(archive.records.len(), 3);
	assert_eq!(archive.diagnostics.warning_count(), 1);
	assert!(Archive::from_bytes_with(&bytes, &strict()).is_err());

	let mut bytes = sample_archive(&stamp());
	bytes[0x08] = 9;
	assert!(Archive::from_bytes_with(&bytes, &strict()).is_err());
}

#[test]
fn test_unsupported_format() {
	let mut bytes = hand_built(ThreadFormat::Other(5), 4, b"????");
	let archive = Archive::from_bytes(&bytes).unwrap();
	let (data, _) = extract_data(&archive.records[0], &strict());
	assert!(matches!(
		data,
		Err(A2FileError::UnsupportedCompression {
			format: 5,
			..
		})
	));

	// Same bytes marked as stored extract fine
	let format_offset = MASTER_HEADER_SIZE + usize::from(MIN_ATTRIB_COUNT) + 4 + 2;
	put_u16(&mut bytes, format_offset, 0);
	let archive = Archive::from_bytes(&bytes).unwrap();
	assert_eq!(archive.diagnostics.warning_count(), 1);
	assert_eq!(extract_data(&archive.records[0], &ReadOptions::default()).0.unwrap(), Some(b"????".to_vec()));
}

#[test]
fn test_inline_name_and_lzw1() {
	let data = readme();
	let bytes = hand_built(ThreadFormat::Lzw1, data.len(), &compress_lzw1(&data));
	let archive = Archive::from_bytes_with(&bytes, &strict()).unwrap();
	let record = &archive.records[0];
	assert_eq!(record.filename, "HAND");
	assert_eq!(record.separator, ':');
	assert_eq!(extract_data(record, &strict()).0.unwrap(), Some(data));
}

#[test]
fn test_squeeze_thread() {
	// Tree: A = 0, B = 10, end = 11; stream A B A end
	let mut payload = 2u16.to_le_bytes().to_vec();
	for child in [-(i16::from(b'A')) - 1, 1, -(i16::from(b'B')) - 1, -257] {
		payload.extend_from_slice(&child.to_le_bytes());
	}
	payload.push(0x32);

	let bytes = hand_built(ThreadFormat::Squeeze, 3, &payload);
	let archive = Archive::from_bytes(&bytes).unwrap();
	let (data, diagnostics) = extract_data(&archive.records[0], &ReadOptions::default());
	assert_eq!(data.unwrap(), Some(b"ABA".to_vec()));
	assert!(diagnostics.is_empty());
}

#[test]
fn test_disk_image_thread() {
	let mut image = prodos::create_volume(280, "IMAGED", &stamp()).unwrap();
	prodos::add_file(&mut image, "", &prodos::NewFile::new("HELLO", b"HELLO WORLD"), &stamp()).unwrap();

	let bytes = create_archive(&[NewArchiveEntry::disk_image("IMAGED.PO", &image)], &stamp()).unwrap();
	assert!(bytes.len() < image.len());

	let archive = Archive::from_bytes(&bytes).unwrap();
	let record = &archive.records[0];
	assert!(record.is_disk_image());
	assert_eq!(record.storage_type, 512);
	assert_eq!(record.aux_type, 280);

	let catalog = record.disk_image_catalog(&strict()).unwrap();
	assert_eq!(catalog.disk_name, "IMAGED");
	assert_eq!(catalog.find("HELLO").and_then(|e| e.data()), Some(&b"HELLO WORLD"[..]));

	let mut diagnostics = Diagnostics::new();
	assert!(record.extract(ThreadRole::DataFork, &strict(), &mut diagnostics).unwrap().is_none());
}

#[test]
fn test_disk_image_size_from_blocks() {
	let image = prodos::create_volume(280, "BLOCKS", &stamp()).unwrap();
	let mut bytes =
		create_archive(&[NewArchiveEntry::disk_image("B.PO", &image)], &stamp().with_compression(false)).unwrap();

	// Clear the disk thread's eof: filename thread header, then the disk thread header
	let eof_offset = MASTER_HEADER_SIZE + usize::from(MIN_ATTRIB_COUNT) + THREAD_HEADER_SIZE + 8;
	put_u32(&mut bytes, eof_offset, 0);

	let archive = Archive::from_bytes(&bytes).unwrap();
	let record = &archive.records[0];
	let thread = record.thread(ThreadRole::DiskImage).unwrap();
	assert_eq!(record.uncompressed_len(thread).unwrap(), 280 * 512);
	assert_eq!(record.disk_image_catalog(&ReadOptions::default()).unwrap().disk_name, "BLOCKS");
}

#[test]
fn test_disk_image_block_count_out_of_range() {
	let thread_offset = MASTER_HEADER_SIZE + usize::from(MIN_ATTRIB_COUNT) + 4;
	let formats = [ThreadFormat::Uncompressed, ThreadFormat::Squeeze, ThreadFormat::Lzw1, ThreadFormat::Lzw2];
	for format in formats {
		for (blocks, block_size) in [(0xFFFF_FFFF, 0xFFFF), (0x1_0000, 512)] {
			let mut bytes = hand_built(format, 0, b"????");
			put_u16(&mut bytes, thread_offset + 4, 1);
			put_u32(&mut bytes, MASTER_HEADER_SIZE + 0x1A, blocks);
			put_u16(&mut bytes, MASTER_HEADER_SIZE + 0x1E, block_size);

			let archive = Archive::from_bytes(&bytes).unwrap();
			let record = &archive.records[0];
			assert!(record.is_disk_image());
			let mut diagnostics = Diagnostics::new();
			let err = record.extract(ThreadRole::DiskImage, &ReadOptions::default(), &mut diagnostics).unwrap_err();
			assert_eq!(err.category(), crate::file::ErrorCategory::Structural, "{:?}", format);
			assert!(record.disk_image_catalog(&ReadOptions::default()).is_err());
		}
	}
}

#[test]
fn test_declared_length_beyond_payload() {
	let data = readme();
	let cases = [
		(ThreadFormat::Uncompressed, data.clone()),
		(ThreadFormat::Lzw1, compress_lzw1(&data)),
		(ThreadFormat::Lzw2, compress_lzw2(&data)),
	];
	for (format, payload) in cases {
		let bytes = hand_built(format, u32::MAX as usize, &payload);
		let archive = Archive::from_bytes(&bytes).unwrap();
		let (result, _) = extract_data(&archive.records[0], &ReadOptions::default());
		assert!(result.is_err(), "{:?}", format);
	}
}

#[test]
fn test_squeeze_stops_at_end_symbol() {
	let mut payload = 2u16.to_le_bytes().to_vec();
	for child in [-(i16::from(b'A')) - 1, 1, -(i16::from(b'B')) - 1, -257] {
		payload.extend_from_slice(&child.to_le_bytes());
	}
	payload.push(0x32);

	// Declared far longer than the stream: the decoded prefix comes back with a warning
	let bytes = hand_built(ThreadFormat::Squeeze, u32::MAX as usize, &payload);
	let archive = Archive::from_bytes(&bytes).unwrap();
	let (data, diagnostics) = extract_data(&archive.records[0], &ReadOptions::default());
	assert_eq!(data.unwrap(), Some(b"ABA".to_vec()));
	assert_eq!(diagnostics.warning_count(), 1);
}

#[test]
fn test_truncated_archive_keeps_earlier_records() {
	let bytes = sample_archive(&stamp());
	let truncated = &bytes[..bytes.len() - 100];

	let archive = Archive::from_bytes(truncated).unwrap();
	assert_eq!(archive.records.len(), 2);
	// Archive length mismatch plus the damaged record
	assert_eq!(archive.diagnostics.warning_count(), 2);
}

#[test]
fn test_writer_rejects_bad_entries() {
	let options = stamp();
	assert!(matches!(
		create_archive(&[NewArchiveEntry::new("", b"x")], &options),
		Err(A2FileError::InvalidName {
			..
		})
	));
	assert!(create_archive(&[NewArchiveEntry::disk_image("ODD", &[0u8; 100])], &options).is_err());

	let oversized = vec![0u8; MAX_DISK_IMAGE + 512];
	assert!(matches!(
		create_archive(&[NewArchiveEntry::disk_image("HUGE", &oversized)], &options),
		Err(A2FileError::FileTooLarge {
			max: MAX_DISK_IMAGE,
			..
		})
	));
}

#[test]
fn test_dates() {
	let when = NaiveDate::from_ymd_opt(2003, 12, 31).unwrap().and_hms_opt(23, 59, 58).unwrap();
	let packed = pack_datetime(Some(when));
	assert_eq!(packed[..6], [58u8, 59, 23, 103, 30, 11]);
	assert_eq!(unpack_datetime(&packed), Some(when));
	assert_eq!(unpack_datetime(&[0; 8]), None);
	assert_eq!(pack_datetime(None), [0; 8]);
}
