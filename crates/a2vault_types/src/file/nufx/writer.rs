//! Archive creation.

use chrono::NaiveDateTime;

use super::{MasterHeader, ThreadFormat, ThreadHeader, ThreadRole, constants::*, pack_datetime};
use crate::file::{
	A2FileError, BLOCK_SIZE, FormatKind, WriteOptions,
	bytes::{put_u16, put_u32},
	codec::{compress_lzw2, crc16, crc16_xmodem},
	prodos::constants::ACCESS_NEW_FILE,
};

const KIND: FormatKind = FormatKind::NuFx;

/// Storage type recorded for files with and without a resource fork
const STORAGE_SEEDLING: u16 = 1;
const STORAGE_EXTENDED: u16 = 5;

/// A file (or disk image) to archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewArchiveEntry<'a> {
	/// Path inside the archive, `/` separated
	pub name: &'a str,
	/// `ProDOS` file type
	pub file_type: u8,
	/// `ProDOS` auxiliary type
	pub aux_type: u16,
	/// Data fork, or the whole image for disk images
	pub data: &'a [u8],
	/// Resource fork
	pub resource_fork: Option<&'a [u8]>,
	/// Creation date
	pub created: Option<NaiveDateTime>,
	/// Modification date
	pub modified: Option<NaiveDateTime>,
	/// Store `data` as a disk image thread
	pub disk_image: bool,
}

impl<'a> NewArchiveEntry<'a> {
	/// Binary file entry
	pub fn new(name: &'a str, data: &'a [u8]) -> Self {
		Self {
			name,
			file_type: 0x06,
			aux_type: 0,
			data,
			resource_fork: None,
			created: None,
			modified: None,
			disk_image: false,
		}
	}

	/// Disk image entry; `image` must be a whole number of blocks
	pub fn disk_image(name: &'a str, image: &'a [u8]) -> Self {
		Self {
			disk_image: true,
			..Self::new(name, image)
		}
	}

	/// Sets the file and auxiliary types
	pub fn with_type(mut self, file_type: u8, aux_type: u16) -> Self {
		self.file_type = file_type;
		self.aux_type = aux_type;
		self
	}

	/// Adds a resource fork
	pub fn with_resource_fork(mut self, resource_fork: &'a [u8]) -> Self {
		self.resource_fork = Some(resource_fork);
		self
	}
}

/// A thread ready to be written
struct PendingThread {
	header: ThreadHeader,
	payload: Vec<u8>,
}

impl PendingThread {
	fn new(role: ThreadRole, data: &[u8], compress: bool) -> Self {
		let (class, kind) = role.class_kind();
		let packed = compress.then(|| compress_lzw2(data)).filter(|packed| packed.len() < data.len());
		let (format, payload) = match packed {
			Some(packed) => (ThreadFormat::Lzw2, packed),
			None => (ThreadFormat::Uncompressed, data.to_vec()),
		};
		Self {
			header: ThreadHeader {
				class,
				format,
				kind,
				crc: crc16(THREAD_CRC_SEED, data),
				eof: data.len() as u32,
				compressed_eof: payload.len() as u32,
			},
			payload,
		}
	}
}

fn check_size(len: usize) -> Result<(), A2FileError> {
	if u32::try_from(len).is_err() {
		return Err(A2FileError::FileTooLarge {
			kind: KIND,
			size: len,
			max: u32::MAX as usize,
		});
	}
	Ok(())
}

/// Serializes one record
fn build_record(entry: &NewArchiveEntry<'_>, options: &WriteOptions) -> Result<Vec<u8>, A2FileError> {
	if entry.name.is_empty() || entry.name.len() > usize::from(u16::MAX) {
		return Err(A2FileError::InvalidName {
			kind: KIND,
			name: entry.name.to_string(),
			reason: "archive names must be 1 to 65535 bytes".to_string(),
		});
	}
	check_size(entry.data.len())?;
	if let Some(fork) = entry.resource_fork {
		check_size(fork.len())?;
	}
	if entry.disk_image && (entry.data.len() % BLOCK_SIZE != 0 || entry.resource_fork.is_some()) {
		return Err(A2FileError::NotSupported {
			kind: KIND,
			message: "disk images must be whole blocks without a resource fork".to_string(),
		});
	}
	if entry.disk_image && entry.data.len() > MAX_DISK_IMAGE {
		return Err(A2FileError::FileTooLarge {
			kind: KIND,
			size: entry.data.len(),
			max: MAX_DISK_IMAGE,
		});
	}

	let mut threads = vec![PendingThread::new(ThreadRole::Filename, entry.name.as_bytes(), false)];
	if entry.disk_image {
		threads.push(PendingThread::new(ThreadRole::DiskImage, entry.data, options.compress));
	} else {
		threads.push(PendingThread::new(ThreadRole::DataFork, entry.data, options.compress));
		if let Some(fork) = entry.resource_fork {
			threads.push(PendingThread::new(ThreadRole::ResourceFork, fork, options.compress));
		}
	}

	let (file_type, aux_type, storage_type) = if entry.disk_image {
		(0, (entry.data.len() / BLOCK_SIZE) as u32, BLOCK_SIZE as u16)
	} else if entry.resource_fork.is_some() {
		(u32::from(entry.file_type), u32::from(entry.aux_type), STORAGE_EXTENDED)
	} else {
		(u32::from(entry.file_type), u32::from(entry.aux_type), STORAGE_SEEDLING)
	};

	let attrib_count = usize::from(MIN_ATTRIB_COUNT);
	let mut record = vec![0u8; attrib_count];
	record[..4].copy_from_slice(&RECORD_SIGNATURE);
	put_u16(&mut record, 0x06, MIN_ATTRIB_COUNT);
	put_u16(&mut record, 0x08, RECORD_VERSION);
	put_u32(&mut record, 0x0A, threads.len() as u32);
	put_u16(&mut record, 0x0E, FILESYSTEM_PRODOS);
	put_u16(&mut record, 0x10, u16::from(b'/'));
	put_u32(&mut record, 0x12, u32::from(ACCESS_NEW_FILE));
	put_u32(&mut record, 0x16, file_type);
	put_u32(&mut record, 0x1A, aux_type);
	put_u16(&mut record, 0x1E, storage_type);
	let now = options.timestamp();
	record[0x20..0x28].copy_from_slice(&pack_datetime(entry.created.or(Some(now))));
	record[0x28..0x30].copy_from_slice(&pack_datetime(entry.modified.or(Some(now))));
	record[0x30..0x38].copy_from_slice(&pack_datetime(Some(now)));
	// No inline filename; the filename thread carries it
	put_u16(&mut record, attrib_count - 2, 0);

	for thread in &threads {
		record.extend_from_slice(&thread.header.to_bytes());
	}
	let crc = crc16_xmodem(&record[0x06..]);
	put_u16(&mut record, 0x04, crc);

	for thread in threads {
		record.extend(thread.payload);
	}
	Ok(record)
}

/// Builds an archive holding `entries` in order
///
/// Every thread is LZW/2 compressed when [`WriteOptions::compress`] is set and
/// the result is smaller; otherwise it is stored.
pub fn create_archive(entries: &[NewArchiveEntry<'_>], options: &WriteOptions) -> Result<Vec<u8>, A2FileError> {
	let mut records = Vec::with_capacity(entries.len());
	for entry in entries {
		records.push(build_record(entry, options)?);
	}

	let total: usize = MASTER_HEADER_SIZE + records.iter().map(Vec::len).sum::<usize>();
	check_size(total)?;

	let now = options.timestamp();
	let master = MasterHeader {
		crc: 0,
		total_records: entries.len() as u32,
		created: Some(now),
		modified: Some(now),
		version: MASTER_VERSION,
		archive_eof: total as u32,
	};

	let mut archive = Vec::with_capacity(total);
	archive.extend_from_slice(&master.to_bytes());
	for record in records {
		archive.extend(record);
	}
	log::debug!("Built NuFX archive: {} records, {} bytes", entries.len(), archive.len());
	Ok(archive)
}
