//! Archive parsing and thread extraction.

use serde::Serialize;

use super::{MasterHeader, ThreadFormat, ThreadHeader, ThreadRole, constants::*, is_binary_ii, unpack_datetime};
use crate::file::{
	A2FileError, Catalog, CrcPolicy, Diagnostics, FormatKind, ReadOptions,
	bytes::{u16_at, u32_at},
	codec::{crc16, crc16_xmodem, expand_lzw1, expand_lzw2, expand_squeeze},
};

const KIND: FormatKind = FormatKind::NuFx;

/// Applies the CRC policy to one comparison
fn check_crc(
	options: &ReadOptions,
	kind: FormatKind,
	context: impl Into<String>,
	stored: u16,
	computed: u16,
	diagnostics: &mut Diagnostics,
) -> Result<(), A2FileError> {
	if stored == computed {
		return Ok(());
	}
	let error = A2FileError::CrcMismatch {
		kind,
		context: context.into(),
		stored,
		computed,
	};
	match options.crc_policy {
		CrcPolicy::Strict => Err(error),
		CrcPolicy::Warn => {
			diagnostics.warn_error(kind, &error);
			Ok(())
		}
	}
}

/// A thread and its compressed payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Thread {
	/// Thread header
	pub header: ThreadHeader,
	/// Compressed bytes, `compressed_eof` long
	#[serde(skip)]
	pub payload: Vec<u8>,
}

impl Thread {
	/// Role of the thread
	pub fn role(&self) -> ThreadRole {
		self.header.role()
	}
}

/// One archived file or disk image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
	/// Stored header CRC
	pub header_crc: u16,
	/// Record version
	pub version: u16,
	/// Filesystem id (1 = `ProDOS`)
	pub filesystem_id: u16,
	/// Path separator
	pub separator: char,
	/// Access flags
	pub access: u32,
	/// File type
	pub file_type: u32,
	/// Auxiliary type (block count for disk images)
	pub aux_type: u32,
	/// Storage type (block size for disk images)
	pub storage_type: u16,
	/// Creation date
	pub created: Option<chrono::NaiveDateTime>,
	/// Modification date
	pub modified: Option<chrono::NaiveDateTime>,
	/// Date the record was archived
	pub archived: Option<chrono::NaiveDateTime>,
	/// Path, from the filename thread if present
	pub filename: String,
	/// Threads in archive order
	pub threads: Vec<Thread>,
}

impl Record {
	/// Parses a record at the start of `data`, returning it and its total length
	fn parse(data: &[u8], options: &ReadOptions, diagnostics: &mut Diagnostics) -> Result<(Self, usize), A2FileError> {
		let require = |len: usize| {
			if data.len() < len {
				Err(A2FileError::insufficient_data(KIND, len, data.len()))
			} else {
				Ok(())
			}
		};

		require(8)?;
		let signature = &data[..4];
		if signature != RECORD_SIGNATURE && signature != RECORD_SIGNATURE_ASCII {
			return Err(A2FileError::invalid_magic(KIND, &RECORD_SIGNATURE, signature));
		}
		let attrib_count = u16_at(data, 0x06);
		if attrib_count < MIN_ATTRIB_COUNT {
			return Err(A2FileError::structural(KIND, format!("attribute count {} too small", attrib_count)));
		}
		let attrib_count = usize::from(attrib_count);
		require(attrib_count)?;

		let name_len = usize::from(u16_at(data, attrib_count - 2));
		let threads_start = attrib_count + name_len;
		let thread_count = u32_at(data, 0x0A) as usize;
		if thread_count > data.len() / THREAD_HEADER_SIZE {
			return Err(A2FileError::structural(KIND, format!("{} threads cannot fit", thread_count)));
		}
		let header_end = threads_start + thread_count * THREAD_HEADER_SIZE;
		require(header_end)?;

		let header_crc = u16_at(data, 0x04);
		check_crc(options, KIND, "record header", header_crc, crc16_xmodem(&data[0x06..header_end]), diagnostics)?;

		let mut threads = Vec::with_capacity(thread_count);
		let mut pos = header_end;
		for index in 0..thread_count {
			let offset = threads_start + index * THREAD_HEADER_SIZE;
			let header = ThreadHeader::from_bytes(&data[offset..offset + THREAD_HEADER_SIZE])?;
			let len = header.compressed_eof as usize;
			let payload = data.get(pos..pos + len).ok_or_else(|| {
				A2FileError::structural(KIND, format!("thread {} runs past the end of the archive", index))
			})?;
			pos += len;
			threads.push(Thread {
				header,
				payload: payload.to_vec(),
			});
		}

		let mut filename = String::from_utf8_lossy(&data[attrib_count..threads_start]).into_owned();
		if let Some(thread) = threads.iter().find(|t| t.role() == ThreadRole::Filename) {
			let len = (thread.header.eof as usize).min(thread.payload.len());
			filename = String::from_utf8_lossy(&thread.payload[..len]).trim_end_matches('\0').to_string();
		}

		let separator = match data[0x10] {
			0 => '/',
			byte => char::from(byte),
		};

		let record = Self {
			header_crc,
			version: u16_at(data, 0x08),
			filesystem_id: u16_at(data, 0x0E),
			separator,
			access: u32_at(data, 0x12),
			file_type: u32_at(data, 0x16),
			aux_type: u32_at(data, 0x1A),
			storage_type: u16_at(data, 0x1E),
			created: unpack_datetime(&data[0x20..0x28]),
			modified: unpack_datetime(&data[0x28..0x30]),
			archived: unpack_datetime(&data[0x30..0x38]),
			filename,
			threads,
		};
		Ok((record, pos))
	}

	/// First thread with the given role
	pub fn thread(&self, role: ThreadRole) -> Option<&Thread> {
		self.threads.iter().find(|t| t.role() == role)
	}

	/// Returns `true` if the record holds a disk image
	pub fn is_disk_image(&self) -> bool {
		self.thread(ThreadRole::DiskImage).is_some()
	}

	/// Path components split on the record's separator
	pub fn path_components(&self) -> Vec<&str> {
		self.filename.split(self.separator).filter(|c| !c.is_empty()).collect()
	}

	/// Uncompressed length of a thread
	///
	/// Disk images may leave `eof` zero, in which case the size is the block
	/// count (auxiliary type) times the block size (storage type). That product
	/// must not exceed [`MAX_DISK_IMAGE`].
	pub fn uncompressed_len(&self, thread: &Thread) -> Result<usize, A2FileError> {
		if thread.role() != ThreadRole::DiskImage || thread.header.eof != 0 {
			return Ok(thread.header.eof as usize);
		}
		(self.aux_type as usize)
			.checked_mul(usize::from(self.storage_type))
			.filter(|&len| len <= MAX_DISK_IMAGE)
			.ok_or_else(|| {
				A2FileError::structural(
					KIND,
					format!(
						"'{}': disk image of {} blocks of {} bytes exceeds {} bytes",
						self.filename, self.aux_type, self.storage_type, MAX_DISK_IMAGE
					),
				)
			})
	}

	/// Expands the first thread with the given role
	pub fn extract(
		&self,
		role: ThreadRole,
		options: &ReadOptions,
		diagnostics: &mut Diagnostics,
	) -> Result<Option<Vec<u8>>, A2FileError> {
		match self.thread(role) {
			Some(thread) => self.expand(thread, options, diagnostics).map(Some),
			None => Ok(None),
		}
	}

	/// Decompresses one thread and checks its CRC
	pub fn expand(
		&self,
		thread: &Thread,
		options: &ReadOptions,
		diagnostics: &mut Diagnostics,
	) -> Result<Vec<u8>, A2FileError> {
		let len = self.uncompressed_len(thread)?;
		let payload = thread.payload.as_slice();

		let data = match thread.header.format {
			ThreadFormat::Uncompressed => payload
				.get(..len)
				.ok_or_else(|| A2FileError::insufficient_data(KIND, len, payload.len()))?
				.to_vec(),
			ThreadFormat::Squeeze => {
				let data = expand_squeeze(payload, Some(len))?;
				if data.len() < len {
					diagnostics.warn(
						FormatKind::Squeeze,
						format!("'{}': {} of {} bytes decoded", self.filename, data.len(), len),
					);
				}
				data
			}
			ThreadFormat::Lzw1 => {
				let (data, check) = expand_lzw1(payload, len)?;
				let context = format!("'{}' LZW/1 data", self.filename);
				check_crc(options, FormatKind::Lzw1, context, check.stored, check.computed, diagnostics)?;
				data
			}
			ThreadFormat::Lzw2 => expand_lzw2(payload, len)?,
			ThreadFormat::Other(format) => {
				return Err(A2FileError::UnsupportedCompression {
					kind: KIND,
					format,
				});
			}
		};

		if self.version >= RECORD_VERSION && thread.role().is_data() {
			let context = format!("'{}' thread data", self.filename);
			check_crc(options, KIND, context, thread.header.crc, crc16(THREAD_CRC_SEED, &data), diagnostics)?;
		}
		Ok(data)
	}

	/// Parses the record's disk image thread as a volume
	pub fn disk_image_catalog(&self, options: &ReadOptions) -> Result<Catalog, A2FileError> {
		let mut diagnostics = Diagnostics::new();
		let image = self
			.extract(ThreadRole::DiskImage, options, &mut diagnostics)?
			.ok_or_else(|| A2FileError::not_found(KIND, format!("'{}' has no disk image thread", self.filename)))?;

		let mut catalog = Catalog::from_bytes_with(&image, options)?;
		diagnostics.extend(std::mem::take(&mut catalog.diagnostics));
		catalog.diagnostics = diagnostics;
		Ok(catalog)
	}
}

/// Parsed archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Archive {
	/// Archive was wrapped in Binary II
	pub binary_ii: bool,
	/// Master header
	pub master: MasterHeader,
	/// Records in archive order
	pub records: Vec<Record>,
	/// Problems met while parsing
	pub diagnostics: Diagnostics,
}

impl Archive {
	/// Parses an archive with default options
	pub fn from_bytes(data: &[u8]) -> Result<Self, A2FileError> {
		Self::from_bytes_with(data, &ReadOptions::default())
	}

	/// Parses an archive
	///
	/// A damaged record ends the walk with a diagnostic; records before it are
	/// kept. CRC mismatches follow [`ReadOptions::crc_policy`].
	pub fn from_bytes_with(data: &[u8], options: &ReadOptions) -> Result<Self, A2FileError> {
		let binary_ii = is_binary_ii(data);
		let body = if binary_ii {
			&data[BINARY_II_HEADER..]
		} else {
			data
		};

		let mut diagnostics = Diagnostics::new();
		let master = MasterHeader::from_bytes(body)?;
		check_crc(
			options,
			KIND,
			"master header",
			master.crc,
			crc16_xmodem(&body[0x08..MASTER_HEADER_SIZE]),
			&mut diagnostics,
		)?;

		let end = match master.archive_eof as usize {
			eof if (MASTER_HEADER_SIZE..=body.len()).contains(&eof) => eof,
			eof => {
				if eof > body.len() {
					diagnostics.warn(KIND, format!("archive claims {} bytes, only {} present", eof, body.len()));
				}
				body.len()
			}
		};

		let mut records = Vec::new();
		let mut pos = MASTER_HEADER_SIZE;
		while records.len() < master.total_records as usize {
			if pos >= end {
				diagnostics.warn(
					KIND,
					format!("archive ends after {} of {} records", records.len(), master.total_records),
				);
				break;
			}
			match Record::parse(&body[pos..end], options, &mut diagnostics) {
				Ok((record, len)) => {
					log::debug!("NuFX record '{}' ({} threads)", record.filename, record.threads.len());
					records.push(record);
					pos += len;
				}
				Err(e @ A2FileError::CrcMismatch {
					..
				}) => return Err(e),
				Err(e) => {
					diagnostics.warn(KIND, format!("record {}: {}", records.len(), e));
					break;
				}
			}
		}

		Ok(Self {
			binary_ii,
			master,
			records,
			diagnostics,
		})
	}

	/// Finds a record by filename, ignoring case
	pub fn find(&self, name: &str) -> Option<&Record> {
		self.records.iter().find(|r| r.filename.eq_ignore_ascii_case(name))
	}
}
