//! `NuFX` (`ShrinkIt`) archive support.
//!
//! ## Master header (48 bytes)
//!
//! | Offset | Size | Field                                   |
//! |--------|------|-----------------------------------------|
//! | 0x00   | 6    | Signature `4E F5 46 E9 6C E5` ("NuFile") |
//! | 0x06   | 2    | CRC-16 over bytes 0x08..0x30            |
//! | 0x08   | 4    | Number of records                       |
//! | 0x0C   | 8    | Archive creation date                   |
//! | 0x14   | 8    | Archive modification date               |
//! | 0x1C   | 2    | Master version                          |
//! | 0x26   | 4    | Archive length, master header included  |
//!
//! ## Record header
//!
//! | Offset | Size | Field                                       |
//! |--------|------|---------------------------------------------|
//! | 0x00   | 4    | Signature `4E F5 46 D8` ("NuFX")            |
//! | 0x04   | 2    | CRC-16 from 0x06 to the end of the thread headers |
//! | 0x06   | 2    | Attribute count (offset of the filename)    |
//! | 0x08   | 2    | Record version                              |
//! | 0x0A   | 4    | Number of threads                           |
//! | 0x0E   | 2    | Filesystem id                               |
//! | 0x10   | 2    | Path separator                              |
//! | 0x12   | 4    | Access flags                                |
//! | 0x16   | 4    | File type                                   |
//! | 0x1A   | 4    | Auxiliary type                              |
//! | 0x1E   | 2    | Storage type (block size for disk images)   |
//! | 0x20   | 8    | Creation date                               |
//! | 0x28   | 8    | Modification date                           |
//! | 0x30   | 8    | Archive date                                |
//! | count-2| 2    | Inline filename length                      |
//!
//! The inline filename follows, then one 16-byte thread header per thread,
//! then the thread payloads in the same order. Payload offsets are not stored;
//! each one starts where the previous one ends.
//!
//! ## Thread header
//!
//! | Offset | Size | Field                 |
//! |--------|------|-----------------------|
//! | 0x00   | 2    | Class                 |
//! | 0x02   | 2    | Format (compression)  |
//! | 0x04   | 2    | Kind                  |
//! | 0x06   | 2    | CRC-16 (version 3: seed 0xFFFF over uncompressed data) |
//! | 0x08   | 4    | Uncompressed length   |
//! | 0x0C   | 4    | Compressed length     |
//!
//! Dates are 8 bytes: second, minute, hour, year - 1900, day - 1, month - 1,
//! filler, weekday.
//!
//! An archive may be wrapped in a 128-byte Binary II header, which shifts
//! every offset by 128.

use std::fmt::Display;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;

use crate::file::{
	A2FileError, FormatKind,
	bytes::{put_u16, put_u32, u16_at, u32_at},
};

mod reader;
mod writer;

#[cfg(test)]
mod tests;

pub use reader::{Archive, Record, Thread};
pub use writer::{NewArchiveEntry, create_archive};

/// `NuFX` constants
pub mod constants {
	/// Master header signature as written by `ShrinkIt`
	pub const MASTER_SIGNATURE: [u8; 6] = [0x4E, 0xF5, 0x46, 0xE9, 0x6C, 0xE5];

	/// Master header signature in plain ASCII
	pub const MASTER_SIGNATURE_ASCII: [u8; 6] = *b"NuFile";

	/// Record header signature as written by `ShrinkIt`
	pub const RECORD_SIGNATURE: [u8; 4] = [0x4E, 0xF5, 0x46, 0xD8];

	/// Record header signature in plain ASCII
	pub const RECORD_SIGNATURE_ASCII: [u8; 4] = *b"NuFX";

	/// Binary II signature
	pub const BINARY_II_SIGNATURE: [u8; 3] = [0x0A, 0x47, 0x4C];

	/// Binary II header length
	pub const BINARY_II_HEADER: usize = 128;

	/// Master header length
	pub const MASTER_HEADER_SIZE: usize = 48;

	/// Smallest attribute count (fixed fields plus the filename length)
	pub const MIN_ATTRIB_COUNT: u16 = 58;

	/// Thread header length
	pub const THREAD_HEADER_SIZE: usize = 16;

	/// Master version written
	pub const MASTER_VERSION: u16 = 2;

	/// Record version written
	pub const RECORD_VERSION: u16 = 3;

	/// Seed of the version 3 thread CRC
	pub const THREAD_CRC_SEED: u16 = 0xFFFF;

	/// `ProDOS` filesystem id
	pub const FILESYSTEM_PRODOS: u16 = 1;

	/// Largest disk image thread, a full 65535-block `ProDOS` volume
	pub const MAX_DISK_IMAGE: usize = 0xFFFF * 512;
}

use constants::*;

/// Thread compression format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ThreadFormat {
	/// Stored
	Uncompressed,
	/// Huffman squeeze
	Squeeze,
	/// `ShrinkIt` LZW/1
	Lzw1,
	/// `ShrinkIt` LZW/2
	Lzw2,
	/// Any other code
	Other(u16),
}

impl From<u16> for ThreadFormat {
	fn from(value: u16) -> Self {
		match value {
			0 => ThreadFormat::Uncompressed,
			1 => ThreadFormat::Squeeze,
			2 => ThreadFormat::Lzw1,
			3 => ThreadFormat::Lzw2,
			other => ThreadFormat::Other(other),
		}
	}
}

impl From<ThreadFormat> for u16 {
	fn from(value: ThreadFormat) -> Self {
		match value {
			ThreadFormat::Uncompressed => 0,
			ThreadFormat::Squeeze => 1,
			ThreadFormat::Lzw1 => 2,
			ThreadFormat::Lzw2 => 3,
			ThreadFormat::Other(code) => code,
		}
	}
}

impl Display for ThreadFormat {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ThreadFormat::Uncompressed => write!(f, "stored"),
			ThreadFormat::Squeeze => write!(f, "squeeze"),
			ThreadFormat::Lzw1 => write!(f, "LZW/1"),
			ThreadFormat::Lzw2 => write!(f, "LZW/2"),
			ThreadFormat::Other(code) => write!(f, "format {}", code),
		}
	}
}

/// What a thread holds, from its (class, kind) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ThreadRole {
	/// Class 0: text or icon message
	Message,
	/// Class 1: control
	Control,
	/// Class 2, kind 0
	DataFork,
	/// Class 2, kind 1
	DiskImage,
	/// Class 2, kind 2
	ResourceFork,
	/// Class 3, kind 0
	Filename,
	/// Anything else
	Unknown,
}

impl ThreadRole {
	/// Classifies a thread
	pub fn from_class_kind(class: u16, kind: u16) -> Self {
		match (class, kind) {
			(0, _) => ThreadRole::Message,
			(1, _) => ThreadRole::Control,
			(2, 0) => ThreadRole::DataFork,
			(2, 1) => ThreadRole::DiskImage,
			(2, 2) => ThreadRole::ResourceFork,
			(3, 0) => ThreadRole::Filename,
			_ => ThreadRole::Unknown,
		}
	}

	/// Returns the (class, kind) pair written for this role
	pub fn class_kind(self) -> (u16, u16) {
		match self {
			ThreadRole::Message => (0, 1),
			ThreadRole::Control => (1, 0),
			ThreadRole::DataFork => (2, 0),
			ThreadRole::DiskImage => (2, 1),
			ThreadRole::ResourceFork => (2, 2),
			ThreadRole::Filename => (3, 0),
			ThreadRole::Unknown => (0xFFFF, 0xFFFF),
		}
	}

	/// Data-class threads carry a CRC over their uncompressed contents
	pub fn is_data(self) -> bool {
		matches!(self, ThreadRole::DataFork | ThreadRole::DiskImage | ThreadRole::ResourceFork)
	}
}

/// 16-byte thread header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThreadHeader {
	/// Thread class
	pub class: u16,
	/// Compression format
	pub format: ThreadFormat,
	/// Thread kind
	pub kind: u16,
	/// Stored CRC
	pub crc: u16,
	/// Uncompressed length
	pub eof: u32,
	/// Compressed length
	pub compressed_eof: u32,
}

impl ThreadHeader {
	/// Parses a thread header
	pub fn from_bytes(data: &[u8]) -> Result<Self, A2FileError> {
		if data.len() < THREAD_HEADER_SIZE {
			return Err(A2FileError::insufficient_data(FormatKind::NuFx, THREAD_HEADER_SIZE, data.len()));
		}
		Ok(Self {
			class: u16_at(data, 0x00),
			format: ThreadFormat::from(u16_at(data, 0x02)),
			kind: u16_at(data, 0x04),
			crc: u16_at(data, 0x06),
			eof: u32_at(data, 0x08),
			compressed_eof: u32_at(data, 0x0C),
		})
	}

	/// Serializes the header
	pub fn to_bytes(&self) -> [u8; THREAD_HEADER_SIZE] {
		let mut bytes = [0u8; THREAD_HEADER_SIZE];
		put_u16(&mut bytes, 0x00, self.class);
		put_u16(&mut bytes, 0x02, self.format.into());
		put_u16(&mut bytes, 0x04, self.kind);
		put_u16(&mut bytes, 0x06, self.crc);
		put_u32(&mut bytes, 0x08, self.eof);
		put_u32(&mut bytes, 0x0C, self.compressed_eof);
		bytes
	}

	/// Role of the thread
	pub fn role(&self) -> ThreadRole {
		ThreadRole::from_class_kind(self.class, self.kind)
	}
}

/// Archive master header
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MasterHeader {
	/// Stored CRC
	pub crc: u16,
	/// Number of records
	pub total_records: u32,
	/// Archive creation date
	pub created: Option<NaiveDateTime>,
	/// Archive modification date
	pub modified: Option<NaiveDateTime>,
	/// Master version
	pub version: u16,
	/// Archive length, master header included
	pub archive_eof: u32,
}

impl MasterHeader {
	/// Parses a master header, accepting either signature spelling
	pub fn from_bytes(data: &[u8]) -> Result<Self, A2FileError> {
		if data.len() < MASTER_HEADER_SIZE {
			return Err(A2FileError::insufficient_data(FormatKind::NuFx, MASTER_HEADER_SIZE, data.len()));
		}
		let signature = &data[..6];
		if signature != MASTER_SIGNATURE && signature != MASTER_SIGNATURE_ASCII {
			return Err(A2FileError::invalid_magic(FormatKind::NuFx, &MASTER_SIGNATURE, signature));
		}
		Ok(Self {
			crc: u16_at(data, 0x06),
			total_records: u32_at(data, 0x08),
			created: unpack_datetime(&data[0x0C..0x14]),
			modified: unpack_datetime(&data[0x14..0x1C]),
			version: u16_at(data, 0x1C),
			archive_eof: u32_at(data, 0x26),
		})
	}

	/// Serializes the header, computing its CRC
	pub fn to_bytes(&self) -> [u8; MASTER_HEADER_SIZE] {
		let mut bytes = [0u8; MASTER_HEADER_SIZE];
		bytes[..6].copy_from_slice(&MASTER_SIGNATURE);
		put_u32(&mut bytes, 0x08, self.total_records);
		bytes[0x0C..0x14].copy_from_slice(&pack_datetime(self.created));
		bytes[0x14..0x1C].copy_from_slice(&pack_datetime(self.modified));
		put_u16(&mut bytes, 0x1C, self.version);
		put_u32(&mut bytes, 0x26, self.archive_eof);
		let crc = crate::file::codec::crc16_xmodem(&bytes[0x08..]);
		put_u16(&mut bytes, 0x06, crc);
		bytes
	}
}

/// Returns `true` if `data` starts with a Binary II header
pub fn is_binary_ii(data: &[u8]) -> bool {
	data.len() >= BINARY_II_HEADER && data[..3] == BINARY_II_SIGNATURE
}

/// Returns `true` if `data` is a `NuFX` archive, bare or inside Binary II
pub fn is_nufx(data: &[u8]) -> bool {
	let bare = if is_binary_ii(data) {
		&data[BINARY_II_HEADER..]
	} else {
		data
	};
	bare.get(..6).is_some_and(|s| s == MASTER_SIGNATURE || s == MASTER_SIGNATURE_ASCII)
}

/// Unpacks an 8-byte date; all zero or invalid is `None`
pub fn unpack_datetime(bytes: &[u8]) -> Option<NaiveDateTime> {
	if bytes.len() < 6 || bytes[..6].iter().all(|&b| b == 0) {
		return None;
	}
	let year = 1900 + i32::from(bytes[3]);
	NaiveDate::from_ymd_opt(year, u32::from(bytes[5]) + 1, u32::from(bytes[4]) + 1)?.and_hms_opt(
		u32::from(bytes[2]),
		u32::from(bytes[1]),
		u32::from(bytes[0]),
	)
}

/// Packs a date into 8 bytes; `None` and years outside 1900-2155 pack as zero
pub fn pack_datetime(datetime: Option<NaiveDateTime>) -> [u8; 8] {
	let Some(datetime) = datetime else {
		return [0; 8];
	};
	let Ok(year) = u8::try_from(datetime.year() - 1900) else {
		return [0; 8];
	};
	[
		datetime.second() as u8,
		datetime.minute() as u8,
		datetime.hour() as u8,
		year,
		(datetime.day() - 1) as u8,
		(datetime.month() - 1) as u8,
		0,
		datetime.weekday().number_from_sunday() as u8,
	]
}
