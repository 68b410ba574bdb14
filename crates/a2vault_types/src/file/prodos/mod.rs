//! `ProDOS` volume support.
//!
//! ## Volume layout
//!
//! | Block | Contents                                                  |
//! |-------|-----------------------------------------------------------|
//! | 0-1   | Boot loader                                               |
//! | 2-5   | Volume directory (linked list of directory blocks)        |
//! | 6..   | Volume bitmap, one bit per block, MSB first, 1 = free     |
//!
//! Every directory block starts with a 4-byte header (previous and next block
//! pointers) followed by 39-byte entries, 13 per block. The first entry of a
//! directory's key block is the directory header (volume header for the root,
//! subdirectory header otherwise).
//!
//! ## Storage types
//!
//! | Type | Meaning                                                     |
//! |------|-------------------------------------------------------------|
//! | 0x0  | Unused entry                                                |
//! | 0x1  | Seedling, key block is the single data block               |
//! | 0x2  | Sapling, key block is an index of up to 256 data blocks     |
//! | 0x3  | Tree, key block is a master index of up to 128 index blocks |
//! | 0x5  | Extended file with data and resource forks                  |
//! | 0xD  | Subdirectory entry                                          |
//! | 0xE  | Subdirectory header                                         |
//! | 0xF  | Volume directory header                                     |
//!
//! Index blocks split each 16-bit block number across two planes: low bytes
//! in the first 256 bytes, high bytes in the second 256.

mod bitmap;
mod reader;
mod writer;


use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::file::{
	A2FileError, FormatKind,
	bytes::{put_u16, put_u24, u16_at, u24_at},
};

pub use bitmap::VolumeBitmap;
pub use reader::{VolumeInfo, detect, read_catalog, read_catalog_with, volume_info};
pub use writer::{NewFile, add_file, create_directory, create_volume, delete_file, rename};

/// `ProDOS` constants
pub mod constants {
	/// Length of a directory entry
	pub const ENTRY_LENGTH: usize = 0x27;

	/// Entries per directory block
	pub const ENTRIES_PER_BLOCK: usize = 0x0D;

	/// Size of the previous/next pointer header of a directory block
	pub const DIR_BLOCK_HEADER: usize = 4;

	/// Key block of the volume directory
	pub const VOLUME_DIR_BLOCK: usize = 2;

	/// Number of blocks in a freshly formatted volume directory
	pub const VOLUME_DIR_BLOCKS: usize = 4;

	/// First bitmap block of a freshly formatted volume
	pub const BITMAP_BLOCK: usize = 6;

	/// Blocks tracked by one bitmap block
	pub const BLOCKS_PER_BITMAP_BLOCK: usize = 4096;

	/// Block pointers per index block
	pub const POINTERS_PER_INDEX: usize = 256;

	/// Index block pointers used in a master index
	pub const MASTER_INDEX_SLOTS: usize = 128;

	/// Largest volume `ProDOS` can address
	pub const MAX_BLOCKS: usize = 0xFFFF;

	/// Largest EOF a file can have (24 bits)
	pub const MAX_EOF: usize = 0xFF_FFFF;

	/// Maximum name length
	pub const MAX_NAME_LEN: usize = 15;

	/// Default access byte: destroy, rename, write and read enabled
	pub const ACCESS_DEFAULT: u8 = 0xC3;

	/// Access byte written for new files (adds the backup bit)
	pub const ACCESS_NEW_FILE: u8 = 0xE3;

	/// Value stored at +16 of a subdirectory header
	pub const SUBDIR_HEADER_MARKER: u8 = 0x75;

	/// File type of a directory
	pub const FILE_TYPE_DIRECTORY: u8 = 0x0F;
}

/// Storage type nibble of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageType {
	/// Unused slot
	Empty,
	/// One data block
	Seedling,
	/// One index block
	Sapling,
	/// Master index plus index blocks
	Tree,
	/// Pascal area on a `ProDOS` partition
	PascalArea,
	/// Data and resource forks
	Extended,
	/// Subdirectory entry
	Subdirectory,
	/// Subdirectory header
	SubdirectoryHeader,
	/// Volume directory header
	VolumeHeader,
	/// Anything else
	Unknown(u8),
}

impl From<u8> for StorageType {
	fn from(value: u8) -> Self {
		match value {
			0x0 => StorageType::Empty,
			0x1 => StorageType::Seedling,
			0x2 => StorageType::Sapling,
			0x3 => StorageType::Tree,
			0x4 => StorageType::PascalArea,
			0x5 => StorageType::Extended,
			0xD => StorageType::Subdirectory,
			0xE => StorageType::SubdirectoryHeader,
			0xF => StorageType::VolumeHeader,
			other => StorageType::Unknown(other),
		}
	}
}

impl From<StorageType> for u8 {
	fn from(value: StorageType) -> Self {
		match value {
			StorageType::Empty => 0x0,
			StorageType::Seedling => 0x1,
			StorageType::Sapling => 0x2,
			StorageType::Tree => 0x3,
			StorageType::PascalArea => 0x4,
			StorageType::Extended => 0x5,
			StorageType::Subdirectory => 0xD,
			StorageType::SubdirectoryHeader => 0xE,
			StorageType::VolumeHeader => 0xF,
			StorageType::Unknown(other) => other,
		}
	}
}

impl StorageType {
	/// Storage type for a standard file of `data_blocks` blocks
	pub fn for_blocks(data_blocks: usize) -> Self {
		match data_blocks {
			0 | 1 => StorageType::Seedling,
			2..=constants::POINTERS_PER_INDEX => StorageType::Sapling,
			_ => StorageType::Tree,
		}
	}
}

/// Decodes a `ProDOS` date/time pair, `None` if zero or invalid
///
/// Date word: `yyyyyyy mmmm ddddd`; time word: `000hhhhh 00mmmmmm`.
pub fn unpack_datetime(date: u16, time: u16) -> Option<NaiveDateTime> {
	if date == 0 {
		return None;
	}
	let raw_year = i32::from(date >> 9);
	let year = if raw_year < 40 {
		2000 + raw_year
	} else {
		1900 + raw_year
	};
	let month = u32::from((date >> 5) & 0x0F);
	let day = u32::from(date & 0x1F);
	let hour = u32::from((time >> 8) & 0x1F);
	let minute = u32::from(time & 0x3F);

	NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)
}

/// Years a two-digit `ProDOS` date can hold
const DATE_YEARS: std::ops::RangeInclusive<i32> = 1940..=2039;

/// Encodes a date/time as a `ProDOS` date/time pair, `None` for years outside 1940-2039
pub fn pack_datetime(datetime: &NaiveDateTime) -> Option<(u16, u16)> {
	if !DATE_YEARS.contains(&datetime.year()) {
		return None;
	}
	let year = datetime.year().rem_euclid(100) as u16;
	let date = (year << 9) | ((datetime.month() as u16) << 5) | datetime.day() as u16;
	let time = ((datetime.hour() as u16) << 8) | datetime.minute() as u16;
	Some((date, time))
}

fn read_datetime(data: &[u8], offset: usize) -> Option<NaiveDateTime> {
	unpack_datetime(u16_at(data, offset), u16_at(data, offset + 2))
}

fn write_datetime(data: &mut [u8], offset: usize, datetime: Option<&NaiveDateTime>) {
	let (date, time) = datetime.and_then(pack_datetime).unwrap_or_default();
	put_u16(data, offset, date);
	put_u16(data, offset + 2, time);
}

/// Decodes the name field of an entry, `None` if the length or characters are invalid
fn read_name(entry: &[u8]) -> Option<String> {
	let len = usize::from(entry[0] & 0x0F);
	if len == 0 {
		return None;
	}
	let bytes = &entry[1..1 + len];
	if !bytes.iter().all(|&b| (0x20..0x7F).contains(&b)) {
		return None;
	}
	Some(bytes.iter().map(|&b| char::from(b)).collect())
}

fn write_name(entry: &mut [u8], storage_type: StorageType, name: &str) {
	let len = name.len().min(constants::MAX_NAME_LEN);
	entry[0] = (u8::from(storage_type) << 4) | len as u8;
	entry[1..1 + constants::MAX_NAME_LEN].fill(0);
	entry[1..1 + len].copy_from_slice(&name.as_bytes()[..len]);
}

/// Validates a `ProDOS` file name and returns its stored (upper-case) form
pub fn normalize_name(name: &str) -> Result<String, A2FileError> {
	let invalid = |reason: &str| A2FileError::InvalidName {
		kind: FormatKind::ProDos,
		name: name.to_string(),
		reason: reason.to_string(),
	};

	if name.is_empty() || name.len() > constants::MAX_NAME_LEN {
		return Err(invalid("must be 1 to 15 characters"));
	}
	if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
		return Err(invalid("must start with a letter"));
	}
	if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '.') {
		return Err(invalid("only letters, digits and periods are allowed"));
	}
	Ok(name.to_ascii_uppercase())
}

/// Directory header specific fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
	/// Volume directory header
	Volume {
		/// First bitmap block
		bitmap_pointer: u16,
		/// Number of blocks on the volume
		total_blocks: u16,
	},
	/// Subdirectory header
	Subdirectory {
		/// Block holding the parent directory's entry for this directory
		parent_pointer: u16,
		/// Entry number within that block
		parent_entry_number: u8,
		/// Entry length of the parent directory
		parent_entry_length: u8,
	},
}

/// First entry of a directory's key block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryHeader {
	/// Directory or volume name
	pub name: String,
	/// Creation timestamp
	pub created: Option<NaiveDateTime>,
	/// Access flags
	pub access: u8,
	/// Length of each entry
	pub entry_length: u8,
	/// Entries per block
	pub entries_per_block: u8,
	/// Number of active entries
	pub file_count: u16,
	/// Header specific fields
	pub kind: HeaderKind,
}

impl DirectoryHeader {
	/// Parses a header from the 39 bytes following the block pointers
	pub fn from_bytes(entry: &[u8]) -> Result<Self, A2FileError> {
		if entry.len() < constants::ENTRY_LENGTH {
			return Err(A2FileError::insufficient_data(
				FormatKind::ProDos,
				constants::ENTRY_LENGTH,
				entry.len(),
			));
		}

		let storage = StorageType::from(entry[0] >> 4);
		let name = read_name(entry)
			.ok_or_else(|| A2FileError::structural(FormatKind::ProDos, "invalid directory header name"))?;
		let kind = match storage {
			StorageType::VolumeHeader => HeaderKind::Volume {
				bitmap_pointer: u16_at(entry, 0x23),
				total_blocks: u16_at(entry, 0x25),
			},
			StorageType::SubdirectoryHeader => HeaderKind::Subdirectory {
				parent_pointer: u16_at(entry, 0x23),
				parent_entry_number: entry[0x25],
				parent_entry_length: entry[0x26],
			},
			other => {
				return Err(A2FileError::structural(
					FormatKind::ProDos,
					format!("expected a directory header, found storage type {:?}", other),
				));
			}
		};

		Ok(Self {
			name,
			created: read_datetime(entry, 0x18),
			access: entry[0x1E],
			entry_length: entry[0x1F],
			entries_per_block: entry[0x20],
			file_count: u16_at(entry, 0x21),
			kind,
		})
	}

	/// Serializes the header to its 39-byte form
	pub fn to_bytes(&self) -> [u8; constants::ENTRY_LENGTH] {
		let mut entry = [0u8; constants::ENTRY_LENGTH];
		let storage = match self.kind {
			HeaderKind::Volume {
				..
			} => StorageType::VolumeHeader,
			HeaderKind::Subdirectory {
				..
			} => StorageType::SubdirectoryHeader,
		};
		write_name(&mut entry, storage, &self.name);
		write_datetime(&mut entry, 0x18, self.created.as_ref());
		entry[0x1E] = self.access;
		entry[0x1F] = self.entry_length;
		entry[0x20] = self.entries_per_block;
		put_u16(&mut entry, 0x21, self.file_count);
		match self.kind {
			HeaderKind::Volume {
				bitmap_pointer,
				total_blocks,
			} => {
				put_u16(&mut entry, 0x23, bitmap_pointer);
				put_u16(&mut entry, 0x25, total_blocks);
			}
			HeaderKind::Subdirectory {
				parent_pointer,
				parent_entry_number,
				parent_entry_length,
			} => {
				entry[0x10] = constants::SUBDIR_HEADER_MARKER;
				put_u16(&mut entry, 0x23, parent_pointer);
				entry[0x25] = parent_entry_number;
				entry[0x26] = parent_entry_length;
			}
		}
		entry
	}

	/// Entry length and entries per block, falling back to the standard layout
	/// when the stored values cannot fit in a block
	pub fn geometry(&self) -> (usize, usize) {
		let length = usize::from(self.entry_length);
		let per_block = usize::from(self.entries_per_block);
		if length >= constants::ENTRY_LENGTH
			&& per_block > 0
			&& constants::DIR_BLOCK_HEADER + length * per_block <= crate::file::BLOCK_SIZE
		{
			(length, per_block)
		} else {
			(constants::ENTRY_LENGTH, constants::ENTRIES_PER_BLOCK)
		}
	}
}

/// A file or subdirectory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
	/// Storage type
	pub storage_type: StorageType,
	/// File name
	pub name: String,
	/// File type byte
	pub file_type: u8,
	/// Key block
	pub key_pointer: u16,
	/// Blocks used, index blocks included
	pub blocks_used: u16,
	/// Size in bytes
	pub eof: u32,
	/// Creation timestamp
	pub created: Option<NaiveDateTime>,
	/// `ProDOS` version that created the file
	pub version: u8,
	/// Minimum `ProDOS` version to access the file
	pub min_version: u8,
	/// Access flags
	pub access: u8,
	/// Auxiliary type
	pub aux_type: u16,
	/// Last modification timestamp
	pub modified: Option<NaiveDateTime>,
	/// Key block of the directory holding this entry
	pub header_pointer: u16,
}

impl FileEntry {
	/// Parses an entry, `None` for an unused slot
	pub fn from_bytes(entry: &[u8]) -> Result<Option<Self>, A2FileError> {
		if entry.len() < constants::ENTRY_LENGTH {
			return Err(A2FileError::insufficient_data(
				FormatKind::ProDos,
				constants::ENTRY_LENGTH,
				entry.len(),
			));
		}

		let storage_type = StorageType::from(entry[0] >> 4);
		if storage_type == StorageType::Empty {
			return Ok(None);
		}
		let name = read_name(entry).ok_or_else(|| {
			A2FileError::structural(FormatKind::ProDos, format!("invalid entry name {:02X?}", &entry[..16]))
		})?;

		Ok(Some(Self {
			storage_type,
			name,
			file_type: entry[0x10],
			key_pointer: u16_at(entry, 0x11),
			blocks_used: u16_at(entry, 0x13),
			eof: u24_at(entry, 0x15),
			created: read_datetime(entry, 0x18),
			version: entry[0x1C],
			min_version: entry[0x1D],
			access: entry[0x1E],
			aux_type: u16_at(entry, 0x1F),
			modified: read_datetime(entry, 0x21),
			header_pointer: u16_at(entry, 0x25),
		}))
	}

	/// Serializes the entry to its 39-byte form
	pub fn to_bytes(&self) -> [u8; constants::ENTRY_LENGTH] {
		let mut entry = [0u8; constants::ENTRY_LENGTH];
		write_name(&mut entry, self.storage_type, &self.name);
		entry[0x10] = self.file_type;
		put_u16(&mut entry, 0x11, self.key_pointer);
		put_u16(&mut entry, 0x13, self.blocks_used);
		put_u24(&mut entry, 0x15, self.eof);
		write_datetime(&mut entry, 0x18, self.created.as_ref());
		entry[0x1C] = self.version;
		entry[0x1D] = self.min_version;
		entry[0x1E] = self.access;
		put_u16(&mut entry, 0x1F, self.aux_type);
		write_datetime(&mut entry, 0x21, self.modified.as_ref());
		put_u16(&mut entry, 0x25, self.header_pointer);
		entry
	}

	/// Returns `true` for subdirectory entries
	pub fn is_directory(&self) -> bool {
		self.storage_type == StorageType::Subdirectory
	}
}

/// Reads pointer `slot` of an index block
fn index_pointer(index: &[u8], slot: usize) -> usize {
	usize::from(index[slot]) | (usize::from(index[constants::POINTERS_PER_INDEX + slot]) << 8)
}

/// Writes pointer `slot` of an index block
fn set_index_pointer(index: &mut [u8], slot: usize, block: usize) {
	index[slot] = block as u8;
	index[constants::POINTERS_PER_INDEX + slot] = (block >> 8) as u8;
}
