//! UCSD Pascal volume support (read-only).
//!
//! ## Directory
//!
//! Blocks 2 to 5 hold a table of 26-byte entries. Entry 0 describes the volume:
//!
//! | Offset | Size | Field                         |
//! |--------|------|-------------------------------|
//! | 0x00   | 2    | First block (always 0)        |
//! | 0x02   | 2    | Block after the directory (6) |
//! | 0x04   | 2    | Kind (always 0)               |
//! | 0x06   | 1    | Name length (1-7)             |
//! | 0x07   | 7    | Name                          |
//! | 0x0E   | 2    | Blocks on the volume          |
//! | 0x10   | 2    | Number of files               |
//!
//! Every following entry describes one contiguous file:
//!
//! | Offset | Size | Field                          |
//! |--------|------|--------------------------------|
//! | 0x00   | 2    | First block                    |
//! | 0x02   | 2    | Block after the last one       |
//! | 0x04   | 2    | Kind (low 4 bits)              |
//! | 0x06   | 1    | Name length (1-15)             |
//! | 0x07   | 15   | Name                           |
//! | 0x16   | 2    | Bytes used in the last block   |
//! | 0x18   | 2    | Modification date              |
//!
//! Dates pack as `yyyyyyydddddmmmm`, years counted from 1900.

use std::fmt::Display;

use chrono::{NaiveDate, NaiveDateTime};

use crate::file::{
	A2FileError, Addressing, BLOCK_SIZE, Catalog, CatalogEntry, Diagnostics, DiskFormat, EntryContents,
	FLOPPY_140K, FormatKind, ReadOptions, bytes::u16_at,
};

const KIND: FormatKind = FormatKind::Pascal;

/// UCSD Pascal constants
pub mod constants {
	/// First directory block
	pub const DIRECTORY_BLOCK: usize = 2;

	/// Directory length in blocks
	pub const DIRECTORY_BLOCKS: usize = 4;

	/// Size of a directory entry
	pub const ENTRY_SIZE: usize = 26;

	/// Maximum number of files in a directory
	pub const MAX_FILES: usize = 77;

	/// Maximum volume name length
	pub const MAX_VOLUME_NAME: usize = 7;

	/// Maximum file name length
	pub const MAX_FILE_NAME: usize = 15;

	/// Editor header preceding the text of a TEXT file
	pub const TEXT_HEADER: usize = 1024;

	/// Blank compression prefix in TEXT files
	pub const DLE: u8 = 0x10;
}

use constants::*;

/// File kind stored in the low four bits of the kind word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
	/// Volume header
	Volume,
	/// Bad blocks
	Bad,
	/// Compiled code
	Code,
	/// Editor text, kind 3
	///
	/// Kind 2 is compiled code; only kind 3 files carry the editor header and
	/// blank compression.
	Text,
	/// Debugger information
	Info,
	/// Untyped data
	Data,
	/// Graphics
	Graf,
	/// Photo
	Foto,
	/// Secure subdirectory
	SecureDir,
	/// Unassigned
	Unknown(u8),
}

impl From<u16> for FileKind {
	fn from(value: u16) -> Self {
		match (value & 0x0F) as u8 {
			0 => FileKind::Volume,
			1 => FileKind::Bad,
			2 => FileKind::Code,
			3 => FileKind::Text,
			4 => FileKind::Info,
			5 => FileKind::Data,
			6 => FileKind::Graf,
			7 => FileKind::Foto,
			8 => FileKind::SecureDir,
			other => FileKind::Unknown(other),
		}
	}
}

impl Display for FileKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			FileKind::Volume => write!(f, "VOLUME"),
			FileKind::Bad => write!(f, "BAD"),
			FileKind::Code => write!(f, "CODE"),
			FileKind::Text => write!(f, "TEXT"),
			FileKind::Info => write!(f, "INFO"),
			FileKind::Data => write!(f, "DATA"),
			FileKind::Graf => write!(f, "GRAF"),
			FileKind::Foto => write!(f, "FOTO"),
			FileKind::SecureDir => write!(f, "SECUREDIR"),
			FileKind::Unknown(code) => write!(f, "${:02X}", code),
		}
	}
}

/// Volume header (directory entry 0)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeHeader {
	/// Volume name
	pub name: String,
	/// Blocks on the volume
	pub total_blocks: u16,
	/// Number of files in the directory
	pub file_count: u16,
}

impl VolumeHeader {
	/// Parses and validates the volume header
	pub fn from_bytes(entry: &[u8], image_blocks: usize) -> Result<Self, A2FileError> {
		if entry.len() < ENTRY_SIZE {
			return Err(A2FileError::insufficient_data(KIND, ENTRY_SIZE, entry.len()));
		}
		let first = u16_at(entry, 0x00);
		let next = u16_at(entry, 0x02);
		let kind = u16_at(entry, 0x04);
		if first != 0 || usize::from(next) != DIRECTORY_BLOCK + DIRECTORY_BLOCKS || kind & 0x0F != 0 {
			return Err(A2FileError::invalid_magic(KIND, &[0, 0, 6, 0, 0, 0], &entry[..6]));
		}

		let name_len = usize::from(entry[0x06]);
		let total_blocks = u16_at(entry, 0x0E);
		let file_count = u16_at(entry, 0x10);
		if !(1..=MAX_VOLUME_NAME).contains(&name_len) {
			return Err(A2FileError::structural(KIND, format!("volume name length {}", name_len)));
		}
		if usize::from(total_blocks) < DIRECTORY_BLOCK + DIRECTORY_BLOCKS || usize::from(total_blocks) > image_blocks {
			return Err(A2FileError::structural(
				KIND,
				format!("volume claims {} blocks, image has {}", total_blocks, image_blocks),
			));
		}
		if usize::from(file_count) > MAX_FILES {
			return Err(A2FileError::structural(KIND, format!("{} files in one directory", file_count)));
		}

		let name = read_name(&entry[0x07..0x07 + name_len])
			.ok_or_else(|| A2FileError::structural(KIND, "volume name is not printable"))?;
		Ok(Self {
			name,
			total_blocks,
			file_count,
		})
	}
}

/// A file entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
	/// First block
	pub first_block: u16,
	/// Block following the last one
	pub next_block: u16,
	/// Kind word
	pub kind: u16,
	/// File name
	pub name: String,
	/// Bytes used in the last block
	pub last_bytes: u16,
	/// Modification date
	pub modified: Option<NaiveDateTime>,
}

impl FileEntry {
	/// Parses and validates a file entry against the volume size
	pub fn from_bytes(entry: &[u8], total_blocks: u16) -> Result<Self, A2FileError> {
		let first_block = u16_at(entry, 0x00);
		let next_block = u16_at(entry, 0x02);
		if first_block >= next_block || next_block > total_blocks {
			return Err(A2FileError::structural(
				KIND,
				format!("extent {}..{} outside a {}-block volume", first_block, next_block, total_blocks),
			));
		}

		let name_len = usize::from(entry[0x06]);
		if !(1..=MAX_FILE_NAME).contains(&name_len) {
			return Err(A2FileError::structural(KIND, format!("file name length {}", name_len)));
		}
		let name = read_name(&entry[0x07..0x07 + name_len])
			.ok_or_else(|| A2FileError::structural(KIND, "file name is not printable"))?;

		Ok(Self {
			first_block,
			next_block,
			kind: u16_at(entry, 0x04),
			name,
			last_bytes: u16_at(entry, 0x16),
			modified: unpack_date(u16_at(entry, 0x18)),
		})
	}

	/// File kind
	pub fn file_kind(&self) -> FileKind {
		FileKind::from(self.kind)
	}

	/// Blocks occupied
	pub fn blocks(&self) -> usize {
		usize::from(self.next_block - self.first_block)
	}

	/// Size in bytes
	pub fn size(&self) -> usize {
		let last = usize::from(self.last_bytes).min(BLOCK_SIZE);
		(self.blocks() - 1) * BLOCK_SIZE + last
	}
}

fn read_name(bytes: &[u8]) -> Option<String> {
	bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ').then(|| String::from_utf8_lossy(bytes).into_owned())
}

/// Unpacks a `yyyyyyydddddmmmm` date; zero or invalid dates are `None`
pub fn unpack_date(word: u16) -> Option<NaiveDateTime> {
	if word == 0 {
		return None;
	}
	let month = u32::from(word & 0x0F);
	let day = u32::from((word >> 4) & 0x1F);
	let year = i32::from(word >> 9) + 1900;
	NaiveDate::from_ymd_opt(year, month, day).and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Expands editor text: DLE runs become spaces, CR becomes a newline, NULs are dropped
pub fn expand_text(data: &[u8]) -> Vec<u8> {
	let mut output = Vec::with_capacity(data.len());
	let mut bytes = data.iter().copied();
	while let Some(byte) = bytes.next() {
		match byte {
			DLE => {
				let count = bytes.next().map_or(0, |n| usize::from(n.saturating_sub(32)));
				output.resize(output.len() + count, b' ');
			}
			0x0D => output.push(b'\n'),
			0x00 => {}
			other => output.push(other),
		}
	}
	output
}

/// Concatenates the directory blocks
fn read_directory(buffer: &[u8], addressing: Addressing) -> Result<Vec<u8>, A2FileError> {
	let mut directory = Vec::with_capacity(DIRECTORY_BLOCKS * BLOCK_SIZE);
	for block in DIRECTORY_BLOCK..DIRECTORY_BLOCK + DIRECTORY_BLOCKS {
		let data = addressing.read_block(buffer, block).ok_or_else(|| {
			A2FileError::insufficient_data(KIND, (DIRECTORY_BLOCK + DIRECTORY_BLOCKS) * BLOCK_SIZE, buffer.len())
		})?;
		directory.extend_from_slice(&data);
	}
	Ok(directory)
}

/// Reads a contiguous extent
fn read_extent(buffer: &[u8], addressing: Addressing, entry: &FileEntry) -> Option<Vec<u8>> {
	let mut data = Vec::with_capacity(entry.blocks() * BLOCK_SIZE);
	for block in usize::from(entry.first_block)..usize::from(entry.next_block) {
		data.extend_from_slice(&addressing.read_block(buffer, block)?);
	}
	data.truncate(entry.size());
	Some(data)
}

/// Parses the volume under one addressing
fn read_volume(buffer: &[u8], addressing: Addressing) -> Result<Catalog, A2FileError> {
	let directory = read_directory(buffer, addressing)?;
	let header = VolumeHeader::from_bytes(&directory[..ENTRY_SIZE], Addressing::block_count(buffer.len()))?;
	log::debug!("UCSD Pascal volume '{}' ({}, {} files)", header.name, addressing, header.file_count);

	let mut diagnostics = Diagnostics::new();
	let mut entries = Vec::new();
	for index in 1..=usize::from(header.file_count) {
		let offset = index * ENTRY_SIZE;
		let entry = match FileEntry::from_bytes(&directory[offset..offset + ENTRY_SIZE], header.total_blocks) {
			Ok(entry) => entry,
			Err(e) => {
				diagnostics.warn(KIND, format!("directory entry {}: {}", index, e));
				break;
			}
		};

		let Some(raw) = read_extent(buffer, addressing, &entry) else {
			diagnostics.warn(KIND, format!("'{}' extends past the end of the image", entry.name));
			continue;
		};
		let data = match entry.file_kind() {
			FileKind::Text => expand_text(raw.get(TEXT_HEADER..).unwrap_or_default()),
			_ => raw,
		};

		entries.push(CatalogEntry {
			name: entry.name.clone(),
			file_type: (entry.kind & 0x0F) as u8,
			aux_type: 0,
			size: data.len(),
			blocks_used: entry.blocks(),
			key_block: usize::from(entry.first_block),
			storage_type: 0,
			locked: false,
			created: None,
			modified: entry.modified,
			contents: EntryContents::File {
				data,
				resource_fork: None,
			},
		});
	}

	Ok(Catalog {
		disk_name: header.name,
		disk_format: DiskFormat::Pascal,
		disk_size: buffer.len(),
		addressing,
		entries,
		diagnostics,
	})
}

/// Tries each addressing in turn, returning the first volume whose header validates
fn read_with_orders(buffer: &[u8], orders: &[Addressing]) -> Result<Catalog, A2FileError> {
	let mut last_error = A2FileError::UnrecognizedImage {
		size: buffer.len(),
	};
	for &addressing in orders {
		match read_volume(buffer, addressing) {
			Ok(catalog) => return Ok(catalog),
			Err(e) => last_error = e,
		}
	}
	Err(last_error)
}

/// Parses a UCSD Pascal volume with default options
pub fn read_catalog(buffer: &[u8]) -> Result<Catalog, A2FileError> {
	read_catalog_with(buffer, &ReadOptions::default())
}

/// Parses a UCSD Pascal volume
///
/// Linear order is tried first; DOS order only for 140K floppies.
pub fn read_catalog_with(buffer: &[u8], _options: &ReadOptions) -> Result<Catalog, A2FileError> {
	if buffer.len() == FLOPPY_140K {
		read_with_orders(buffer, &[Addressing::Linear, Addressing::Interleaved])
	} else {
		read_with_orders(buffer, &[Addressing::Linear])
	}
}
