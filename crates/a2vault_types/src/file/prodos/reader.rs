//! Volume detection, directory walking and file extraction.

use std::collections::HashSet;

use chrono::NaiveDateTime;

use crate::file::{
	A2FileError, Addressing, BLOCK_SIZE, Block, Catalog, CatalogEntry, Diagnostics, DiskFormat,
	EntryContents, FLOPPY_140K, FormatKind, ReadOptions,
	bytes::{u16_at, u24_at},
};

use super::{
	DirectoryHeader, FileEntry, HeaderKind, StorageType, VolumeBitmap, constants::*, index_pointer,
};

const KIND: FormatKind = FormatKind::ProDos;

/// Summary of a `ProDOS` volume
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct VolumeInfo {
	/// Volume name
	pub name: String,
	/// Physical order of the image
	pub addressing: Addressing,
	/// Key block of the volume directory
	pub key_block: usize,
	/// First bitmap block
	pub bitmap_block: usize,
	/// Blocks on the volume
	pub total_blocks: usize,
	/// Free blocks according to the bitmap
	pub free_blocks: usize,
	/// Active entries in the volume directory
	pub file_count: usize,
	/// Creation timestamp
	pub created: Option<NaiveDateTime>,
}

/// An opened volume
pub(super) struct Volume {
	pub addressing: Addressing,
	pub key_block: usize,
	pub header: DirectoryHeader,
	pub total_blocks: usize,
	pub bitmap_block: usize,
}

/// State of one directory entry slot
pub(super) enum SlotState {
	Free,
	Used(FileEntry),
	Damaged,
}

/// A directory entry slot and where it lives
pub(super) struct Slot {
	pub block: usize,
	pub offset: usize,
	pub state: SlotState,
}

/// Every slot of a directory chain
pub(super) struct DirectoryScan {
	pub header: DirectoryHeader,
	pub slots: Vec<Slot>,
}

impl DirectoryScan {
	/// Active entries in slot order
	pub fn entries(&self) -> impl Iterator<Item = (&Slot, &FileEntry)> {
		self.slots.iter().filter_map(|slot| match &slot.state {
			SlotState::Used(entry) => Some((slot, entry)),
			_ => None,
		})
	}

	/// Finds an active entry by name, ignoring case
	pub fn find(&self, name: &str) -> Option<(&Slot, &FileEntry)> {
		self.entries().find(|(_, entry)| entry.name.eq_ignore_ascii_case(name))
	}
}

/// Returns `true` if the block holds a plausible volume directory header
fn is_volume_header(block: &Block) -> bool {
	let storage = block[DIR_BLOCK_HEADER] >> 4;
	let len = usize::from(block[DIR_BLOCK_HEADER] & 0x0F);
	storage == 0xF
		&& (1..=MAX_NAME_LEN).contains(&len)
		&& block[DIR_BLOCK_HEADER + 1..DIR_BLOCK_HEADER + 1 + len]
			.iter()
			.all(|&b| (0x20..0x7F).contains(&b))
}

/// Finds the addressing and key block of a `ProDOS` volume directory
///
/// Linear order is tried first; interleaved order only for 140K floppy images.
/// The header is expected at block 2, with block 1 as a fallback.
pub fn detect(buffer: &[u8]) -> Option<(Addressing, usize)> {
	let candidates: &[Addressing] = if buffer.len() == FLOPPY_140K {
		&[Addressing::Linear, Addressing::Interleaved]
	} else {
		&[Addressing::Linear]
	};

	candidates.iter().find_map(|&addressing| {
		[VOLUME_DIR_BLOCK, 1].into_iter().find_map(|key| {
			addressing
				.read_block(buffer, key)
				.filter(is_volume_header)
				.map(|_| (addressing, key))
		})
	})
}

/// Locates and validates the volume header
pub(super) fn open(buffer: &[u8]) -> Result<Volume, A2FileError> {
	let Some((addressing, key_block)) = detect(buffer) else {
		let found = Addressing::Linear
			.read_block(buffer, VOLUME_DIR_BLOCK)
			.map(|b| vec![b[DIR_BLOCK_HEADER] & 0xF0])
			.unwrap_or_default();
		return Err(A2FileError::invalid_magic(KIND, &[0xF0], &found));
	};

	let block = read_required(buffer, addressing, key_block)?;
	let header = DirectoryHeader::from_bytes(&block[DIR_BLOCK_HEADER..DIR_BLOCK_HEADER + ENTRY_LENGTH])?;
	let HeaderKind::Volume {
		bitmap_pointer,
		total_blocks,
	} = header.kind
	else {
		return Err(A2FileError::structural(KIND, "root header is not a volume header"));
	};

	let available = Addressing::block_count(buffer.len());
	let total_blocks = match usize::from(total_blocks) {
		0 => available,
		declared => declared.min(available),
	};

	Ok(Volume {
		addressing,
		key_block,
		header,
		total_blocks,
		bitmap_block: usize::from(bitmap_pointer),
	})
}

/// Reads a block that must exist
pub(super) fn read_required(buffer: &[u8], addressing: Addressing, index: usize) -> Result<Block, A2FileError> {
	addressing.read_block(buffer, index).ok_or(A2FileError::BlockOutOfRange {
		index,
		total: Addressing::block_count(buffer.len()),
	})
}

/// Reads every slot of the directory whose key block is `key_block`
///
/// The walk stops (with a warning) at an unreadable block, at a block already
/// visited in this walk, or after `max_chain_length` blocks.
pub(super) fn scan_directory(
	buffer: &[u8],
	addressing: Addressing,
	key_block: usize,
	max_chain_length: usize,
	visited: &mut HashSet<usize>,
	diagnostics: &mut Diagnostics,
) -> Result<DirectoryScan, A2FileError> {
	let key = read_required(buffer, addressing, key_block)?;
	let header = DirectoryHeader::from_bytes(&key[DIR_BLOCK_HEADER..DIR_BLOCK_HEADER + ENTRY_LENGTH])?;
	let (entry_length, entries_per_block) = header.geometry();

	let mut slots = Vec::new();
	let mut block_index = key_block;
	let mut block = key;
	let mut first = true;
	let mut chain_length = 0;

	loop {
		if !visited.insert(block_index) {
			diagnostics.warn(KIND, format!("directory chain revisits block {}, stopping", block_index));
			break;
		}
		chain_length += 1;

		for slot in usize::from(first)..entries_per_block {
			let offset = DIR_BLOCK_HEADER + slot * entry_length;
			let state = match FileEntry::from_bytes(&block[offset..offset + ENTRY_LENGTH]) {
				Ok(Some(entry)) => SlotState::Used(entry),
				Ok(None) => SlotState::Free,
				Err(e) => {
					diagnostics.warn(KIND, format!("block {} entry {}: {}", block_index, slot, e));
					SlotState::Damaged
				}
			};
			slots.push(Slot {
				block: block_index,
				offset,
				state,
			});
		}
		first = false;

		let next = usize::from(u16_at(&block, 2));
		if next == 0 {
			break;
		}
		if chain_length >= max_chain_length {
			diagnostics.warn(KIND, format!("directory chain longer than {} blocks, stopping", max_chain_length));
			break;
		}
		let Some(next_block) = addressing.read_block(buffer, next) else {
			diagnostics.warn(KIND, format!("directory link to block {} is out of range", next));
			break;
		};
		block_index = next;
		block = next_block;
	}

	Ok(DirectoryScan {
		header,
		slots,
	})
}

/// Reads one fork given its storage type, key block and EOF
///
/// Zero pointers in index blocks are sparse holes and read back as zeros.
pub(super) fn read_fork(
	buffer: &[u8],
	addressing: Addressing,
	storage: StorageType,
	key_block: usize,
	eof: usize,
) -> Result<Vec<u8>, A2FileError> {
	let data_or_hole = |pointer: usize| -> Result<Block, A2FileError> {
		if pointer == 0 {
			Ok([0u8; BLOCK_SIZE])
		} else {
			read_required(buffer, addressing, pointer)
		}
	};

	let blocks_needed = eof.div_ceil(BLOCK_SIZE);
	let mut data = Vec::with_capacity((blocks_needed * BLOCK_SIZE).min(buffer.len()));

	match storage {
		StorageType::Seedling => {
			if blocks_needed > 0 {
				data.extend_from_slice(&data_or_hole(key_block)?);
			}
		}
		StorageType::Sapling => {
			let index = read_required(buffer, addressing, key_block)?;
			for slot in 0..blocks_needed.min(POINTERS_PER_INDEX) {
				data.extend_from_slice(&data_or_hole(index_pointer(&index, slot))?);
			}
		}
		StorageType::Tree => {
			let master = read_required(buffer, addressing, key_block)?;
			let index_count = blocks_needed.div_ceil(POINTERS_PER_INDEX).min(MASTER_INDEX_SLOTS);
			for master_slot in 0..index_count {
				let index = data_or_hole(index_pointer(&master, master_slot))?;
				let remaining = blocks_needed - master_slot * POINTERS_PER_INDEX;
				for slot in 0..remaining.min(POINTERS_PER_INDEX) {
					data.extend_from_slice(&data_or_hole(index_pointer(&index, slot))?);
				}
			}
		}
		other => {
			return Err(A2FileError::NotSupported {
				kind: KIND,
				message: format!("cannot read storage type {:?}", other),
			});
		}
	}

	data.resize(eof, 0);
	Ok(data)
}

/// Reads the data and resource forks of an extended file
pub(super) fn read_extended(
	buffer: &[u8],
	addressing: Addressing,
	key_block: usize,
) -> Result<(Vec<u8>, Vec<u8>), A2FileError> {
	let key = read_required(buffer, addressing, key_block)?;
	let fork = |offset: usize| {
		let storage = StorageType::from(key[offset] & 0x0F);
		let fork_key = usize::from(u16_at(&key, offset + 1));
		let eof = u24_at(&key, offset + 5) as usize;
		read_fork(buffer, addressing, storage, fork_key, eof)
	};
	Ok((fork(0)?, fork(0x100)?))
}

/// Recursive tree builder
struct Walker<'a> {
	buffer: &'a [u8],
	addressing: Addressing,
	options: &'a ReadOptions,
	visited: HashSet<usize>,
	diagnostics: Diagnostics,
}

impl Walker<'_> {
	fn read_directory(&mut self, key_block: usize, depth: usize) -> Vec<CatalogEntry> {
		let scan = match scan_directory(
			self.buffer,
			self.addressing,
			key_block,
			self.options.max_chain_length,
			&mut self.visited,
			&mut self.diagnostics,
		) {
			Ok(scan) => scan,
			Err(e) => {
				self.diagnostics.warn(KIND, format!("directory at block {}: {}", key_block, e));
				return Vec::new();
			}
		};

		let mut entries = Vec::new();
		for (_, entry) in scan.entries() {
			if let Some(catalog_entry) = self.convert(entry, depth) {
				entries.push(catalog_entry);
			}
		}
		entries
	}

	fn convert(&mut self, entry: &FileEntry, depth: usize) -> Option<CatalogEntry> {
		let key_block = usize::from(entry.key_pointer);
		let contents = match entry.storage_type {
			StorageType::Subdirectory => {
				let children = if depth + 1 >= self.options.max_directory_depth {
					self.diagnostics.warn(
						KIND,
						format!("'{}' exceeds the maximum directory depth, not descending", entry.name),
					);
					Vec::new()
				} else {
					self.read_directory(key_block, depth + 1)
				};
				EntryContents::Directory {
					children,
				}
			}
			StorageType::Extended => match read_extended(self.buffer, self.addressing, key_block) {
				Ok((data, resource)) => EntryContents::File {
					data,
					resource_fork: Some(resource),
				},
				Err(e) => {
					self.diagnostics.warn(KIND, format!("skipping '{}': {}", entry.name, e));
					return None;
				}
			},
			storage => match read_fork(self.buffer, self.addressing, storage, key_block, entry.eof as usize) {
				Ok(data) => EntryContents::File {
					data,
					resource_fork: None,
				},
				Err(e) => {
					self.diagnostics.warn(KIND, format!("skipping '{}': {}", entry.name, e));
					return None;
				}
			},
		};

		let size = match &contents {
			EntryContents::File {
				data,
				..
			} => data.len(),
			EntryContents::Directory {
				..
			} => entry.eof as usize,
		};

		Some(CatalogEntry {
			name: entry.name.clone(),
			file_type: entry.file_type,
			aux_type: entry.aux_type,
			size,
			blocks_used: usize::from(entry.blocks_used),
			key_block,
			storage_type: u8::from(entry.storage_type),
			locked: entry.access & 0x02 == 0,
			created: entry.created,
			modified: entry.modified,
			contents,
		})
	}
}

/// Parses a `ProDOS` volume with default options
pub fn read_catalog(buffer: &[u8]) -> Result<Catalog, A2FileError> {
	read_catalog_with(buffer, &ReadOptions::default())
}

/// Parses a `ProDOS` volume
pub fn read_catalog_with(buffer: &[u8], options: &ReadOptions) -> Result<Catalog, A2FileError> {
	let volume = open(buffer)?;
	log::debug!(
		"ProDOS volume '{}' at block {} ({}, {} blocks)",
		volume.header.name,
		volume.key_block,
		volume.addressing,
		volume.total_blocks
	);

	let mut walker = Walker {
		buffer,
		addressing: volume.addressing,
		options,
		visited: HashSet::new(),
		diagnostics: Diagnostics::new(),
	};
	if volume.key_block != VOLUME_DIR_BLOCK {
		walker.diagnostics.info(KIND, format!("volume directory found at block {}", volume.key_block));
	}
	let entries = walker.read_directory(volume.key_block, 0);

	Ok(Catalog {
		disk_name: volume.header.name,
		disk_format: DiskFormat::ProDos,
		disk_size: buffer.len(),
		addressing: volume.addressing,
		entries,
		diagnostics: walker.diagnostics,
	})
}

/// Reads the volume header and bitmap statistics
pub fn volume_info(buffer: &[u8]) -> Result<VolumeInfo, A2FileError> {
	let volume = open(buffer)?;
	let bitmap = VolumeBitmap::read(buffer, volume.addressing, volume.bitmap_block, volume.total_blocks)?;
	Ok(VolumeInfo {
		name: volume.header.name,
		addressing: volume.addressing,
		key_block: volume.key_block,
		bitmap_block: volume.bitmap_block,
		total_blocks: volume.total_blocks,
		free_blocks: bitmap.free_count(),
		file_count: usize::from(volume.header.file_count),
		created: volume.header.created,
	})
}
