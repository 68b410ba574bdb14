//! In-place `ProDOS` volume mutation.
//!
//! Every operation checks all of its preconditions (name rules, target
//! directory, free slot, free blocks) before the first byte of the buffer is
//! touched, so a failed call leaves the image unchanged.

use std::collections::HashSet;

use crate::file::{
	A2FileError, Addressing, BLOCK_SIZE, Block, Diagnostics, FormatKind, ReadOptions, WriteOptions,
	bytes::{put_u16, u16_at},
};

use super::{
	DirectoryHeader, FileEntry, HeaderKind, StorageType, VolumeBitmap,
	constants::*,
	index_pointer, normalize_name,
	reader::{DirectoryScan, SlotState, Volume, open, read_required, scan_directory},
	set_index_pointer, write_name,
};

const KIND: FormatKind = FormatKind::ProDos;

/// Offset of the file count field within a directory key block
const FILE_COUNT_OFFSET: usize = DIR_BLOCK_HEADER + 0x21;

/// `BIN` file type, used when no type is given
const FILE_TYPE_BINARY: u8 = 0x06;

/// A file to add to a volume
#[derive(Debug, Clone, Copy)]
pub struct NewFile<'a> {
	/// File name, validated against `ProDOS` rules and stored upper-case
	pub name: &'a str,
	/// File type byte
	pub file_type: u8,
	/// Auxiliary type
	pub aux_type: u16,
	/// File contents
	pub data: &'a [u8],
}

impl<'a> NewFile<'a> {
	/// Creates a binary file description
	pub fn new(name: &'a str, data: &'a [u8]) -> Self {
		Self {
			name,
			file_type: FILE_TYPE_BINARY,
			aux_type: 0,
			data,
		}
	}

	/// Sets the file and auxiliary types
	pub fn with_type(mut self, file_type: u8, aux_type: u16) -> Self {
		self.file_type = file_type;
		self.aux_type = aux_type;
		self
	}
}

/// Applies `patch` to block `index`
fn patch_block(
	buffer: &mut [u8],
	addressing: Addressing,
	index: usize,
	patch: impl FnOnce(&mut Block),
) -> Result<(), A2FileError> {
	let mut block = read_required(buffer, addressing, index)?;
	patch(&mut block);
	addressing.write_block(buffer, index, &block)
}

/// Adds `delta` to the file count of the directory keyed at `key_block`
fn adjust_file_count(
	buffer: &mut [u8],
	addressing: Addressing,
	key_block: usize,
	delta: i32,
) -> Result<(), A2FileError> {
	patch_block(buffer, addressing, key_block, |block| {
		let count = i32::from(u16_at(block, FILE_COUNT_OFFSET));
		put_u16(block, FILE_COUNT_OFFSET, (count + delta).clamp(0, 0xFFFF) as u16);
	})
}

/// Splits `path` into its directory part and final component
fn split_path(path: &str) -> (&str, &str) {
	let path = path.trim_matches('/');
	path.rsplit_once('/').unwrap_or(("", path))
}

/// Walks `path` from the volume directory and scans the directory it names
fn resolve_directory(buffer: &[u8], volume: &Volume, path: &str) -> Result<(usize, DirectoryScan), A2FileError> {
	let max_chain = ReadOptions::default().max_chain_length;
	let mut visited = HashSet::new();
	let mut diagnostics = Diagnostics::new();

	let mut key = volume.key_block;
	let mut scan = scan_directory(buffer, volume.addressing, key, max_chain, &mut visited, &mut diagnostics)?;
	for component in path.split('/').filter(|c| !c.is_empty()) {
		let (_, entry) = scan
			.find(component)
			.ok_or_else(|| A2FileError::not_found(KIND, format!("directory '{}' in '{}'", component, path)))?;
		if !entry.is_directory() {
			return Err(A2FileError::not_found(KIND, format!("'{}' is not a directory", component)));
		}
		key = usize::from(entry.key_pointer);
		scan = scan_directory(buffer, volume.addressing, key, max_chain, &mut visited, &mut diagnostics)?;
	}
	Ok((key, scan))
}

/// Returns the first free slot of a scanned directory
fn free_slot(scan: &DirectoryScan, directory: &str) -> Result<(usize, usize), A2FileError> {
	scan.slots
		.iter()
		.find(|slot| matches!(slot.state, SlotState::Free))
		.map(|slot| (slot.block, slot.offset))
		.ok_or_else(|| A2FileError::DirectoryFull {
			kind: KIND,
			directory: if directory.is_empty() {
				"/".to_string()
			} else {
				directory.to_string()
			},
		})
}

fn ensure_unique(scan: &DirectoryScan, name: &str) -> Result<(), A2FileError> {
	match scan.find(name) {
		Some(_) => Err(A2FileError::DuplicateName {
			kind: KIND,
			name: name.to_string(),
		}),
		None => Ok(()),
	}
}

/// Formats a blank volume of `total_blocks` blocks in `ProDOS` order
pub fn create_volume(total_blocks: usize, name: &str, options: &WriteOptions) -> Result<Vec<u8>, A2FileError> {
	let name = normalize_name(name)?;
	let bitmap_blocks = VolumeBitmap::blocks_for(total_blocks);
	let reserved = BITMAP_BLOCK + bitmap_blocks;
	if total_blocks <= reserved || total_blocks > MAX_BLOCKS {
		return Err(A2FileError::structural(
			KIND,
			format!("volume size of {} blocks is out of range ({}..={})", total_blocks, reserved + 1, MAX_BLOCKS),
		));
	}

	let addressing = Addressing::Linear;
	let mut buffer = vec![0u8; total_blocks * BLOCK_SIZE];

	let first = VOLUME_DIR_BLOCK;
	let last = VOLUME_DIR_BLOCK + VOLUME_DIR_BLOCKS - 1;
	for index in first..=last {
		let mut block = [0u8; BLOCK_SIZE];
		put_u16(&mut block, 0, if index == first { 0 } else { index as u16 - 1 });
		put_u16(&mut block, 2, if index == last { 0 } else { index as u16 + 1 });
		addressing.write_block(&mut buffer, index, &block)?;
	}

	let header = DirectoryHeader {
		name,
		created: Some(options.timestamp()),
		access: ACCESS_DEFAULT,
		entry_length: ENTRY_LENGTH as u8,
		entries_per_block: ENTRIES_PER_BLOCK as u8,
		file_count: 0,
		kind: HeaderKind::Volume {
			bitmap_pointer: BITMAP_BLOCK as u16,
			total_blocks: total_blocks as u16,
		},
	};
	patch_block(&mut buffer, addressing, first, |block| {
		block[DIR_BLOCK_HEADER..DIR_BLOCK_HEADER + ENTRY_LENGTH].copy_from_slice(&header.to_bytes());
	})?;

	VolumeBitmap::formatted(BITMAP_BLOCK, total_blocks, reserved).write(&mut buffer, addressing)?;

	log::debug!("Formatted ProDOS volume '{}' with {} blocks", header.name, total_blocks);
	Ok(buffer)
}

/// Block layout chosen for a new file
struct Allocation {
	storage: StorageType,
	key_block: usize,
	index_blocks: Vec<usize>,
	data_blocks: Vec<usize>,
}

impl Allocation {
	/// Number of blocks (data and index) needed to store `size` bytes
	fn blocks_needed(size: usize) -> (StorageType, usize, usize) {
		let data = size.div_ceil(BLOCK_SIZE).max(1);
		let storage = StorageType::for_blocks(data);
		let index = match storage {
			StorageType::Sapling => 1,
			StorageType::Tree => 1 + data.div_ceil(POINTERS_PER_INDEX),
			_ => 0,
		};
		(storage, data, index)
	}

	fn assign(storage: StorageType, data_count: usize, blocks: Vec<usize>) -> Self {
		let index_count = blocks.len() - data_count;
		let (index_blocks, data_blocks) = blocks.split_at(index_count);
		Self {
			storage,
			key_block: index_blocks.first().or(data_blocks.first()).copied().unwrap_or_default(),
			index_blocks: index_blocks.to_vec(),
			data_blocks: data_blocks.to_vec(),
		}
	}

	/// Writes payload and index blocks
	fn write(&self, buffer: &mut [u8], addressing: Addressing, data: &[u8]) -> Result<(), A2FileError> {
		for (i, &target) in self.data_blocks.iter().enumerate() {
			let mut block = [0u8; BLOCK_SIZE];
			let start = (i * BLOCK_SIZE).min(data.len());
			let end = (start + BLOCK_SIZE).min(data.len());
			block[..end - start].copy_from_slice(&data[start..end]);
			addressing.write_block(buffer, target, &block)?;
		}

		match self.storage {
			StorageType::Sapling => {
				let mut index = [0u8; BLOCK_SIZE];
				for (slot, &target) in self.data_blocks.iter().enumerate() {
					set_index_pointer(&mut index, slot, target);
				}
				addressing.write_block(buffer, self.key_block, &index)?;
			}
			StorageType::Tree => {
				let mut master = [0u8; BLOCK_SIZE];
				let sub_indexes = &self.index_blocks[1..];
				for (master_slot, (&index_block, chunk)) in
					sub_indexes.iter().zip(self.data_blocks.chunks(POINTERS_PER_INDEX)).enumerate()
				{
					set_index_pointer(&mut master, master_slot, index_block);
					let mut index = [0u8; BLOCK_SIZE];
					for (slot, &target) in chunk.iter().enumerate() {
						set_index_pointer(&mut index, slot, target);
					}
					addressing.write_block(buffer, index_block, &index)?;
				}
				addressing.write_block(buffer, self.key_block, &master)?;
			}
			_ => {}
		}
		Ok(())
	}
}

/// Adds a file to the directory at `directory` (`""` or `"/"` for the root)
pub fn add_file(
	buffer: &mut [u8],
	directory: &str,
	file: &NewFile<'_>,
	options: &WriteOptions,
) -> Result<(), A2FileError> {
	let name = normalize_name(file.name)?;
	if file.data.len() > MAX_EOF {
		return Err(A2FileError::FileTooLarge {
			kind: KIND,
			size: file.data.len(),
			max: MAX_EOF,
		});
	}

	let volume = open(buffer)?;
	let (dir_key, scan) = resolve_directory(buffer, &volume, directory)?;
	ensure_unique(&scan, &name)?;
	let (slot_block, slot_offset) = free_slot(&scan, directory)?;

	let (storage, data_count, index_count) = Allocation::blocks_needed(file.data.len());
	let mut bitmap = VolumeBitmap::read(buffer, volume.addressing, volume.bitmap_block, volume.total_blocks)?;
	let blocks = bitmap.find_free(data_count + index_count, bitmap.data_start())?;

	// Nothing has been written up to this point
	let allocation = Allocation::assign(storage, data_count, blocks);
	allocation.write(buffer, volume.addressing, file.data)?;
	for &block in allocation.index_blocks.iter().chain(&allocation.data_blocks) {
		bitmap.mark_used(block);
	}
	bitmap.write(buffer, volume.addressing)?;

	let timestamp = options.timestamp();
	let entry = FileEntry {
		storage_type: allocation.storage,
		name,
		file_type: file.file_type,
		key_pointer: allocation.key_block as u16,
		blocks_used: (data_count + index_count) as u16,
		eof: file.data.len() as u32,
		created: Some(timestamp),
		version: 0,
		min_version: 0,
		access: ACCESS_NEW_FILE,
		aux_type: file.aux_type,
		modified: Some(timestamp),
		header_pointer: dir_key as u16,
	};
	patch_block(buffer, volume.addressing, slot_block, |block| {
		block[slot_offset..slot_offset + ENTRY_LENGTH].copy_from_slice(&entry.to_bytes());
	})?;
	adjust_file_count(buffer, volume.addressing, dir_key, 1)?;

	log::debug!(
		"Added '{}' ({} bytes, {:?}, key block {})",
		entry.name,
		entry.eof,
		entry.storage_type,
		entry.key_pointer
	);
	Ok(())
}

/// Creates an empty one-block subdirectory inside `parent`
pub fn create_directory(
	buffer: &mut [u8],
	parent: &str,
	name: &str,
	options: &WriteOptions,
) -> Result<(), A2FileError> {
	let name = normalize_name(name)?;
	let volume = open(buffer)?;
	let (parent_key, scan) = resolve_directory(buffer, &volume, parent)?;
	ensure_unique(&scan, &name)?;
	let (slot_block, slot_offset) = free_slot(&scan, parent)?;

	let mut bitmap = VolumeBitmap::read(buffer, volume.addressing, volume.bitmap_block, volume.total_blocks)?;
	let key_block = bitmap.find_free(1, bitmap.data_start())?[0];

	let timestamp = options.timestamp();
	let header = DirectoryHeader {
		name: name.clone(),
		created: Some(timestamp),
		access: ACCESS_DEFAULT,
		entry_length: ENTRY_LENGTH as u8,
		entries_per_block: ENTRIES_PER_BLOCK as u8,
		file_count: 0,
		kind: HeaderKind::Subdirectory {
			parent_pointer: slot_block as u16,
			parent_entry_number: ((slot_offset - DIR_BLOCK_HEADER) / ENTRY_LENGTH + 1) as u8,
			parent_entry_length: ENTRY_LENGTH as u8,
		},
	};
	let mut key = [0u8; BLOCK_SIZE];
	key[DIR_BLOCK_HEADER..DIR_BLOCK_HEADER + ENTRY_LENGTH].copy_from_slice(&header.to_bytes());
	volume.addressing.write_block(buffer, key_block, &key)?;

	bitmap.mark_used(key_block);
	bitmap.write(buffer, volume.addressing)?;

	let entry = FileEntry {
		storage_type: StorageType::Subdirectory,
		name,
		file_type: FILE_TYPE_DIRECTORY,
		key_pointer: key_block as u16,
		blocks_used: 1,
		eof: BLOCK_SIZE as u32,
		created: Some(timestamp),
		version: 0,
		min_version: 0,
		access: ACCESS_DEFAULT,
		aux_type: 0,
		modified: Some(timestamp),
		header_pointer: parent_key as u16,
	};
	patch_block(buffer, volume.addressing, slot_block, |block| {
		block[slot_offset..slot_offset + ENTRY_LENGTH].copy_from_slice(&entry.to_bytes());
	})?;
	adjust_file_count(buffer, volume.addressing, parent_key, 1)
}

/// Collects every block (index blocks included) owned by a fork
fn fork_blocks(
	buffer: &[u8],
	addressing: Addressing,
	storage: StorageType,
	key_block: usize,
	blocks: &mut Vec<usize>,
) -> Result<(), A2FileError> {
	if key_block == 0 {
		return Ok(());
	}
	blocks.push(key_block);

	let index_targets = |index: &Block, slots: usize| -> Vec<usize> {
		(0..slots).map(|slot| index_pointer(index, slot)).filter(|&b| b != 0).collect()
	};

	match storage {
		StorageType::Seedling => {}
		StorageType::Sapling => {
			let index = read_required(buffer, addressing, key_block)?;
			blocks.extend(index_targets(&index, POINTERS_PER_INDEX));
		}
		StorageType::Tree => {
			let master = read_required(buffer, addressing, key_block)?;
			for index_block in index_targets(&master, MASTER_INDEX_SLOTS) {
				let index = read_required(buffer, addressing, index_block)?;
				blocks.push(index_block);
				blocks.extend(index_targets(&index, POINTERS_PER_INDEX));
			}
		}
		StorageType::Extended => {
			let key = read_required(buffer, addressing, key_block)?;
			for offset in [0, 0x100] {
				let fork_storage = StorageType::from(key[offset] & 0x0F);
				let fork_key = usize::from(u16_at(&key, offset + 1));
				fork_blocks(buffer, addressing, fork_storage, fork_key, blocks)?;
			}
		}
		other => {
			return Err(A2FileError::NotSupported {
				kind: KIND,
				message: format!("cannot free storage type {:?}", other),
			});
		}
	}
	Ok(())
}

/// Deletes the file at `path` and returns its blocks to the bitmap
pub fn delete_file(buffer: &mut [u8], path: &str) -> Result<(), A2FileError> {
	let (directory, name) = split_path(path);
	let volume = open(buffer)?;
	let (dir_key, scan) = resolve_directory(buffer, &volume, directory)?;
	let (slot, entry) = scan.find(name).ok_or_else(|| A2FileError::not_found(KIND, path.to_string()))?;
	if entry.is_directory() {
		return Err(A2FileError::NotSupported {
			kind: KIND,
			message: format!("'{}' is a directory", entry.name),
		});
	}

	let mut blocks = Vec::new();
	fork_blocks(buffer, volume.addressing, entry.storage_type, usize::from(entry.key_pointer), &mut blocks)?;
	if let Some(&bad) = blocks.iter().find(|&&b| b >= volume.total_blocks) {
		return Err(A2FileError::structural(
			KIND,
			format!("'{}' references block {} beyond the volume", entry.name, bad),
		));
	}
	let mut bitmap = VolumeBitmap::read(buffer, volume.addressing, volume.bitmap_block, volume.total_blocks)?;

	for &block in &blocks {
		bitmap.mark_free(block);
	}
	bitmap.write(buffer, volume.addressing)?;

	let (slot_block, slot_offset) = (slot.block, slot.offset);
	patch_block(buffer, volume.addressing, slot_block, |block| block[slot_offset] = 0)?;
	adjust_file_count(buffer, volume.addressing, dir_key, -1)?;

	log::debug!("Deleted '{}', freed {} blocks", path, blocks.len());
	Ok(())
}

/// Renames the file or directory at `path`
pub fn rename(buffer: &mut [u8], path: &str, new_name: &str) -> Result<(), A2FileError> {
	let new_name = normalize_name(new_name)?;
	let (directory, name) = split_path(path);
	let volume = open(buffer)?;
	let (_, scan) = resolve_directory(buffer, &volume, directory)?;
	let (slot, entry) = scan.find(name).ok_or_else(|| A2FileError::not_found(KIND, path.to_string()))?;
	if let Some((other, _)) = scan.find(&new_name)
		&& (other.block, other.offset) != (slot.block, slot.offset)
	{
		return Err(A2FileError::DuplicateName {
			kind: KIND,
			name: new_name,
		});
	}

	let subdirectory_key = entry.is_directory().then_some(usize::from(entry.key_pointer));
	if let Some(key) = subdirectory_key {
		let block = read_required(buffer, volume.addressing, key)?;
		if StorageType::from(block[DIR_BLOCK_HEADER] >> 4) != StorageType::SubdirectoryHeader {
			return Err(A2FileError::structural(
				KIND,
				format!("'{}' does not point at a subdirectory header", entry.name),
			));
		}
	}

	let (storage, slot_block, slot_offset) = (entry.storage_type, slot.block, slot.offset);
	patch_block(buffer, volume.addressing, slot_block, |block| {
		write_name(&mut block[slot_offset..slot_offset + ENTRY_LENGTH], storage, &new_name);
	})?;
	if let Some(key) = subdirectory_key {
		patch_block(buffer, volume.addressing, key, |block| {
			write_name(&mut block[DIR_BLOCK_HEADER..], StorageType::SubdirectoryHeader, &new_name);
		})?;
	}
	Ok(())
}
