//! Block and sector addressing over a fully buffered disk image.
//!
//! Apple II 5.25" images come in two physical orders:
//!
//! - **Linear** (`ProDOS` order, `.po`/`.hdv`): block `n` occupies bytes `n * 512 .. n * 512 + 512`.
//! - **Interleaved** (DOS order, `.do`/`.dsk`): the image is a sequence of 256-byte DOS 3.3
//!   logical sectors, 16 per track. A 512-byte block is assembled from two sectors of its
//!   track through the fixed pairing table below.
//!
//! The same table serves the opposite direction: DOS 3.3 sectors can be located inside a
//! linear image, so every filesystem driver reads through one [`Addressing`] value chosen at
//! detection time.
//!
//! Readers return `None` for anything out of range so higher layers can degrade gracefully
//! on truncated images.

use serde::Serialize;

use super::error::A2FileError;

/// Size of a block in bytes
pub const BLOCK_SIZE: usize = 512;

/// Size of a DOS 3.3 sector in bytes
pub const SECTOR_SIZE: usize = 256;

/// Sectors per track on a 16-sector 5.25" disk
pub const SECTORS_PER_TRACK: usize = 16;

/// Blocks per track on a 16-sector 5.25" disk
pub const BLOCKS_PER_TRACK: usize = SECTORS_PER_TRACK * SECTOR_SIZE / BLOCK_SIZE;

/// Size of a 35-track, 16-sector 5.25" floppy image
pub const FLOPPY_140K: usize = 35 * SECTORS_PER_TRACK * SECTOR_SIZE;

/// DOS 3.3 logical sectors holding the first and second half of each block in a track
const BLOCK_SECTOR_PAIRS: [[usize; 2]; BLOCKS_PER_TRACK] = [
	[0x0, 0xE],
	[0xD, 0xC],
	[0xB, 0xA],
	[0x9, 0x8],
	[0x7, 0x6],
	[0x5, 0x4],
	[0x3, 0x2],
	[0x1, 0xF],
];

/// A single block
pub type Block = [u8; BLOCK_SIZE];

/// A single sector
pub type Sector = [u8; SECTOR_SIZE];

/// Physical layout of an image, fixed for a volume once detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Addressing {
	/// `ProDOS` block order
	Linear,
	/// DOS 3.3 sector order
	Interleaved,
}

impl Addressing {
	/// Returns the byte offsets of the two 256-byte halves of a block
	fn block_halves(self, index: usize) -> [usize; 2] {
		match self {
			Addressing::Linear => {
				let start = index * BLOCK_SIZE;
				[start, start + SECTOR_SIZE]
			}
			Addressing::Interleaved => {
				let track = index / BLOCKS_PER_TRACK;
				let [first, second] = BLOCK_SECTOR_PAIRS[index % BLOCKS_PER_TRACK];
				let track_start = track * SECTORS_PER_TRACK;
				[(track_start + first) * SECTOR_SIZE, (track_start + second) * SECTOR_SIZE]
			}
		}
	}

	/// Returns the byte offset of a DOS 3.3 sector
	fn sector_offset(self, track: usize, sector: usize) -> usize {
		match self {
			Addressing::Interleaved => (track * SECTORS_PER_TRACK + sector) * SECTOR_SIZE,
			Addressing::Linear => {
				let (slot, half) = BLOCK_SECTOR_PAIRS
					.iter()
					.enumerate()
					.find_map(|(slot, pair)| pair.iter().position(|&s| s == sector).map(|h| (slot, h)))
					.unwrap_or((0, 0));
				(track * BLOCKS_PER_TRACK + slot) * BLOCK_SIZE + half * SECTOR_SIZE
			}
		}
	}

	/// Returns the number of whole blocks in an image of `len` bytes
	pub fn block_count(len: usize) -> usize {
		len / BLOCK_SIZE
	}

	/// Reads block `index`, or `None` if any part of it lies outside the buffer
	pub fn read_block(self, buffer: &[u8], index: usize) -> Option<Block> {
		if index >= Self::block_count(buffer.len()) {
			return None;
		}

		let mut block = [0u8; BLOCK_SIZE];
		for (half, offset) in self.block_halves(index).into_iter().enumerate() {
			let source = buffer.get(offset..offset + SECTOR_SIZE)?;
			block[half * SECTOR_SIZE..(half + 1) * SECTOR_SIZE].copy_from_slice(source);
		}
		Some(block)
	}

	/// Writes block `index`
	pub fn write_block(self, buffer: &mut [u8], index: usize, block: &Block) -> Result<(), A2FileError> {
		let total = Self::block_count(buffer.len());
		if index >= total {
			return Err(A2FileError::BlockOutOfRange {
				index,
				total,
			});
		}

		for (half, offset) in self.block_halves(index).into_iter().enumerate() {
			let target = buffer.get_mut(offset..offset + SECTOR_SIZE).ok_or(
				A2FileError::BlockOutOfRange {
					index,
					total,
				},
			)?;
			target.copy_from_slice(&block[half * SECTOR_SIZE..(half + 1) * SECTOR_SIZE]);
		}
		Ok(())
	}

	/// Reads DOS 3.3 sector `sector` of `track`, or `None` if out of range
	pub fn read_sector(self, buffer: &[u8], track: usize, sector: usize) -> Option<Sector> {
		if sector >= SECTORS_PER_TRACK {
			return None;
		}
		let offset = self.sector_offset(track, sector);
		let source = buffer.get(offset..offset + SECTOR_SIZE)?;
		let mut data = [0u8; SECTOR_SIZE];
		data.copy_from_slice(source);
		Some(data)
	}
}

impl std::fmt::Display for Addressing {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Addressing::Linear => write!(f, "ProDOS order"),
			Addressing::Interleaved => write!(f, "DOS order"),
		}
	}
}

/// Reads block `index` of `buffer` under the given addressing
pub fn read_block(buffer: &[u8], addressing: Addressing, index: usize) -> Option<Block> {
	addressing.read_block(buffer, index)
}
