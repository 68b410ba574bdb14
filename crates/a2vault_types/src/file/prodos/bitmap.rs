//! Volume bitmap: one bit per block, MSB first within each byte, 1 = free.

use crate::file::{A2FileError, Addressing, BLOCK_SIZE, FormatKind};

use super::constants::BLOCKS_PER_BITMAP_BLOCK;

/// In-memory copy of a volume bitmap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeBitmap {
	first_block: usize,
	total_blocks: usize,
	bits: Vec<u8>,
}

impl VolumeBitmap {
	/// Number of bitmap blocks needed for a volume
	pub fn blocks_for(total_blocks: usize) -> usize {
		total_blocks.div_ceil(BLOCKS_PER_BITMAP_BLOCK)
	}

	/// Creates a bitmap with every block free except blocks `0..reserved`
	pub fn formatted(first_block: usize, total_blocks: usize, reserved: usize) -> Self {
		let mut bitmap = Self {
			first_block,
			total_blocks,
			bits: vec![0; Self::blocks_for(total_blocks) * BLOCK_SIZE],
		};
		for block in reserved..total_blocks {
			bitmap.mark_free(block);
		}
		bitmap
	}

	/// Loads the bitmap starting at `first_block`
	pub fn read(
		buffer: &[u8],
		addressing: Addressing,
		first_block: usize,
		total_blocks: usize,
	) -> Result<Self, A2FileError> {
		let count = Self::blocks_for(total_blocks);
		let mut bits = Vec::with_capacity(count * BLOCK_SIZE);
		for block in first_block..first_block + count {
			let data = addressing.read_block(buffer, block).ok_or(A2FileError::BlockOutOfRange {
				index: block,
				total: Addressing::block_count(buffer.len()),
			})?;
			bits.extend_from_slice(&data);
		}
		Ok(Self {
			first_block,
			total_blocks,
			bits,
		})
	}

	/// Stores the bitmap back into the image
	pub fn write(&self, buffer: &mut [u8], addressing: Addressing) -> Result<(), A2FileError> {
		for (i, chunk) in self.bits.chunks_exact(BLOCK_SIZE).enumerate() {
			let mut block = [0u8; BLOCK_SIZE];
			block.copy_from_slice(chunk);
			addressing.write_block(buffer, self.first_block + i, &block)?;
		}
		Ok(())
	}

	/// First bitmap block
	pub fn first_block(&self) -> usize {
		self.first_block
	}

	/// First block after the bitmap, where allocation searches begin
	pub fn data_start(&self) -> usize {
		self.first_block + Self::blocks_for(self.total_blocks)
	}

	/// Number of blocks tracked
	pub fn total_blocks(&self) -> usize {
		self.total_blocks
	}

	/// Returns `true` if `block` is free
	pub fn is_free(&self, block: usize) -> bool {
		block < self.total_blocks && self.bits[block / 8] & (0x80 >> (block % 8)) != 0
	}

	/// Marks `block` as in use
	pub fn mark_used(&mut self, block: usize) {
		if block < self.total_blocks {
			self.bits[block / 8] &= !(0x80 >> (block % 8));
		}
	}

	/// Marks `block` as free
	pub fn mark_free(&mut self, block: usize) {
		if block < self.total_blocks {
			self.bits[block / 8] |= 0x80 >> (block % 8);
		}
	}

	/// Number of free blocks
	pub fn free_count(&self) -> usize {
		(0..self.total_blocks).filter(|&b| self.is_free(b)).count()
	}

	/// Finds `count` free blocks at or after `start` without claiming them
	pub fn find_free(&self, count: usize, start: usize) -> Result<Vec<usize>, A2FileError> {
		let found: Vec<usize> = (start..self.total_blocks).filter(|&b| self.is_free(b)).take(count).collect();
		if found.len() < count {
			return Err(A2FileError::DiskFull {
				kind: FormatKind::ProDos,
				blocks_needed: count,
				blocks_available: found.len(),
			});
		}
		Ok(found)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_bit_order() {
		let mut bitmap = VolumeBitmap::formatted(6, 280, 0);
		assert_eq!(bitmap.bits[0], 0xFF);
		bitmap.mark_used(0);
		bitmap.mark_used(7);
		assert_eq!(bitmap.bits[0], 0x7E);
		assert!(!bitmap.is_free(0));
		assert!(bitmap.is_free(1));
	}

	#[test]
	fn test_formatted_reserves_system_blocks() {
		let bitmap = VolumeBitmap::formatted(6, 280, 7);
		assert_eq!(bitmap.free_count(), 273);
		assert!(!bitmap.is_free(6));
		assert!(bitmap.is_free(7));
		// Bits past the end of the volume stay clear
		assert!(!bitmap.is_free(280));
		assert_eq!(bitmap.bits[35], 0);
		assert_eq!(bitmap.data_start(), 7);
	}

	#[test]
	fn test_find_free_does_not_claim() {
		let mut bitmap = VolumeBitmap::formatted(6, 64, 7);
		bitmap.mark_used(8);
		let found = bitmap.find_free(3, 7).unwrap();
		assert_eq!(found, [7, 9, 10]);
		assert!(bitmap.is_free(7));

		let err = bitmap.find_free(100, 7).unwrap_err();
		assert!(matches!(
			err,
			A2FileError::DiskFull {
				blocks_needed: 100,
				blocks_available: 56,
				..
			}
		));
	}
}
