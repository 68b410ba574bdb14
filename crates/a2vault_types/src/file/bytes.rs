//! Little-endian field helpers for fixed-layout records.
//!
//! Callers index records whose length has already been checked, so these
//! helpers slice directly.

pub(crate) fn u16_at(data: &[u8], offset: usize) -> u16 {
	u16::from_le_bytes([data[offset], data[offset + 1]])
}

pub(crate) fn u24_at(data: &[u8], offset: usize) -> u32 {
	u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], 0])
}

pub(crate) fn u32_at(data: &[u8], offset: usize) -> u32 {
	u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

pub(crate) fn put_u16(data: &mut [u8], offset: usize, value: u16) {
	data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u24(data: &mut [u8], offset: usize, value: u32) {
	data[offset..offset + 3].copy_from_slice(&value.to_le_bytes()[..3]);
}

pub(crate) fn put_u32(data: &mut [u8], offset: usize, value: u32) {
	data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
