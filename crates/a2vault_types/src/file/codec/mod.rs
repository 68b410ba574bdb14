//! Compression codecs and checksums used by `NuFX` archives.
//!
//! - [`crc`]: CRC-16/XMODEM
//! - [`rle`]: the `ShrinkIt` run-length layer
//! - [`lzw`]: LZW/1 and LZW/2, both layered on top of [`rle`]
//! - [`squeeze`]: static Huffman with its own 0x90 run-length layer

pub mod crc;
pub mod lzw;
pub mod rle;
pub mod squeeze;

pub use crc::{CrcCheck, crc16, crc16_xmodem};
pub use lzw::{CHUNK_SIZE, compress_lzw1, compress_lzw2, expand_lzw1, expand_lzw2};
pub use rle::{compress_rle, expand_rle};
pub use squeeze::expand_squeeze;

/// Largest output-to-input ratio reserved up front when expanding
const MAX_RESERVED_EXPANSION: usize = 8;

/// Output capacity to reserve for `input_len` bytes declared to expand to `expected_len`
///
/// Never more than a small multiple of the input; the output grows past it when
/// the data really expands further.
pub(crate) fn reserved_capacity(expected_len: usize, input_len: usize) -> usize {
	expected_len.min(input_len.saturating_mul(MAX_RESERVED_EXPANSION))
}
