//! `ShrinkIt` LZW/1 and LZW/2.
//!
//! ## Stream layout
//!
//! Both formats cut the input into 4096-byte chunks (the last one zero padded),
//! run each chunk through the RLE layer and then through LZW.
//!
//! LZW/1 thread:
//!
//! | Size | Field                                                    |
//! |------|----------------------------------------------------------|
//! | 2    | CRC-16 (seed 0) over every padded 4096-byte chunk        |
//! | 1    | Disk volume number                                       |
//! | 1    | RLE delimiter                                            |
//! | ...  | Chunks: `rle_len` (2), LZW flag (1), data                |
//!
//! LZW/2 thread:
//!
//! | Size | Field                                                    |
//! |------|----------------------------------------------------------|
//! | 1    | Disk volume number                                       |
//! | 1    | RLE delimiter                                            |
//! | ...  | Chunks: `rle_len` (2, bit 15 = LZW), [`lzw_len` (2)], data |
//!
//! `rle_len` is the chunk size after RLE; a value of 4096 means RLE was not
//! applied. `lzw_len` counts the 4-byte chunk header as well as the LZW data.
//!
//! ## Dictionary
//!
//! Codes are packed LSB-first, 9 to 12 bits wide. Code 0x100 clears the table
//! and 0x101 is the first assignable code. The width grows as soon as the next
//! code to be assigned would not fit ("early change"); after entry 0xFFF is
//! assigned the encoder emits a clear code. LZW/1 starts every chunk with a
//! fresh table. LZW/2 carries the table (and the last code of the previous
//! chunk) into the next chunk; a chunk stored without LZW resets it.

use std::collections::HashMap;

use crate::file::{A2FileError, FormatKind};

use super::{
	crc::{CrcCheck, crc16},
	reserved_capacity,
	rle::{compress_rle, expand_rle},
};

/// Size of one uncompressed chunk
pub const CHUNK_SIZE: usize = 4096;

/// RLE delimiter written by the compressors
pub const DEFAULT_RLE_DELIMITER: u8 = 0xDB;

/// Table clear code
const CLEAR_CODE: u16 = 0x100;

/// First code assigned to a multi-byte string
const FIRST_CODE: u16 = 0x101;

/// Number of dictionary slots
const TABLE_SIZE: usize = 0x1000;

/// Flag in the LZW/2 `rle_len` word marking an LZW-compressed chunk
const LZW2_FLAG: u16 = 0x8000;

/// Returns the width of a code given the next code number to be assigned
fn code_width(next: u16) -> u32 {
	(u16::BITS - next.leading_zeros()).clamp(9, 12)
}

/// LSB-first bit packer
struct BitWriter {
	output: Vec<u8>,
	accumulator: u32,
	bits: u32,
}

impl BitWriter {
	fn new() -> Self {
		Self {
			output: Vec::new(),
			accumulator: 0,
			bits: 0,
		}
	}

	fn write(&mut self, code: u16, width: u32) {
		self.accumulator |= u32::from(code) << self.bits;
		self.bits += width;
		while self.bits >= 8 {
			self.output.push(self.accumulator as u8);
			self.accumulator >>= 8;
			self.bits -= 8;
		}
	}

	fn finish(mut self) -> Vec<u8> {
		if self.bits > 0 {
			self.output.push(self.accumulator as u8);
		}
		self.output
	}
}

/// LSB-first bit unpacker
struct BitReader<'a> {
	data: &'a [u8],
	position: usize,
	accumulator: u32,
	bits: u32,
}

impl<'a> BitReader<'a> {
	fn new(data: &'a [u8]) -> Self {
		Self {
			data,
			position: 0,
			accumulator: 0,
			bits: 0,
		}
	}

	fn read(&mut self, width: u32) -> Option<u16> {
		while self.bits < width {
			let byte = *self.data.get(self.position)?;
			self.accumulator |= u32::from(byte) << self.bits;
			self.bits += 8;
			self.position += 1;
		}
		let code = (self.accumulator & ((1 << width) - 1)) as u16;
		self.accumulator >>= width;
		self.bits -= width;
		Some(code)
	}

	/// Number of whole bytes touched so far
	fn consumed(&self) -> usize {
		self.position
	}
}

/// Compression state; cloned to try a chunk without committing to it
#[derive(Clone)]
struct Encoder {
	dictionary: HashMap<(u16, u8), u16>,
	next_code: u16,
	/// Last code emitted by the previous chunk (LZW/2 only)
	carry: Option<u16>,
}

impl Encoder {
	fn new() -> Self {
		Self {
			dictionary: HashMap::with_capacity(TABLE_SIZE),
			next_code: FIRST_CODE,
			carry: None,
		}
	}

	fn reset(&mut self) {
		self.dictionary.clear();
		self.next_code = FIRST_CODE;
		self.carry = None;
	}

	fn add(&mut self, prefix: u16, byte: u8, writer: &mut BitWriter) {
		self.dictionary.insert((prefix, byte), self.next_code);
		self.next_code += 1;
		if usize::from(self.next_code) == TABLE_SIZE {
			writer.write(CLEAR_CODE, 12);
			self.dictionary.clear();
			self.next_code = FIRST_CODE;
		}
	}

	fn encode_chunk(&mut self, chunk: &[u8]) -> Vec<u8> {
		let mut writer = BitWriter::new();
		let Some((&first, rest)) = chunk.split_first() else {
			return Vec::new();
		};

		// The decoder assigns an entry for the previous chunk's last string when it
		// reads this chunk's first code
		if let Some(previous) = self.carry.take() {
			self.add(previous, first, &mut writer);
		}

		let mut current = u16::from(first);
		for &byte in rest {
			if let Some(&code) = self.dictionary.get(&(current, byte)) {
				current = code;
				continue;
			}
			writer.write(current, code_width(self.next_code));
			self.add(current, byte, &mut writer);
			current = u16::from(byte);
		}
		writer.write(current, code_width(self.next_code));
		self.carry = Some(current);

		writer.finish()
	}
}

/// Decompression state
struct Decoder {
	kind: FormatKind,
	prefix: Vec<u16>,
	suffix: Vec<u8>,
	next_code: u16,
	previous: Option<u16>,
	stack: Vec<u8>,
}

impl Decoder {
	fn new(kind: FormatKind) -> Self {
		Self {
			kind,
			prefix: vec![0; TABLE_SIZE],
			suffix: vec![0; TABLE_SIZE],
			next_code: FIRST_CODE,
			previous: None,
			stack: Vec::with_capacity(TABLE_SIZE),
		}
	}

	fn reset(&mut self) {
		self.next_code = FIRST_CODE;
		self.previous = None;
	}

	fn add(&mut self, prefix: u16, byte: u8) {
		let slot = usize::from(self.next_code);
		if slot < TABLE_SIZE {
			self.prefix[slot] = prefix;
			self.suffix[slot] = byte;
			self.next_code += 1;
		}
	}

	/// Appends the string for `code` to `output`
	fn emit(&mut self, code: u16, output: &mut Vec<u8>) {
		self.stack.clear();
		let mut code = code;
		while code >= FIRST_CODE {
			self.stack.push(self.suffix[usize::from(code)]);
			code = self.prefix[usize::from(code)];
		}
		self.stack.push(code as u8);
		output.extend(self.stack.iter().rev());
	}

	/// Decodes codes until `output_len` bytes are produced, returning the bytes
	/// and the number of input bytes consumed
	fn decode_chunk(&mut self, data: &[u8], output_len: usize) -> Result<(Vec<u8>, usize), A2FileError> {
		let mut reader = BitReader::new(data);
		let mut output = Vec::with_capacity(output_len + TABLE_SIZE);

		while output.len() < output_len {
			let width = code_width(self.next_code + 1);
			let code = reader.read(width).ok_or_else(|| {
				A2FileError::decompression(
					self.kind,
					format!("code stream ended after {} of {} bytes", output.len(), output_len),
				)
			})?;

			if code == CLEAR_CODE {
				self.reset();
				continue;
			}

			let start = output.len();
			match self.previous {
				None if code < CLEAR_CODE => output.push(code as u8),
				Some(previous) if code < self.next_code => {
					self.emit(code, &mut output);
					let first = output[start];
					self.add(previous, first);
				}
				Some(previous) if code == self.next_code => {
					// KwKwK: the string is the previous one plus its own first byte
					self.emit(previous, &mut output);
					let first = output[start];
					output.push(first);
					self.add(previous, first);
				}
				_ => {
					return Err(A2FileError::decompression(
						self.kind,
						format!("invalid code {:#05X} (next code {:#05X})", code, self.next_code),
					));
				}
			}
			self.previous = Some(code);
		}

		output.truncate(output_len);
		Ok((output, reader.consumed()))
	}
}

/// Pads a chunk and applies RLE, returning `rle_len` and the bytes to feed to LZW
fn prepare_chunk(chunk: &[u8], delimiter: u8) -> (usize, Vec<u8>) {
	let mut padded = [0u8; CHUNK_SIZE];
	padded[..chunk.len()].copy_from_slice(chunk);
	let rle = compress_rle(&padded, delimiter);
	if rle.len() < CHUNK_SIZE {
		(rle.len(), rle)
	} else {
		(CHUNK_SIZE, padded.to_vec())
	}
}

/// Undoes the RLE layer of one chunk
fn finish_chunk(body: Vec<u8>, rle_len: usize, delimiter: u8, target: usize) -> Result<Vec<u8>, A2FileError> {
	if rle_len == CHUNK_SIZE {
		Ok(body)
	} else {
		expand_rle(&body, delimiter, target)
	}
}

fn read_u16(data: &[u8], offset: usize, kind: FormatKind) -> Result<u16, A2FileError> {
	data.get(offset..offset + 2)
		.map(|b| u16::from_le_bytes([b[0], b[1]]))
		.ok_or_else(|| A2FileError::insufficient_data(kind, offset + 2, data.len()))
}

fn take<'a>(data: &'a [u8], offset: usize, len: usize, kind: FormatKind) -> Result<&'a [u8], A2FileError> {
	data.get(offset..offset + len)
		.ok_or_else(|| A2FileError::insufficient_data(kind, offset + len, data.len()))
}

/// Compresses `data` as an LZW/2 thread
pub fn compress_lzw2(data: &[u8]) -> Vec<u8> {
	let mut output = vec![0, DEFAULT_RLE_DELIMITER];
	let mut encoder = Encoder::new();

	for chunk in data.chunks(CHUNK_SIZE) {
		let (rle_len, body) = prepare_chunk(chunk, DEFAULT_RLE_DELIMITER);

		let mut trial = encoder.clone();
		let compressed = trial.encode_chunk(&body);
		if compressed.len() < body.len() {
			encoder = trial;
			output.extend_from_slice(&(rle_len as u16 | LZW2_FLAG).to_le_bytes());
			output.extend_from_slice(&((compressed.len() + 4) as u16).to_le_bytes());
			output.extend_from_slice(&compressed);
		} else {
			encoder.reset();
			output.extend_from_slice(&(rle_len as u16).to_le_bytes());
			output.extend_from_slice(&body);
		}
	}

	output
}

/// Expands an LZW/2 thread to `expected_len` bytes
pub fn expand_lzw2(data: &[u8], expected_len: usize) -> Result<Vec<u8>, A2FileError> {
	const KIND: FormatKind = FormatKind::Lzw2;

	let mut output = Vec::with_capacity(reserved_capacity(expected_len, data.len()));
	if expected_len == 0 {
		return Ok(output);
	}

	let delimiter = take(data, 0, 2, KIND)?[1];
	let mut decoder = Decoder::new(KIND);
	let mut pos = 2;

	while output.len() < expected_len {
		let word = read_u16(data, pos, KIND)?;
		pos += 2;
		let rle_len = usize::from(word & !LZW2_FLAG);
		if rle_len > CHUNK_SIZE {
			return Err(A2FileError::decompression(KIND, format!("chunk length {} too large", rle_len)));
		}

		let body = if word & LZW2_FLAG != 0 {
			let lzw_len = usize::from(read_u16(data, pos, KIND)?);
			pos += 2;
			let Some(payload_len) = lzw_len.checked_sub(4) else {
				return Err(A2FileError::decompression(KIND, format!("chunk length {} too small", lzw_len)));
			};
			let payload = take(data, pos, payload_len, KIND)?;
			pos += payload_len;
			decoder.decode_chunk(payload, rle_len)?.0
		} else {
			decoder.reset();
			let raw = take(data, pos, rle_len, KIND)?.to_vec();
			pos += rle_len;
			raw
		};

		let target = CHUNK_SIZE.min(expected_len - output.len());
		output.extend(finish_chunk(body, rle_len, delimiter, target)?);
	}

	output.truncate(expected_len);
	Ok(output)
}

/// Compresses `data` as an LZW/1 thread
pub fn compress_lzw1(data: &[u8]) -> Vec<u8> {
	let mut output = vec![0, 0, 0, DEFAULT_RLE_DELIMITER];
	let mut crc = 0;

	for chunk in data.chunks(CHUNK_SIZE) {
		let mut padded = [0u8; CHUNK_SIZE];
		padded[..chunk.len()].copy_from_slice(chunk);
		crc = crc16(crc, &padded);

		let (rle_len, body) = prepare_chunk(chunk, DEFAULT_RLE_DELIMITER);
		let compressed = Encoder::new().encode_chunk(&body);
		output.extend_from_slice(&(rle_len as u16).to_le_bytes());
		if compressed.len() < body.len() {
			output.push(1);
			output.extend_from_slice(&compressed);
		} else {
			output.push(0);
			output.extend_from_slice(&body);
		}
	}

	output[0..2].copy_from_slice(&crc.to_le_bytes());
	output
}

/// Expands an LZW/1 thread to `expected_len` bytes
///
/// Returns the data together with the embedded CRC check; the caller decides
/// what a mismatch means.
pub fn expand_lzw1(data: &[u8], expected_len: usize) -> Result<(Vec<u8>, CrcCheck), A2FileError> {
	const KIND: FormatKind = FormatKind::Lzw1;

	let header = take(data, 0, 4, KIND)?;
	let stored = u16::from_le_bytes([header[0], header[1]]);
	let delimiter = header[3];

	let mut output = Vec::with_capacity(reserved_capacity(expected_len, data.len()) + CHUNK_SIZE);
	let mut decoder = Decoder::new(KIND);
	let mut crc = 0;
	let mut pos = 4;

	while output.len() < expected_len {
		let rle_len = usize::from(read_u16(data, pos, KIND)?);
		let flag = take(data, pos + 2, 1, KIND)?[0];
		pos += 3;
		if rle_len > CHUNK_SIZE {
			return Err(A2FileError::decompression(KIND, format!("chunk length {} too large", rle_len)));
		}

		let body = if flag != 0 {
			decoder.reset();
			let remaining = data.get(pos..).unwrap_or_default();
			let (body, consumed) = decoder.decode_chunk(remaining, rle_len)?;
			pos += consumed;
			body
		} else {
			let raw = take(data, pos, rle_len, KIND)?.to_vec();
			pos += rle_len;
			raw
		};

		let chunk = finish_chunk(body, rle_len, delimiter, CHUNK_SIZE)?;
		crc = crc16(crc, &chunk);
		output.extend(chunk);
	}

	output.truncate(expected_len);
	Ok((
		output,
		CrcCheck {
			stored,
			computed: crc,
		},
	))
}

#[cfg(test)]
mod tests {
	use rand::{Rng, SeedableRng, rngs::SmallRng};

	use super::*;

	fn text_sample(len: usize) -> Vec<u8> {
		b"10 PRINT \"HELLO, WORLD\"\r20 GOTO 10\r"
			.iter()
			.copied()
			.cycle()
			.take(len)
			.collect()
	}

	fn random_bytes(seed: u64, len: usize) -> Vec<u8> {
		let mut rng = SmallRng::seed_from_u64(seed);
		(0..len).map(|_| rng.random()).collect()
	}

	#[test]
	fn test_kwkwk_encode_and_decode() {
		// 'a' then the not-yet-assigned code 0x101, both 9 bits wide
		let mut encoder = Encoder::new();
		assert_eq!(encoder.encode_chunk(b"aaa"), [0x61, 0x02, 0x02]);

		let mut decoder = Decoder::new(FormatKind::Lzw2);
		let (output, consumed) = decoder.decode_chunk(&[0x61, 0x02, 0x02], 3).unwrap();
		assert_eq!(output, b"aaa");
		assert_eq!(consumed, 3);
	}

	#[test]
	fn test_invalid_code_rejected() {
		// First code after a reset cannot refer to the dictionary
		let mut decoder = Decoder::new(FormatKind::Lzw1);
		assert!(decoder.decode_chunk(&[0x05, 0x03], 2).is_err());
	}

	#[test]
	fn test_code_width_growth() {
		assert_eq!(code_width(FIRST_CODE), 9);
		assert_eq!(code_width(0x1FF), 9);
		assert_eq!(code_width(0x200), 10);
		assert_eq!(code_width(0x800), 12);
		assert_eq!(code_width(0x1000), 12);
	}

	#[test]
	fn test_lzw2_round_trip() {
		for len in [0, 1, 3, 4095, 4096, 4097, 20000] {
			let data = text_sample(len);
			let packed = compress_lzw2(&data);
			assert_eq!(expand_lzw2(&packed, data.len()).unwrap(), data, "length {}", len);
		}
	}

	#[test]
	fn test_lzw2_compresses_text() {
		let data = text_sample(16384);
		assert!(compress_lzw2(&data).len() < data.len() / 4);
	}

	#[test]
	fn test_lzw2_table_clear_and_stored_chunks() {
		// Random data overflows the 4096-entry table and is stored raw; the mix
		// exercises the reset paths on both sides
		let mut data = random_bytes(1, 3 * CHUNK_SIZE);
		data.extend(text_sample(3 * CHUNK_SIZE));
		data.extend(random_bytes(2, CHUNK_SIZE + 17));

		let packed = compress_lzw2(&data);
		assert_eq!(expand_lzw2(&packed, data.len()).unwrap(), data);
	}

	#[test]
	fn test_lzw2_dictionary_spans_chunks() {
		// Semi-random text with a small alphabet fills the table over several chunks
		let mut rng = SmallRng::seed_from_u64(99);
		let data: Vec<u8> = (0..10 * CHUNK_SIZE).map(|_| b"ACGT"[rng.random_range(0..4)]).collect();

		let packed = compress_lzw2(&data);
		assert!(packed.len() < data.len());
		assert_eq!(expand_lzw2(&packed, data.len()).unwrap(), data);
	}

	#[test]
	fn test_lzw1_round_trip_per_chunk() {
		let mut data = text_sample(CHUNK_SIZE);
		data.extend(random_bytes(3, CHUNK_SIZE));
		data.extend(vec![0xDB; 1000]);

		for chunk in data.chunks(CHUNK_SIZE) {
			let packed = compress_lzw1(chunk);
			let (output, crc) = expand_lzw1(&packed, chunk.len()).unwrap();
			assert_eq!(output, chunk);
			assert!(crc.is_valid());
		}

		let (output, crc) = expand_lzw1(&compress_lzw1(&data), data.len()).unwrap();
		assert_eq!(output, data);
		assert!(crc.is_valid());
	}

	#[test]
	fn test_lzw1_crc_mismatch_reported() {
		let data = text_sample(5000);
		let mut packed = compress_lzw1(&data);
		packed[0] ^= 0x01;
		let (output, crc) = expand_lzw1(&packed, data.len()).unwrap();
		assert_eq!(output, data);
		assert!(!crc.is_valid());
	}

	#[test]
	fn test_truncated_stream() {
		let data = text_sample(9000);
		let packed = compress_lzw2(&data);
		assert!(expand_lzw2(&packed[..packed.len() / 2], data.len()).is_err());
	}

	#[test]
	fn test_declared_length_exceeds_stream() {
		let data = text_sample(9000);
		assert!(expand_lzw2(&compress_lzw2(&data), usize::MAX).is_err());
		assert!(expand_lzw1(&compress_lzw1(&data), usize::MAX).is_err());
		assert!(expand_lzw1(&compress_lzw1(&data), u32::MAX as usize).is_err());
	}
}
