//! `ShrinkIt` run-length layer.
//!
//! A run is written as the triplet `delimiter, value, count - 1`, so a single
//! triplet covers 1 to 256 bytes. Runs shorter than four bytes are written as
//! literals, except that any occurrence of the delimiter byte itself must be
//! escaped through a triplet.

use crate::file::{A2FileError, FormatKind};

/// Longest run a single triplet can describe
pub const MAX_RUN: usize = 256;

/// Shortest run worth encoding as a triplet
const MIN_RUN: usize = 4;

/// Compresses `data` using `delimiter` as the escape byte
pub fn compress_rle(data: &[u8], delimiter: u8) -> Vec<u8> {
	let mut output = Vec::with_capacity(data.len());
	let mut pos = 0;

	while pos < data.len() {
		let value = data[pos];
		let run = data[pos..].iter().take(MAX_RUN).take_while(|&&b| b == value).count();

		if run >= MIN_RUN || value == delimiter {
			output.push(delimiter);
			output.push(value);
			output.push((run - 1) as u8);
		} else {
			output.extend(std::iter::repeat_n(value, run));
		}
		pos += run;
	}

	output
}

/// Expands RLE data until `expected_len` bytes have been produced
///
/// Trailing input after the expected length is ignored; running out of input
/// before it is an error.
pub fn expand_rle(data: &[u8], delimiter: u8, expected_len: usize) -> Result<Vec<u8>, A2FileError> {
	let mut output = Vec::with_capacity(super::reserved_capacity(expected_len, data.len()));
	let mut pos = 0;

	while output.len() < expected_len {
		let Some(&byte) = data.get(pos) else {
			return Err(A2FileError::decompression(
				FormatKind::Rle,
				format!("input exhausted after {} of {} bytes", output.len(), expected_len),
			));
		};

		if byte == delimiter {
			let (Some(&value), Some(&count)) = (data.get(pos + 1), data.get(pos + 2)) else {
				return Err(A2FileError::decompression(FormatKind::Rle, "truncated run triplet"));
			};
			let run = (usize::from(count) + 1).min(expected_len - output.len());
			output.extend(std::iter::repeat_n(value, run));
			pos += 3;
		} else {
			output.push(byte);
			pos += 1;
		}
	}

	Ok(output)
}

#[cfg(test)]
mod tests {
	use rand::{Rng, SeedableRng, rngs::SmallRng};

	use super::*;

	#[test]
	fn test_short_runs_are_literal() {
		assert_eq!(compress_rle(b"aaabbc", 0xDB), b"aaabbc");
	}

	#[test]
	fn test_long_run_triplet() {
		let data = [0x41u8; 10];
		assert_eq!(compress_rle(&data, 0xDB), [0xDB, 0x41, 9]);
	}

	#[test]
	fn test_run_split_at_256() {
		let data = vec![0u8; 300];
		let encoded = compress_rle(&data, 0xDB);
		assert_eq!(encoded, [0xDB, 0x00, 0xFF, 0xDB, 0x00, 43]);
		assert_eq!(expand_rle(&encoded, 0xDB, 300).unwrap(), data);
	}

	#[test]
	fn test_delimiter_is_escaped() {
		let encoded = compress_rle(&[1, 0xDB, 2], 0xDB);
		assert_eq!(encoded, [1, 0xDB, 0xDB, 0, 2]);
	}

	#[test]
	fn test_truncated_input() {
		assert!(expand_rle(&[1, 2], 0xDB, 3).is_err());
		assert!(expand_rle(&[0xDB, 5], 0xDB, 3).is_err());
	}

	#[test]
	fn test_round_trip_random() {
		let mut rng = SmallRng::seed_from_u64(7);
		for _ in 0..200 {
			let delimiter: u8 = rng.random();
			let len = rng.random_range(0..2000);
			// Small alphabet so runs (and delimiters) actually occur
			let alphabet: u8 = rng.random_range(1..=255);
			let mut data = Vec::with_capacity(len);
			while data.len() < len {
				let value = rng.random_range(0..=alphabet);
				let run = rng.random_range(1..=300).min(len - data.len());
				data.extend(std::iter::repeat_n(value, run));
			}
			let encoded = compress_rle(&data, delimiter);
			assert_eq!(expand_rle(&encoded, delimiter, data.len()).unwrap(), data);
		}
	}
}
