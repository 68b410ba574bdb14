//! Huffman "squeeze" decompression.
//!
//! The stream starts with the decoding tree, serialized as a 16-bit node count
//! followed by that many `(left, right)` pairs of signed 16-bit children. A
//! non-negative child is the index of another node; a negative child `v` is a
//! leaf for symbol `-(v + 1)`. Symbol 256 marks the end of the stream. Bits
//! are consumed LSB-first and every walk starts at node 0.
//!
//! The decoded symbols are then run-length expanded: `0x90, n` repeats the
//! previous byte `n - 1` more times, and `0x90, 0` is a literal 0x90.
//!
//! Standalone `.SQ` files carry an extra header (magic `0xFF76`, checksum, and
//! a NUL-terminated filename) that is skipped when present.

use crate::file::{A2FileError, FormatKind};

const KIND: FormatKind = FormatKind::Squeeze;

/// Magic number of a standalone squeezed file
pub const SQ_MAGIC: u16 = 0xFF76;

/// End-of-stream symbol
///
/// The Huffman tree carries 257 leaves: the 256 byte values plus this one. A
/// decoded 256 ends the stream; the byte 0x90 never does.
const EOF_SYMBOL: u16 = 256;

/// Maximum number of tree nodes (one per symbol, end-of-stream included)
const MAX_NODES: usize = 257;

/// Run-length escape byte
///
/// Applied after Huffman decoding: `0x90 n` repeats the previous byte until it
/// appears `n` times, and `0x90 0` is a literal 0x90.
const RUN_MARKER: u8 = 0x90;

/// A decoded tree child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Child {
	Node(usize),
	Leaf(u16),
}

impl Child {
	fn from_raw(raw: i16) -> Self {
		if raw < 0 {
			Child::Leaf((-(i32::from(raw) + 1)) as u16)
		} else {
			Child::Node(raw as usize)
		}
	}
}

/// Skips the standalone header if present and returns the offset of the tree
fn tree_offset(data: &[u8]) -> Result<usize, A2FileError> {
	if data.len() < 2 || u16::from_le_bytes([data[0], data[1]]) != SQ_MAGIC {
		return Ok(0);
	}
	// magic + checksum, then the filename
	let name_end = data
		.get(4..)
		.and_then(|rest| rest.iter().position(|&b| b == 0))
		.ok_or_else(|| A2FileError::structural(KIND, "unterminated filename in SQ header"))?;
	Ok(4 + name_end + 1)
}

/// Decompresses a squeezed stream
///
/// Stops at the end-of-stream symbol, at the end of input, or once
/// `expected_len` bytes have been produced, whichever comes first.
pub fn expand_squeeze(data: &[u8], expected_len: Option<usize>) -> Result<Vec<u8>, A2FileError> {
	let limit = expected_len.unwrap_or(usize::MAX);
	let mut pos = tree_offset(data)?;

	let count_bytes = data
		.get(pos..pos + 2)
		.ok_or_else(|| A2FileError::insufficient_data(KIND, pos + 2, data.len()))?;
	let node_count = usize::from(u16::from_le_bytes([count_bytes[0], count_bytes[1]]));
	pos += 2;
	if node_count > MAX_NODES {
		return Err(A2FileError::decompression(KIND, format!("tree has {} nodes", node_count)));
	}

	let tree_bytes = data
		.get(pos..pos + node_count * 4)
		.ok_or_else(|| A2FileError::insufficient_data(KIND, pos + node_count * 4, data.len()))?;
	let nodes: Vec<[Child; 2]> = tree_bytes
		.chunks_exact(4)
		.map(|n| {
			[
				Child::from_raw(i16::from_le_bytes([n[0], n[1]])),
				Child::from_raw(i16::from_le_bytes([n[2], n[3]])),
			]
		})
		.collect();
	pos += node_count * 4;

	for (index, node) in nodes.iter().enumerate() {
		for child in node {
			match *child {
				Child::Node(next) if next >= node_count => {
					return Err(A2FileError::decompression(
						KIND,
						format!("node {} points past the tree ({})", index, next),
					));
				}
				Child::Leaf(symbol) if symbol > EOF_SYMBOL => {
					return Err(A2FileError::decompression(KIND, format!("invalid leaf symbol {}", symbol)));
				}
				_ => {}
			}
		}
	}

	let mut output = Vec::new();
	if nodes.is_empty() {
		return Ok(output);
	}

	let mut expander = RunExpander::default();
	let mut node = 0;
	let mut steps = 0;
	'stream: for &byte in &data[pos..] {
		for bit in 0..8 {
			let child = nodes[node][usize::from((byte >> bit) & 1)];
			match child {
				Child::Node(next) => {
					node = next;
					steps += 1;
					// A path longer than the node count means the tree has a cycle
					if steps > node_count {
						return Err(A2FileError::decompression(KIND, "cyclic decoding tree"));
					}
				}
				Child::Leaf(EOF_SYMBOL) => break 'stream,
				Child::Leaf(symbol) => {
					expander.push(symbol as u8, &mut output, limit);
					if output.len() >= limit {
						break 'stream;
					}
					node = 0;
					steps = 0;
				}
			}
		}
	}

	output.truncate(limit);
	Ok(output)
}

/// State of the 0x90 run-length layer
#[derive(Default)]
struct RunExpander {
	last: Option<u8>,
	pending_count: bool,
}

impl RunExpander {
	fn push(&mut self, byte: u8, output: &mut Vec<u8>, limit: usize) {
		if self.pending_count {
			self.pending_count = false;
			if byte == 0 {
				output.push(RUN_MARKER);
				self.last = Some(RUN_MARKER);
			} else if let Some(last) = self.last {
				let room = limit.saturating_sub(output.len());
				output.extend(std::iter::repeat_n(last, (usize::from(byte) - 1).min(room)));
			}
		} else if byte == RUN_MARKER {
			self.pending_count = true;
		} else {
			output.push(byte);
			self.last = Some(byte);
		}
	}
}
