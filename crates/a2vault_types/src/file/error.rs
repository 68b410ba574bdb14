//! Error types for disk-image and archive parsing and manipulation.

use std::fmt::Display;

use thiserror::Error;

/// On-disk format (or codec) an error or diagnostic originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum FormatKind {
	/// Raw block/sector image addressing
	Image,
	/// `ProDOS` volume
	ProDos,
	/// DOS 3.3 volume
	Dos33,
	/// UCSD Pascal volume
	Pascal,
	/// `NuFX` (`ShrinkIt`) archive
	NuFx,
	/// Binary II wrapper
	BinaryII,
	/// `ShrinkIt` run-length layer
	Rle,
	/// `ShrinkIt` LZW/1
	Lzw1,
	/// `ShrinkIt` LZW/2
	Lzw2,
	/// Huffman squeeze
	Squeeze,
}

impl Display for FormatKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			FormatKind::Image => write!(f, "Disk image"),
			FormatKind::ProDos => write!(f, "ProDOS"),
			FormatKind::Dos33 => write!(f, "DOS 3.3"),
			FormatKind::Pascal => write!(f, "UCSD Pascal"),
			FormatKind::NuFx => write!(f, "NuFX"),
			FormatKind::BinaryII => write!(f, "Binary II"),
			FormatKind::Rle => write!(f, "RLE"),
			FormatKind::Lzw1 => write!(f, "LZW/1"),
			FormatKind::Lzw2 => write!(f, "LZW/2"),
			FormatKind::Squeeze => write!(f, "Squeeze"),
		}
	}
}

/// Broad error category, used by callers to decide how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
	/// Signature mismatch; a detection cascade moves on to the next format
	Format,
	/// Bounds or offset violation inside otherwise recognized data
	Structural,
	/// Recognized but unimplemented feature (e.g. unknown compression format)
	Unsupported,
	/// Checksum mismatch
	Integrity,
	/// A writer refused to mutate the buffer
	Precondition,
	/// Underlying file I/O failure
	Io,
}

/// Unified error type for every format handled by the engine
#[derive(Debug, Error)]
pub enum A2FileError {
	/// Not enough data to parse
	#[error("{kind}: insufficient data, expected {expected} bytes, got {actual} bytes")]
	InsufficientData {
		/// Format being parsed
		kind: FormatKind,
		/// Expected number of bytes
		expected: usize,
		/// Actual number of bytes
		actual: usize,
	},

	/// Signature mismatch
	#[error("{kind}: invalid magic, expected {expected:02X?}, got {actual:02X?}")]
	InvalidMagic {
		/// Format being parsed
		kind: FormatKind,
		/// Expected signature bytes
		expected: Vec<u8>,
		/// Signature bytes found
		actual: Vec<u8>,
	},

	/// No supported filesystem matched the image
	#[error("Unrecognized disk image ({size} bytes)")]
	UnrecognizedImage {
		/// Size of the rejected image
		size: usize,
	},

	/// Structure points outside the buffer or is otherwise inconsistent
	#[error("{kind}: structural error, {message}")]
	Structural {
		/// Format being parsed
		kind: FormatKind,
		/// Error message
		message: String,
	},

	/// Block index out of range
	#[error("Block {index} out of range (total blocks: {total})")]
	BlockOutOfRange {
		/// Block index that was requested
		index: usize,
		/// Total number of blocks available
		total: usize,
	},

	/// Compression format not implemented
	#[error("{kind}: unsupported compression format {format}")]
	UnsupportedCompression {
		/// Format being parsed
		kind: FormatKind,
		/// Thread format code
		format: u16,
	},

	/// Decompression failure
	#[error("{kind}: decompression error, {message}")]
	DecompressionError {
		/// Codec that failed
		kind: FormatKind,
		/// Error message
		message: String,
	},

	/// CRC mismatch
	#[error("{kind}: CRC mismatch in {context}, stored {stored:#06X}, computed {computed:#06X}")]
	CrcMismatch {
		/// Format being parsed
		kind: FormatKind,
		/// What was being checked
		context: String,
		/// CRC stored in the file
		stored: u16,
		/// CRC computed over the data
		computed: u16,
	},

	/// Entry not found
	#[error("{kind}: entry not found, {message}")]
	EntryNotFound {
		/// Format being searched
		kind: FormatKind,
		/// Error message
		message: String,
	},

	/// No free directory slot
	#[error("{kind}: directory '{directory}' has no free entry slot")]
	DirectoryFull {
		/// Format being written
		kind: FormatKind,
		/// Directory path
		directory: String,
	},

	/// Not enough free blocks for a write
	#[error(
		"{kind}: disk full, {blocks_needed} blocks needed but only {blocks_available} blocks free"
	)]
	DiskFull {
		/// Format being written
		kind: FormatKind,
		/// Number of blocks needed
		blocks_needed: usize,
		/// Number of blocks available
		blocks_available: usize,
	},

	/// File too large for the format
	#[error("{kind}: file too large, {size} bytes exceeds the maximum of {max} bytes")]
	FileTooLarge {
		/// Format being written
		kind: FormatKind,
		/// Size of the file in bytes
		size: usize,
		/// Maximum size in bytes
		max: usize,
	},

	/// Name rejected by the format's naming rules
	#[error("{kind}: invalid name '{name}', {reason}")]
	InvalidName {
		/// Format being written
		kind: FormatKind,
		/// Rejected name
		name: String,
		/// Reason for rejection
		reason: String,
	},

	/// Name already used in the target directory
	#[error("{kind}: an entry named '{name}' already exists")]
	DuplicateName {
		/// Format being written
		kind: FormatKind,
		/// Conflicting name
		name: String,
	},

	/// Operation not supported by this format
	#[error("{kind}: operation not supported, {message}")]
	NotSupported {
		/// Format the operation was attempted on
		kind: FormatKind,
		/// Error message
		message: String,
	},

	/// IO error
	#[error(transparent)]
	IOError(#[from] std::io::Error),

	/// Slice conversion error
	#[error(transparent)]
	SliceError(#[from] std::array::TryFromSliceError),
}

impl A2FileError {
	/// Creates an `InsufficientData` error
	pub fn insufficient_data(kind: FormatKind, expected: usize, actual: usize) -> Self {
		A2FileError::InsufficientData {
			kind,
			expected,
			actual,
		}
	}

	/// Creates an `InvalidMagic` error
	pub fn invalid_magic(kind: FormatKind, expected: &[u8], actual: &[u8]) -> Self {
		A2FileError::InvalidMagic {
			kind,
			expected: expected.to_vec(),
			actual: actual.to_vec(),
		}
	}

	/// Creates a `Structural` error
	pub fn structural(kind: FormatKind, message: impl Into<String>) -> Self {
		A2FileError::Structural {
			kind,
			message: message.into(),
		}
	}

	/// Creates a `DecompressionError`
	pub fn decompression(kind: FormatKind, message: impl Into<String>) -> Self {
		A2FileError::DecompressionError {
			kind,
			message: message.into(),
		}
	}

	/// Creates an `EntryNotFound` error
	pub fn not_found(kind: FormatKind, message: impl Into<String>) -> Self {
		A2FileError::EntryNotFound {
			kind,
			message: message.into(),
		}
	}

	/// Returns the category this error belongs to
	pub fn category(&self) -> ErrorCategory {
		match self {
			A2FileError::InvalidMagic {
				..
			}
			| A2FileError::UnrecognizedImage {
				..
			} => ErrorCategory::Format,
			A2FileError::InsufficientData {
				..
			}
			| A2FileError::Structural {
				..
			}
			| A2FileError::BlockOutOfRange {
				..
			}
			| A2FileError::DecompressionError {
				..
			}
			| A2FileError::SliceError(_) => ErrorCategory::Structural,
			A2FileError::UnsupportedCompression {
				..
			}
			| A2FileError::NotSupported {
				..
			} => ErrorCategory::Unsupported,
			A2FileError::CrcMismatch {
				..
			} => ErrorCategory::Integrity,
			A2FileError::EntryNotFound {
				..
			}
			| A2FileError::DirectoryFull {
				..
			}
			| A2FileError::DiskFull {
				..
			}
			| A2FileError::FileTooLarge {
				..
			}
			| A2FileError::InvalidName {
				..
			}
			| A2FileError::DuplicateName {
				..
			} => ErrorCategory::Precondition,
			A2FileError::IOError(_) => ErrorCategory::Io,
		}
	}
}
