//! Parse and write configuration.

use std::{fmt::Display, str::FromStr};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// What to do when a stored CRC does not match the data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrcPolicy {
	/// Record a warning diagnostic and keep the data
	#[default]
	Warn,
	/// Fail the extraction with [`A2FileError::CrcMismatch`](super::A2FileError::CrcMismatch)
	Strict,
}

impl Display for CrcPolicy {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			CrcPolicy::Warn => write!(f, "warn"),
			CrcPolicy::Strict => write!(f, "strict"),
		}
	}
}

impl FromStr for CrcPolicy {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"warn" => Ok(CrcPolicy::Warn),
			"strict" => Ok(CrcPolicy::Strict),
			other => Err(format!("unknown CRC policy '{}', expected 'warn' or 'strict'", other)),
		}
	}
}

/// Options controlling image and archive parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
	/// CRC mismatch handling for `NuFX` archives
	pub crc_policy: CrcPolicy,
	/// Maximum `ProDOS` subdirectory nesting followed by the walker
	pub max_directory_depth: usize,
	/// Maximum number of linked blocks followed in one directory chain
	pub max_chain_length: usize,
}

impl Default for ReadOptions {
	fn default() -> Self {
		Self {
			crc_policy: CrcPolicy::Warn,
			max_directory_depth: 64,
			max_chain_length: 0xFFFF,
		}
	}
}

impl ReadOptions {
	/// Returns options with the given CRC policy
	pub fn with_crc_policy(mut self, crc_policy: CrcPolicy) -> Self {
		self.crc_policy = crc_policy;
		self
	}
}

/// Options for writers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
	/// Timestamp to store; `None` uses the local clock
	pub timestamp: Option<NaiveDateTime>,
	/// Try LZW/2 for archive threads, keeping it only when smaller
	pub compress: bool,
}

impl Default for WriteOptions {
	fn default() -> Self {
		Self {
			timestamp: None,
			compress: true,
		}
	}
}

impl WriteOptions {
	/// Returns options that stamp the given timestamp
	pub fn at(timestamp: NaiveDateTime) -> Self {
		Self {
			timestamp: Some(timestamp),
			..Self::default()
		}
	}

	/// Returns options with compression switched on or off
	pub fn with_compression(mut self, compress: bool) -> Self {
		self.compress = compress;
		self
	}

	/// Resolves the timestamp to store
	pub fn timestamp(&self) -> NaiveDateTime {
		self.timestamp.unwrap_or_else(|| chrono::Local::now().naive_local())
	}
}
