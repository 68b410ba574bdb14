//! Uniform catalog tree produced by every filesystem driver.
//!
//! A [`Catalog`] is a snapshot: it is built once from a complete image buffer
//! and never updated. Writers mutate the raw buffer; callers re-parse it to see
//! the result.

use std::fmt::Display;

use chrono::NaiveDateTime;
use serde::Serialize;

use super::{A2FileError, Addressing, Diagnostics, ReadOptions, dos33, pascal, prodos};

/// Filesystem found on an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiskFormat {
	/// `ProDOS` (or SOS) hierarchical volume
	ProDos,
	/// DOS 3.3 flat volume
	Dos33,
	/// UCSD Pascal volume
	Pascal,
}

impl Display for DiskFormat {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			DiskFormat::ProDos => write!(f, "ProDOS"),
			DiskFormat::Dos33 => write!(f, "DOS 3.3"),
			DiskFormat::Pascal => write!(f, "UCSD Pascal"),
		}
	}
}

/// Contents of a catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum EntryContents {
	/// Subdirectory with its entries in on-disk order
	Directory {
		/// Child entries
		children: Vec<CatalogEntry>,
	},
	/// File payload, trimmed to the declared size
	File {
		/// Data fork
		#[serde(skip)]
		data: Vec<u8>,
		/// Resource fork, if the file has one
		#[serde(skip)]
		resource_fork: Option<Vec<u8>>,
	},
}

/// One file or directory in a catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
	/// Name as stored on disk
	pub name: String,
	/// File type byte; meaning depends on the filesystem
	pub file_type: u8,
	/// Auxiliary type (load address, record length, ...)
	pub aux_type: u16,
	/// Size in bytes of the data fork
	pub size: usize,
	/// Blocks (or for DOS 3.3, sector pairs) occupied on disk
	pub blocks_used: usize,
	/// Key block, first block or first track/sector list sector
	pub key_block: usize,
	/// Filesystem specific storage code
	pub storage_type: u8,
	/// Write protected
	pub locked: bool,
	/// Creation timestamp
	pub created: Option<NaiveDateTime>,
	/// Last modification timestamp
	pub modified: Option<NaiveDateTime>,
	/// Directory children or file payload
	#[serde(flatten)]
	pub contents: EntryContents,
}

impl CatalogEntry {
	/// Returns `true` for directories
	pub fn is_directory(&self) -> bool {
		matches!(self.contents, EntryContents::Directory { .. })
	}

	/// Child entries of a directory
	pub fn children(&self) -> Option<&[CatalogEntry]> {
		match &self.contents {
			EntryContents::Directory {
				children,
			} => Some(children),
			EntryContents::File {
				..
			} => None,
		}
	}

	/// Data fork of a file
	pub fn data(&self) -> Option<&[u8]> {
		match &self.contents {
			EntryContents::File {
				data,
				..
			} => Some(data),
			EntryContents::Directory {
				..
			} => None,
		}
	}

	/// Resource fork of a file
	pub fn resource_fork(&self) -> Option<&[u8]> {
		match &self.contents {
			EntryContents::File {
				resource_fork,
				..
			} => resource_fork.as_deref(),
			EntryContents::Directory {
				..
			} => None,
		}
	}
}

/// Parsed disk image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Catalog {
	/// Volume name
	pub disk_name: String,
	/// Filesystem
	pub disk_format: DiskFormat,
	/// Size of the image in bytes
	pub disk_size: usize,
	/// Physical order the volume was read with
	pub addressing: Addressing,
	/// Root entries in on-disk order
	pub entries: Vec<CatalogEntry>,
	/// Problems met while walking the volume
	pub diagnostics: Diagnostics,
}

impl Catalog {
	/// Parses an image with default options
	pub fn from_bytes(buffer: &[u8]) -> Result<Self, A2FileError> {
		Self::from_bytes_with(buffer, &ReadOptions::default())
	}

	/// Parses an image, trying `ProDOS`, then DOS 3.3, then UCSD Pascal
	pub fn from_bytes_with(buffer: &[u8], options: &ReadOptions) -> Result<Self, A2FileError> {
		let drivers: [(DiskFormat, fn(&[u8], &ReadOptions) -> Result<Catalog, A2FileError>); 3] = [
			(DiskFormat::ProDos, prodos::read_catalog_with),
			(DiskFormat::Dos33, dos33::read_catalog_with),
			(DiskFormat::Pascal, pascal::read_catalog_with),
		];

		for (format, driver) in drivers {
			match driver(buffer, options) {
				Ok(catalog) => {
					log::debug!(
						"Detected {} volume '{}' ({}, {} entries)",
						format,
						catalog.disk_name,
						catalog.addressing,
						catalog.entries.len()
					);
					return Ok(catalog);
				}
				Err(e) => log::debug!("Not a {} volume: {}", format, e),
			}
		}

		Err(A2FileError::UnrecognizedImage {
			size: buffer.len(),
		})
	}

	/// Finds an entry by slash separated path, ignoring case
	pub fn find(&self, path: &str) -> Option<&CatalogEntry> {
		let mut entries = self.entries.as_slice();
		let mut found = None;
		for component in path.split('/').filter(|c| !c.is_empty()) {
			let entry = entries.iter().find(|e| e.name.eq_ignore_ascii_case(component))?;
			entries = entry.children().unwrap_or_default();
			found = Some(entry);
		}
		found
	}

	/// Iterates over every entry depth-first, yielding its full path
	pub fn walk(&self) -> Walk<'_> {
		Walk {
			stack: vec![(String::new(), self.entries.iter())],
		}
	}

	/// Number of files (directories excluded) in the whole tree
	pub fn file_count(&self) -> usize {
		self.walk().filter(|(_, entry)| !entry.is_directory()).count()
	}
}

/// Depth-first iterator over a catalog
pub struct Walk<'a> {
	stack: Vec<(String, std::slice::Iter<'a, CatalogEntry>)>,
}

impl<'a> Iterator for Walk<'a> {
	type Item = (String, &'a CatalogEntry);

	fn next(&mut self) -> Option<Self::Item> {
		loop {
			let (prefix, entries) = self.stack.last_mut()?;
			let Some(entry) = entries.next() else {
				self.stack.pop();
				continue;
			};

			let path = if prefix.is_empty() {
				entry.name.clone()
			} else {
				format!("{}/{}", prefix, entry.name)
			};
			if let Some(children) = entry.children() {
				self.stack.push((path.clone(), children.iter()));
			}
			return Some((path, entry));
		}
	}
}
