//! Whole-file reads and atomic whole-file writes.
//!
//! The engine never reads or writes partially: an image or archive is read
//! into memory in full, mutated in memory, and written back by renaming a
//! temporary file in the same directory over the original. A failure at any
//! point leaves the original file untouched.

use std::{
	io::Write,
	path::{Path, PathBuf},
};

use tempfile::NamedTempFile;

use super::A2FileError;

/// Reads a complete image or archive
pub fn read_image(path: impl AsRef<Path>) -> Result<Vec<u8>, A2FileError> {
	let path = path.as_ref();
	let data = std::fs::read(path)?;
	log::debug!("Read {} bytes from {}", data.len(), path.display());
	Ok(data)
}

/// Replaces `path` with `data` atomically
pub fn persist_image(path: impl AsRef<Path>, data: &[u8]) -> Result<(), A2FileError> {
	let path = path.as_ref();
	let directory = match path.parent() {
		Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
		_ => PathBuf::from("."),
	};

	let mut temp = NamedTempFile::new_in(&directory)?;
	temp.write_all(data)?;
	temp.as_file().sync_all()?;
	temp.persist(path).map_err(|e| A2FileError::IOError(e.error))?;
	log::debug!("Wrote {} bytes to {}", data.len(), path.display());
	Ok(())
}

/// Reads `path`, applies `mutate` to a copy, and persists the result
///
/// Nothing is written if `mutate` fails.
pub fn update_image<T>(
	path: impl AsRef<Path>,
	mutate: impl FnOnce(&mut Vec<u8>) -> Result<T, A2FileError>,
) -> Result<T, A2FileError> {
	let path = path.as_ref();
	let mut buffer = read_image(path)?;
	let result = mutate(&mut buffer)?;
	persist_image(path, &buffer)?;
	Ok(result)
}
