//! Prelude module for `a2vault_types`.
//!
//! This module provides a convenient way to import commonly used types, traits, and constants.
//!
//! # Examples
//!
//! ```no_run
//! use a2vault_types::prelude::*;
//!
//! let catalog = Catalog::from_bytes(&read_image("disk.po")?)?;
//! println!("{} ({})", catalog.disk_name, catalog.disk_format);
//! # Ok::<(), A2FileError>(())
//! ```

#[doc(inline)]
pub use crate::file::{
	// Errors and diagnostics
	A2FileError,
	// Addressing
	Addressing,
	BLOCK_SIZE,
	// Catalog
	Catalog,
	CatalogEntry,
	// Options
	CrcPolicy,
	Diagnostics,
	DiskFormat,
	EntryContents,
	ErrorCategory,
	FLOPPY_140K,
	FormatKind,
	// NuFX
	NewArchiveEntry,
	NuFxArchive,
	NuFxRecord,
	// ProDOS
	ProDosNewFile,
	ReadOptions,
	ThreadRole,
	WriteOptions,
	create_archive,
	// I/O
	persist_image,
	read_image,
	update_image,
};

// Re-export the file module for advanced usage
#[doc(inline)]
pub use crate::file;
