//! Disk-image and archive format support for `a2vault-rs`.

mod bytes;
mod diagnostics;
mod error;
mod options;

pub mod addressing;
pub mod catalog;
pub mod codec;
pub mod dos33;
pub mod image_io;
pub mod nufx;
pub mod pascal;
pub mod prodos;

// Re-export unified error type
pub use error::{A2FileError, ErrorCategory, FormatKind};

pub use addressing::{
	Addressing, BLOCK_SIZE, BLOCKS_PER_TRACK, Block, FLOPPY_140K, SECTOR_SIZE, SECTORS_PER_TRACK, Sector,
	read_block,
};
pub use catalog::{Catalog, CatalogEntry, DiskFormat, EntryContents, Walk};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use image_io::{persist_image, read_image, update_image};
pub use nufx::{
	Archive as NuFxArchive, MasterHeader as NuFxMasterHeader, NewArchiveEntry, Record as NuFxRecord,
	Thread as NuFxThread, ThreadFormat, ThreadRole, create_archive,
};
pub use options::{CrcPolicy, ReadOptions, WriteOptions};
pub use prodos::{NewFile as ProDosNewFile, VolumeInfo as ProDosVolumeInfo};
