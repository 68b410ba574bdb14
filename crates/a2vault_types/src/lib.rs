//! This crate provides the storage engine of the `a2vault-rs` project.
//!
//! # Formats
//!
//! - **`ProDOS`**: hierarchical block volumes, read and write (seedling, sapling, tree and extended files)
//! - **DOS 3.3**: track/sector volumes, read-only
//! - **UCSD Pascal**: contiguous-file volumes, read-only
//! - **`NuFX`**: `ShrinkIt` archives, read and write, optionally inside Binary II
//!
//! Every volume parses into the same [`Catalog`](file::Catalog) tree.
//!
//! # Examples
//!
//! Using the prelude (recommended):
//!
//! ```no_run
//! use a2vault_types::prelude::*;
//!
//! let mut image = file::prodos::create_volume(280, "WORK", &WriteOptions::default())?;
//! file::prodos::add_file(&mut image, "/", &ProDosNewFile::new("HELLO", b"HI"), &WriteOptions::default())?;
//!
//! let catalog = Catalog::from_bytes(&image)?;
//! for (path, entry) in catalog.walk() {
//!     println!("{} {} bytes", path, entry.size);
//! }
//! # Ok::<(), A2FileError>(())
//! ```
//!
//! Or use explicit paths:
//!
//! ```no_run
//! use a2vault_types::file::{NuFxArchive, read_image};
//!
//! let archive = NuFxArchive::from_bytes(&read_image("games.shk")?)?;
//! println!("{} records", archive.records.len());
//! # Ok::<(), a2vault_types::file::A2FileError>(())
//! ```

pub mod file;

/// `use a2vault_types::prelude::*;` to import commonly used items.
pub mod prelude;
