//! Prelude module for `a2vault_internal`.
//!
//! This module provides a convenient way to import commonly used types and traits.
//!
//! # Examples
//!
//! ```rust
//! use a2vault_internal::prelude::*;
//!
//! let image = file::prodos::create_volume(280, "BLANK", &WriteOptions::default()).unwrap();
//! let catalog = Catalog::from_bytes(&image).unwrap();
//! assert_eq!(catalog.disk_format, DiskFormat::ProDos);
//! assert!(catalog.entries.is_empty());
//! ```

// Re-export everything from a2vault_types::prelude
#[doc(inline)]
pub use a2vault_types::prelude::*;

// Re-export the entire a2vault_types module for advanced usage
#[doc(inline)]
pub use a2vault_types;
