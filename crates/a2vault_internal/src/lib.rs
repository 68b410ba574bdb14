//! This module is separated into its own crate to enable simple dynamic linking for `a2vault`, and should not be used directly.

/// `use a2vault::prelude::*;` to import commonly used items.
pub mod prelude;

// Re-export a2vault_types for convenience
pub use a2vault_types;

// Re-export commonly used types at crate root
pub use a2vault_types::file::{A2FileError, Catalog, CatalogEntry, DiskFormat, NuFxArchive};
