#![allow(clippy::single_component_path_imports)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! `a2vault-rs` reads and writes Apple II disk images and `ShrinkIt` archives.
//!
//! `ProDOS`, DOS 3.3 and UCSD Pascal volumes parse into one catalog tree;
//! `ProDOS` volumes and `NuFX` archives can also be written.
//!
pub use a2vault_internal::*;

#[cfg(all(feature = "dynamic_linking", not(target_family = "wasm")))]
#[allow(unused_imports)]
use a2vault_dylib;
