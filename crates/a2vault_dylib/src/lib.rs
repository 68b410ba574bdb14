//! Dynamic-linking shim for `a2vault-rs`.
//!
//! Enabling the `dynamic_linking` feature of the root crate links the engine through this
//! dylib, which keeps incremental rebuilds of the demos and tests fast.

#[allow(unused_imports)]
pub use a2vault_internal::*;
