//! Cross-format tests for `a2vault-rs`

mod detection;
mod fixtures;
mod persistence;
mod workflow;
