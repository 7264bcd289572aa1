//! Shared test utilities for the symclone workspace.
//!
//! Dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`tree`]: [`TestTree`](tree::TestTree) builder for on-disk source and
//!   destination fixtures

pub mod tree;

pub use tree::{EntryState, Snapshot, TestTree};
