//! # Persistent Storage
//!
//! Disk-backed implementations of the store seam.

mod redb_store;

pub use redb_store::RedbStore;
