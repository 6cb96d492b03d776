//! # Storage
//!
//! Disk-backed batch registry.

mod redb_registry;

pub use redb_registry::RedbRegistry;
