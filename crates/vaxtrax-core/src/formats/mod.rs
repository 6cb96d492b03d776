//! # Formats
//!
//! Byte-level encodings shared by the storage backends.

mod persistence;

pub use persistence::*;
