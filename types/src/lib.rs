//! Shared type definitions for quarry
//!
//! This crate provides the [`Dialect`] enum used by the SQL builder in
//! `quarry-core` and by the ORM layer in `quarry` to pick dialect specific
//! strategies (placeholders, identifier quoting, composite `IN` emulation,
//! batch inserts and `RETURNING` support).
//!
//! # Features
//!
//! - `std` - Standard library support (enabled by default)
//! - `serde` - Enable serde serialization/deserialization

#![cfg_attr(not(feature = "std"), no_std)]

mod dialect;

pub use dialect::{Dialect, DialectParseError};

/// Prelude module for commonly used types
pub mod prelude {
    pub use crate::Dialect;
}
