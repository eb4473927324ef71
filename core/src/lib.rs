//! # quarry-core
//!
//! Dialect aware SQL building for quarry.
//!
//! [`SQL`] is a flat list of chunks (keywords, identifiers, parameters and
//! raw text) rendered for a concrete [`Dialect`] only at the end.
//! [`SqlBuilder`] assembles whole statements out of such fragments and is
//! driven by name through [`SqlBuilder::call`] by the ORM layer.

pub mod builder;
pub mod dialect;
pub mod error;
pub mod sql;
#[doc(hidden)]
pub mod tracing;

pub use builder::{
    Boolean, Clause, CompiledQuery, ConflictAction, JoinKind, Method, OnConflict, Order, SqlArg,
    SqlBuilder,
};
pub use dialect::{Dialect, DialectExt, split_alias};
pub use error::{Result, SqlError};
pub use sql::{Binding, RawPart, RawSql, SQL, SqlChunk, Token};

/// Re-exports for glob imports.
pub mod prelude {
    pub use crate::builder::{SqlArg, SqlBuilder};
    pub use crate::dialect::{Dialect, DialectExt};
    pub use crate::sql::{Binding, SQL, Token};
}
