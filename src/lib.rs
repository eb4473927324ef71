//! # quarry
//!
//! The query layer of an ORM: builders that record operations, run them
//! through ordered lifecycle hooks and hand the result to a SQL builder.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use quarry::prelude::*;
//!
//! struct Person;
//!
//! impl ModelClass for Person {
//!     fn table_name(&self) -> &str {
//!         "person"
//!     }
//! }
//!
//! # async fn run(conn: std::rc::Rc<dyn Connection>) -> quarry::Result<()> {
//! let mut query = QueryBuilder::for_class(std::rc::Rc::new(Person));
//! query
//!     .transacting(conn)
//!     .where_(("age", ">", 18))
//!     .order_by("name")
//!     .with_graph_fetched("[pets, movies.actors]");
//!
//! let people = query.execute().await?.into_models();
//! # Ok(())
//! # }
//! ```
//!
//! ## Layout
//!
//! | Module              | Contents                                              |
//! |---------------------|-------------------------------------------------------|
//! | [`query`]           | [`QueryBuilder`], operation selection, execution      |
//! | [`operation`]       | The operations and their hooks                        |
//! | [`relation`]        | Relation expressions: parsing, merging, sub-sets      |
//! | [`args`]            | Builder arguments: `raw`, `ref_`, `val`, groups       |
//! | [`model`]           | What the query layer needs to know about a model      |
//! | [`connection`]      | Where compiled statements run                         |
//!
//! SQL generation lives in `quarry-core`, re-exported as [`core`].

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod args;
pub mod cache;
pub mod connection;
pub mod error;
pub mod field_expression;
pub mod hooks;
pub mod maybe_async;
pub mod model;
pub mod operation;
pub mod query;
pub mod relation;
pub mod result;
mod transform;

// =============================================================================
// Root-level exports
// =============================================================================

pub use error::{QueryError, Result};
pub use query::QueryBuilder;
pub use result::QueryResult;

/// Database dialect enum
pub use quarry_types::Dialect;

/// The SQL builder the operations compile to.
pub use quarry_core as core;

/// Everything needed to define model classes and build queries.
pub mod prelude {
    pub use crate::args::{Arg, Args, IntoArgs, fn_, raw, ref_, val};
    pub use crate::connection::{Connection, RawResult};
    #[cfg(feature = "rusqlite")]
    #[cfg_attr(docsrs, doc(cfg(feature = "rusqlite")))]
    pub use crate::connection::SqliteConnection;
    pub use crate::error::{QueryError, Result};
    pub use crate::hooks::StaticHookArguments;
    pub use crate::maybe_async::MaybeAsync;
    pub use crate::model::{
        InstanceHooks, ModelClass, ModelRef, Relation, RelationKind, RelationValue, Row,
    };
    pub use crate::operation::{GraphAlgorithm, GraphOptions};
    pub use crate::query::{ChildQueryOptions, QueryBuilder, Selector, UserContext};
    pub use crate::relation::{IntoRelationExpression, RelationExpression};
    pub use crate::result::QueryResult;
    pub use quarry_core::Boolean;
    pub use quarry_types::Dialect;
}
