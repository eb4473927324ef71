//! Operations are the recorded calls of a [`QueryBuilder`].
//!
//! Every builder method adds one operation to the builder's operation tree.
//! When the query runs, the builder calls the lifecycle hooks of all
//! operations wave by wave, in tree order:
//!
//! ```text
//! on_add -> on_before1 -> on_before2 -> on_before3 -> on_build -> on_build_knex
//!        -> (query_executor | connection) -> on_raw_result
//!        -> on_after1 -> on_after2 -> on_after3     (on_error on failure)
//! ```
//!
//! An operation only takes part in the waves named by [`Operation::hooks`].

mod delegate;
mod delete;
mod eager;
mod find;
mod find_by_id;
mod first;
mod from;
mod insert;
mod json;
mod knex;
mod merge;
mod returning;
mod select;
mod update;
mod where_composite;
mod where_in_composite;

use std::any::{Any, TypeId};
use std::fmt;

use bitflags::bitflags;
use quarry_core::SqlBuilder;
use smallvec::{SmallVec, smallvec};

use crate::args::Arg;
use crate::error::{QueryError, Result};
use crate::maybe_async::MaybeAsync;
use crate::model::{ModelRef, Relation};
use crate::query::QueryBuilder;
use crate::result::QueryResult;

pub use delegate::DelegateOperation;
pub use delete::DeleteOperation;
pub use eager::{EagerOperation, GraphAlgorithm, GraphOptions};
pub use find::FindOperation;
pub use find_by_id::{FindByIdOperation, FindByIdsOperation};
pub use first::FirstOperation;
pub use from::FromOperation;
pub use insert::{InsertAndFetchOperation, InsertOperation};
pub use json::{JsonFieldOperation, JsonHasOperation, JsonTypeOperation};
pub use knex::KnexOperation;
pub use merge::MergeOperation;
pub use returning::ReturningOperation;
pub use select::{SelectOperation, Selection};
pub use update::UpdateOperation;
pub use where_composite::WhereCompositeOperation;
pub use where_in_composite::{WhereInCompositeOperation, WhereInStrategy};

bitflags! {
    /// The hooks an operation implements.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Hooks: u16 {
        const ON_ADD = 1 << 0;
        const ON_BEFORE1 = 1 << 1;
        const ON_BEFORE2 = 1 << 2;
        const ON_BEFORE3 = 1 << 3;
        const ON_BUILD = 1 << 4;
        const ON_BUILD_KNEX = 1 << 5;
        const ON_RAW_RESULT = 1 << 6;
        const ON_AFTER1 = 1 << 7;
        const ON_AFTER2 = 1 << 8;
        const ON_AFTER3 = 1 << 9;
        const QUERY_EXECUTOR = 1 << 10;
        const ON_ERROR = 1 << 11;
    }
}

/// A single lifecycle hook. Operations added while a hook runs remember
/// which hook added them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    OnAdd,
    OnBefore1,
    OnBefore2,
    OnBefore3,
    OnBuild,
    OnBuildKnex,
    OnRawResult,
    OnAfter1,
    OnAfter2,
    OnAfter3,
    QueryExecutor,
    OnError,
}

impl Hook {
    pub const fn flag(self) -> Hooks {
        match self {
            Hook::OnAdd => Hooks::ON_ADD,
            Hook::OnBefore1 => Hooks::ON_BEFORE1,
            Hook::OnBefore2 => Hooks::ON_BEFORE2,
            Hook::OnBefore3 => Hooks::ON_BEFORE3,
            Hook::OnBuild => Hooks::ON_BUILD,
            Hook::OnBuildKnex => Hooks::ON_BUILD_KNEX,
            Hook::OnRawResult => Hooks::ON_RAW_RESULT,
            Hook::OnAfter1 => Hooks::ON_AFTER1,
            Hook::OnAfter2 => Hooks::ON_AFTER2,
            Hook::OnAfter3 => Hooks::ON_AFTER3,
            Hook::QueryExecutor => Hooks::QUERY_EXECUTOR,
            Hook::OnError => Hooks::ON_ERROR,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Hook::OnAdd => "on_add",
            Hook::OnBefore1 => "on_before1",
            Hook::OnBefore2 => "on_before2",
            Hook::OnBefore3 => "on_before3",
            Hook::OnBuild => "on_build",
            Hook::OnBuildKnex => "on_build_knex",
            Hook::OnRawResult => "on_raw_result",
            Hook::OnAfter1 => "on_after1",
            Hook::OnAfter2 => "on_after2",
            Hook::OnAfter3 => "on_after3",
            Hook::QueryExecutor => "query_executor",
            Hook::OnError => "on_error",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded builder call with lifecycle hooks.
///
/// Hooks that are not listed in [`Operation::hooks`] are never called, so
/// an operation only overrides the ones it declares. Synchronous hooks get
/// the builder mutably and may add child operations; asynchronous tails
/// returned through [`MaybeAsync`] run detached from the builder.
pub trait Operation: Any {
    /// The builder method name, in snake_case.
    fn name(&self) -> &str;

    fn hooks(&self) -> Hooks;

    fn clone_op(&self) -> Box<dyn Operation>;

    /// The operation types this operation counts as when selecting by
    /// type. Delegating operations add the types of their delegate.
    fn kinds(&self) -> SmallVec<[TypeId; 2]> {
        smallvec![Any::type_id(self)]
    }

    /// Records the arguments. Returning `false` drops the operation.
    fn on_add(&mut self, _builder: &mut QueryBuilder, _args: Vec<Arg>) -> Result<bool> {
        Ok(true)
    }

    fn on_before1(&mut self, _builder: &mut QueryBuilder) -> MaybeAsync<()> {
        MaybeAsync::ok(())
    }

    fn on_before2(&mut self, _builder: &mut QueryBuilder) -> MaybeAsync<()> {
        MaybeAsync::ok(())
    }

    fn on_before3(&mut self, _builder: &mut QueryBuilder) -> MaybeAsync<()> {
        MaybeAsync::ok(())
    }

    /// Runs before any SQL is built. May add further operations.
    fn on_build(&mut self, _builder: &mut QueryBuilder) -> Result<()> {
        Ok(())
    }

    /// Applies the operation to the SQL builder.
    fn on_build_knex(&mut self, knex: SqlBuilder, _builder: &QueryBuilder) -> Result<SqlBuilder> {
        Ok(knex)
    }

    fn on_raw_result(
        &mut self,
        _builder: &mut QueryBuilder,
        result: QueryResult,
    ) -> MaybeAsync<QueryResult> {
        MaybeAsync::ok(result)
    }

    fn on_after1(&mut self, _builder: &mut QueryBuilder, result: QueryResult) -> MaybeAsync<QueryResult> {
        MaybeAsync::ok(result)
    }

    fn on_after2(&mut self, _builder: &mut QueryBuilder, result: QueryResult) -> MaybeAsync<QueryResult> {
        MaybeAsync::ok(result)
    }

    fn on_after3(&mut self, _builder: &mut QueryBuilder, result: QueryResult) -> MaybeAsync<QueryResult> {
        MaybeAsync::ok(result)
    }

    /// Replaces the database round trip.
    fn query_executor(&mut self, _builder: &mut QueryBuilder) -> MaybeAsync<QueryResult> {
        MaybeAsync::ok(QueryResult::Empty)
    }

    /// Gets the error of a failed query. Returning a value recovers.
    fn on_error(&mut self, _builder: &mut QueryBuilder, error: QueryError) -> MaybeAsync<QueryResult> {
        MaybeAsync::err(error)
    }

    /// What becomes of the operation when the query is turned into a find
    /// query.
    fn as_find(&self, _builder: &QueryBuilder) -> AsFind {
        AsFind::Keep
    }

    // ---- values static hooks can look up ----

    fn relation(&self) -> Option<&Relation> {
        None
    }

    fn model_options(&self) -> Option<&ModelOptions> {
        None
    }

    fn items(&self) -> Option<&[ModelRef]> {
        None
    }

    fn input_items(&self) -> Option<&[ModelRef]> {
        None
    }
}

impl dyn Operation {
    /// `true` when the operation is, or delegates to, a `T`.
    pub fn is<T: Operation>(&self) -> bool {
        self.kinds().contains(&TypeId::of::<T>())
    }

    pub fn downcast_ref<T: Operation>(&self) -> Option<&T> {
        (self as &dyn Any).downcast_ref()
    }

    pub fn downcast_mut<T: Operation>(&mut self) -> Option<&mut T> {
        (self as &mut dyn Any).downcast_mut()
    }
}

impl fmt::Debug for dyn Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name())
            .field("hooks", &self.hooks())
            .finish()
    }
}

/// The find query counterpart of an operation.
pub enum AsFind {
    Keep,
    Drop,
    Replace(Box<dyn Operation>),
}

/// Options of the models an insert or update works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModelOptions {
    /// The update only touches the given properties
    pub patch: bool,
}

/// Implements the bookkeeping methods every operation shares.
macro_rules! operation_common {
    ($hooks:expr) => {
        fn name(&self) -> &str {
            &self.name
        }

        fn hooks(&self) -> $crate::operation::Hooks {
            $hooks
        }

        fn clone_op(&self) -> Box<dyn $crate::operation::Operation> {
            Box::new(self.clone())
        }
    };
}

pub(crate) use operation_common;
