//! Building and running a query.
//!
//! Execution works on a clone of the builder and runs the hook waves in
//! this order:
//!
//! 1. `on_before1`, `on_before2`, `on_before3`
//! 2. a value passed to [`QueryBuilder::resolve`] skips the remaining
//!    waves up to step 6
//! 3. `query_executor` of the last operation that has one skips to step 6
//! 4. `on_build`, `on_build_knex`, then the statement runs on the connection
//! 5. `on_raw_result`, rows to models (find queries), `on_after1`, `on_after2`
//! 6. `on_after3`
//!
//! A failure anywhere is handed to the `on_error` hooks, the first one
//! returning a value recovers the query.

use quarry_core::{CompiledQuery, Method, SqlBuilder};

use super::{QueryBuilder, Selector};
use crate::connection::RawResult;
use crate::error::{QueryError, Result};
use crate::maybe_async::MaybeAsync;
use crate::model::ModelRef;
use crate::operation::{FindOperation, FromOperation, Hook, Operation};
use crate::result::QueryResult;

type SyncHook<'f> = &'f mut dyn FnMut(&mut dyn Operation, &mut QueryBuilder) -> Result<()>;

impl QueryBuilder {
    /// Builds the SQL builder for this query. Runs the `on_build` and
    /// `on_build_knex` waves.
    pub fn to_knex_query(&mut self) -> Result<SqlBuilder> {
        self.check_rejection()?;
        self.sync_wave(Hook::OnBuild, &mut |op, builder| op.on_build(builder))?;

        let mut knex = SqlBuilder::new(self.dialect());
        for id in self.tree.pre_order() {
            let Some(mut op) = self.begin_hook(id, Hook::OnBuildKnex) else {
                continue;
            };
            let built = op.on_build_knex(knex, self);
            self.end_hook(id, op);
            knex = built?;
        }

        Ok(self.apply_defaults(knex))
    }

    /// Adds the model table and a `table.*` select unless the operations
    /// chose their own.
    fn apply_defaults(&self, mut knex: SqlBuilder) -> SqlBuilder {
        if self.partial {
            return knex;
        }

        let from = self.find_last_operation(Selector::from());
        let table = self.table_name();
        let table_ref = self.table_ref();

        if from.is_none() {
            knex = if table == table_ref {
                knex.table(&table)
            } else {
                knex.table(&format!("{table} as {table_ref}"))
            };
        }

        let from_table = from.is_none_or(|op| {
            op.downcast_ref::<FromOperation>()
                .is_some_and(FromOperation::is_table)
        });
        if !self.has(Selector::select()) && from_table {
            knex = knex.select([format!("{table_ref}.*")]);
        }
        knex
    }

    /// Renders the query without running it.
    pub fn to_sql(&self) -> Result<CompiledQuery> {
        let mut builder = self.clone();
        Ok(builder.to_knex_query()?.to_sql()?)
    }

    /// Runs the query.
    pub async fn execute(&self) -> Result<QueryResult> {
        let mut builder = self.clone();
        builder.add_implicit_operations();

        match builder.run().await {
            Ok(result) => Ok(result),
            Err(error) => builder.handle_error(error).await,
        }
    }

    fn add_implicit_operations(&mut self) {
        if self.is_find() && !self.has(Selector::kind::<FindOperation>()) {
            self.add_operation_to_front(FindOperation::new(), Vec::new());
        }
    }

    async fn run(&mut self) -> Result<QueryResult> {
        let mut resolved = None;
        for hook in [Hook::OnBefore1, Hook::OnBefore2, Hook::OnBefore3] {
            self.before_wave(hook).await?;
            if let Some(resolution) = self.take_resolution() {
                quarry_core::quarry_trace_resolve!(hook);
                resolved = Some(resolution);
                break;
            }
        }

        let result = match resolved {
            Some(resolution) => resolution?,
            None => match self.query_executor_id() {
                Some(id) => self.run_query_executor(id).await?,
                None => self.run_query().await?,
            },
        };

        self.after_wave(Hook::OnAfter3, result).await
    }

    async fn run_query(&mut self) -> Result<QueryResult> {
        let knex = self.to_knex_query()?;
        let compiled = knex.to_sql()?;
        quarry_core::quarry_trace_query!(&compiled.sql, compiled.bindings.len());

        let connection = self
            .connection()
            .ok_or_else(|| QueryError::NoConnection {
                table: self.model_class.table_name().to_string(),
            })?;
        let raw = connection.execute(&compiled).await?;

        let mut result = self
            .after_wave(Hook::OnRawResult, raw_to_result(compiled.method, raw))
            .await?;
        if self.is_find() {
            result = self.create_models(result);
        }
        let result = self.after_wave(Hook::OnAfter1, result).await?;
        self.after_wave(Hook::OnAfter2, result).await
    }

    fn query_executor_id(&self) -> Option<super::OpId> {
        let ids = self.tree.pre_order();
        ids.into_iter()
            .rev()
            .find(|id| self.tree.is_callable(*id, Hook::QueryExecutor))
    }

    async fn run_query_executor(&mut self, id: super::OpId) -> Result<QueryResult> {
        let Some(mut op) = self.begin_hook(id, Hook::QueryExecutor) else {
            return Ok(QueryResult::Empty);
        };
        let step = op.query_executor(self);
        self.end_hook(id, op);
        step.await
    }

    fn create_models(&self, result: QueryResult) -> QueryResult {
        match result {
            QueryResult::Rows(rows) => QueryResult::Models(
                rows.into_iter()
                    .map(|row| ModelRef::from_database_json(self.model_class.clone(), row))
                    .collect(),
            ),
            other => other,
        }
    }

    async fn handle_error(&mut self, mut error: QueryError) -> Result<QueryResult> {
        for id in self.tree.pre_order() {
            let Some(mut op) = self.begin_hook(id, Hook::OnError) else {
                continue;
            };
            let step = op.on_error(self, error);
            self.end_hook(id, op);
            match step.await {
                Ok(result) => return Ok(result),
                Err(next) => error = next,
            }
        }
        Err(error)
    }

    // =========================================================================
    // Waves
    // =========================================================================

    /// Calls `hook` on every operation that has it, each operation before
    /// its children. Operations a hook adds are visited in the same wave.
    fn sync_wave(&mut self, hook: Hook, f: SyncHook<'_>) -> Result<()> {
        for id in self.tree.roots().to_vec() {
            self.sync_visit(id, hook, f)?;
        }
        Ok(())
    }

    fn sync_visit(&mut self, id: super::OpId, hook: Hook, f: SyncHook<'_>) -> Result<()> {
        if let Some(mut op) = self.begin_hook(id, hook) {
            let called = f(op.as_mut(), self);
            self.end_hook(id, op);
            called?;
        }
        for child in self.tree.children(id).to_vec() {
            self.sync_visit(child, hook, f)?;
        }
        Ok(())
    }

    /// Runs the synchronous part of every `hook` call first, then awaits
    /// whatever they left pending, together.
    async fn before_wave(&mut self, hook: Hook) -> Result<()> {
        let mut pending = Vec::new();
        self.sync_wave(hook, &mut |op, builder| {
            pending.push(match hook {
                Hook::OnBefore1 => op.on_before1(builder),
                Hook::OnBefore2 => op.on_before2(builder),
                _ => op.on_before3(builder),
            });
            Ok(())
        })?;
        MaybeAsync::join_all(pending).await?;
        Ok(())
    }

    /// Threads `result` through the `hook` of each operation in turn. The
    /// operations are the ones present when the wave starts.
    async fn after_wave(&mut self, hook: Hook, mut result: QueryResult) -> Result<QueryResult> {
        for id in self.tree.pre_order() {
            let Some(mut op) = self.begin_hook(id, hook) else {
                continue;
            };
            let step = match hook {
                Hook::OnRawResult => op.on_raw_result(self, result),
                Hook::OnAfter1 => op.on_after1(self, result),
                Hook::OnAfter2 => op.on_after2(self, result),
                _ => op.on_after3(self, result),
            };
            self.end_hook(id, op);
            result = step.await?;
        }
        Ok(result)
    }
}

fn raw_to_result(method: Method, raw: RawResult) -> QueryResult {
    match method {
        Method::Select => QueryResult::Rows(raw.rows),
        Method::Insert if raw.rows.is_empty() => QueryResult::Ids(raw.ids),
        Method::Update | Method::Delete if raw.rows.is_empty() => QueryResult::Count(raw.affected),
        Method::Insert | Method::Update | Method::Delete => QueryResult::Rows(raw.rows),
    }
}
