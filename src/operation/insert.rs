use std::any::TypeId;
use std::rc::Rc;

use quarry_core::{Dialect, SqlArg, SqlBuilder};
use serde_json::Value;
use smallvec::SmallVec;

use super::{AsFind, DelegateOperation, Hooks, ModelOptions, Operation, operation_common};
use crate::args::{Arg, ArgConverter, should_be_added};
use crate::error::{QueryError, Result};
use crate::hooks::{StaticHookCall, call_instance_hooks};
use crate::maybe_async::MaybeAsync;
use crate::model::{InstanceHooks, ModelClass, ModelRef};
use crate::query::{ChildQueryOptions, QueryBuilder, Selector};
use crate::result::QueryResult;

/// A model to write plus the properties given as SQL (`raw`, `ref_`, a
/// subquery) that cannot live in the model's JSON payload.
#[derive(Debug, Clone)]
pub(crate) struct InputModel {
    pub model: ModelRef,
    pub sql_values: Vec<(String, Arg)>,
}

impl InputModel {
    /// Converts the model to a SQL builder row.
    pub fn to_row(&self, converter: &ArgConverter<'_>) -> Result<SqlArg> {
        let mut row: Vec<_> = self
            .model
            .to_database_json()
            .into_iter()
            .map(|(key, value)| (key.into(), SqlArg::Value(value)))
            .collect();
        for (index, (key, value)) in self.sql_values.iter().enumerate() {
            if let Some(value) = converter.convert(index, value)? {
                row.push((key.as_str().into(), value));
            }
        }
        Ok(SqlArg::Map(row))
    }
}

/// Turns an insert or update argument into models.
pub(crate) fn input_models(class: &Rc<dyn ModelClass>, arg: Arg) -> Result<Vec<InputModel>> {
    match arg {
        Arg::Model(model) => Ok(vec![InputModel {
            model,
            sql_values: Vec::new(),
        }]),
        Arg::Value(value @ Value::Object(_)) => Ok(vec![InputModel {
            model: ModelRef::from_json(class.clone(), value)?,
            sql_values: Vec::new(),
        }]),
        Arg::Object(entries) => {
            let mut data = serde_json::Map::new();
            let mut sql_values = Vec::new();
            for (key, value) in entries {
                match value.to_json() {
                    Some(json) => {
                        data.insert(key, json);
                    }
                    None => sql_values.push((key, value)),
                }
            }
            Ok(vec![InputModel {
                model: ModelRef::new(class.clone(), data),
                sql_values,
            }])
        }
        Arg::Array(items) => {
            let mut models = Vec::with_capacity(items.len());
            for item in items {
                models.extend(input_models(class, item)?);
            }
            Ok(models)
        }
        other => Err(QueryError::NotAModel {
            table: class.table_name().to_string(),
            found: format!("{other:?}"),
        }),
    }
}

/// `insert(models)`.
#[derive(Debug, Clone)]
pub struct InsertOperation {
    name: String,
    inputs: Vec<InputModel>,
    models: Vec<ModelRef>,
    is_array: bool,
    model_options: ModelOptions,
}

impl InsertOperation {
    pub fn new() -> Self {
        Self {
            name: "insert".to_string(),
            inputs: Vec::new(),
            models: Vec::new(),
            is_array: false,
            model_options: ModelOptions::default(),
        }
    }

    pub fn models(&self) -> &[ModelRef] {
        &self.models
    }

    /// Copies returned rows or generated identifiers onto the models.
    /// Identifiers given by the caller are kept.
    fn reconcile(&self, result: QueryResult) -> Result<()> {
        match result {
            QueryResult::Rows(rows) => {
                for (model, row) in self.models.iter().zip(rows) {
                    model.set_database_json(row);
                }
            }
            QueryResult::Ids(ids) => {
                for (model, id) in self.models.iter().zip(ids) {
                    if !model.has_id() {
                        model.set_id(id)?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl Default for InsertOperation {
    fn default() -> Self {
        Self::new()
    }
}

impl Operation for InsertOperation {
    operation_common!(
        Hooks::ON_ADD | Hooks::ON_BEFORE2 | Hooks::ON_BUILD_KNEX | Hooks::ON_AFTER1 | Hooks::ON_AFTER2
    );

    fn on_add(&mut self, builder: &mut QueryBuilder, args: Vec<Arg>) -> Result<bool> {
        if !should_be_added(&self.name, builder, &args)? {
            return Ok(false);
        }
        let Some(arg) = args.into_iter().next() else {
            return Ok(true);
        };
        self.is_array = arg.is_array();
        self.inputs = input_models(builder.model_class(), arg)?;
        self.models = self.inputs.iter().map(|input| input.model.clone()).collect();
        Ok(true)
    }

    fn on_before2(&mut self, builder: &mut QueryBuilder) -> MaybeAsync<()> {
        let dialect = builder.dialect();
        if self.models.len() > 1 && !dialect.supports_batch_insert() {
            return MaybeAsync::err(QueryError::BatchInsertUnsupported { dialect });
        }

        let ctx = builder.context();
        let instance = call_instance_hooks(&self.models, InstanceHooks::BEFORE_INSERT, |class, model| {
            class.model_before_insert(model, &ctx)
        });
        let static_hook = StaticHookCall::new(builder, &*self);
        instance.and_then(move |()| static_hook.before(|class, args| class.before_insert(args)))
    }

    fn on_build_knex(&mut self, mut knex: SqlBuilder, builder: &QueryBuilder) -> Result<SqlBuilder> {
        let dialect = knex.dialect();
        if !matches!(dialect, Dialect::SQLite | Dialect::MySQL) && !builder.has(Selector::returning()) {
            knex = knex.returning(builder.model_class().id_columns().iter().copied());
        }

        let converter = ArgConverter::new(builder, &self.name);
        let rows = self
            .inputs
            .iter()
            .map(|input| input.to_row(&converter))
            .collect::<Result<Vec<_>>>()?;
        Ok(knex.call("insert", vec![SqlArg::List(rows)])?)
    }

    fn on_after1(&mut self, _builder: &mut QueryBuilder, result: QueryResult) -> MaybeAsync<QueryResult> {
        match self.reconcile(result) {
            Ok(()) => MaybeAsync::ok(QueryResult::Models(self.models.clone())),
            Err(error) => MaybeAsync::err(error),
        }
    }

    fn on_after2(&mut self, builder: &mut QueryBuilder, result: QueryResult) -> MaybeAsync<QueryResult> {
        let models = result.into_models();
        let result = if self.is_array {
            QueryResult::Models(models)
        } else {
            QueryResult::Model(models.into_iter().next())
        };

        let ctx = builder.context();
        let instance = call_instance_hooks(&self.models, InstanceHooks::AFTER_INSERT, |class, model| {
            class.model_after_insert(model, &ctx)
        });
        let static_hook = StaticHookCall::new(builder, &*self);
        instance.and_then(move |()| static_hook.after(result, |class, args| class.after_insert(args)))
    }

    fn as_find(&self, _builder: &QueryBuilder) -> AsFind {
        AsFind::Drop
    }

    fn model_options(&self) -> Option<&ModelOptions> {
        Some(&self.model_options)
    }

    fn input_items(&self) -> Option<&[ModelRef]> {
        Some(&self.models)
    }
}

/// An insert followed by a query that fetches the inserted rows by
/// identifier and merges them into the inserted models.
#[derive(Clone)]
pub struct InsertAndFetchOperation {
    name: String,
    base: DelegateOperation,
}

impl InsertAndFetchOperation {
    pub fn new() -> Self {
        Self {
            name: "insert_and_fetch".to_string(),
            base: DelegateOperation::new("insert_and_fetch", Box::new(InsertOperation::new())),
        }
    }

    /// Wraps `delegate`, which has to be an insert.
    pub fn with_delegate(delegate: Box<dyn Operation>) -> Result<Self> {
        if !delegate.is::<InsertOperation>() {
            return Err(QueryError::InvalidDelegate {
                expected: "insert",
                found: delegate.name().to_string(),
            });
        }
        Ok(Self {
            name: "insert_and_fetch".to_string(),
            base: DelegateOperation::new("insert_and_fetch", delegate),
        })
    }

    fn fetch_query(&self, builder: &QueryBuilder, models: &[ModelRef]) -> QueryBuilder {
        let ids: Vec<Value> = models.iter().map(ModelRef::id).collect();
        let mut fetch = QueryBuilder::for_class(builder.model_class().clone());
        fetch
            .child_query_of(builder, ChildQueryOptions::default())
            .find_by_ids(Value::Array(ids));
        fetch
    }
}

impl Default for InsertAndFetchOperation {
    fn default() -> Self {
        Self::new()
    }
}

impl Operation for InsertAndFetchOperation {
    fn name(&self) -> &str {
        &self.name
    }

    fn hooks(&self) -> Hooks {
        self.base.hooks() | Hooks::ON_AFTER2
    }

    fn clone_op(&self) -> Box<dyn Operation> {
        Box::new(self.clone())
    }

    fn kinds(&self) -> SmallVec<[TypeId; 2]> {
        let mut kinds = self.base.kinds();
        kinds.insert(0, TypeId::of::<Self>());
        kinds
    }

    fn on_add(&mut self, builder: &mut QueryBuilder, args: Vec<Arg>) -> Result<bool> {
        self.base.on_add(builder, args)
    }

    fn on_before2(&mut self, builder: &mut QueryBuilder) -> MaybeAsync<()> {
        self.base.on_before2(builder)
    }

    fn on_build_knex(&mut self, knex: SqlBuilder, builder: &QueryBuilder) -> Result<SqlBuilder> {
        self.base.on_build_knex(knex, builder)
    }

    fn on_after1(&mut self, builder: &mut QueryBuilder, result: QueryResult) -> MaybeAsync<QueryResult> {
        self.base.on_after1(builder, result)
    }

    fn on_after2(&mut self, builder: &mut QueryBuilder, result: QueryResult) -> MaybeAsync<QueryResult> {
        let models = self.base.input_items().unwrap_or_default().to_vec();
        let fetch = self.fetch_query(builder, &models);
        let inserted = self.base.on_after2(builder, result);

        MaybeAsync::pending(async move {
            let inserted = inserted.await?;
            let fetched = fetch.execute().await?.into_models();
            for model in &models {
                let id = model.id();
                if let Some(fresh) = fetched.iter().find(|fresh| fresh.id() == id) {
                    model.set_json(fresh.to_json());
                }
            }
            Ok(inserted)
        })
    }

    fn as_find(&self, builder: &QueryBuilder) -> AsFind {
        self.base.as_find(builder)
    }

    fn model_options(&self) -> Option<&ModelOptions> {
        self.base.model_options()
    }

    fn input_items(&self) -> Option<&[ModelRef]> {
        self.base.input_items()
    }
}
