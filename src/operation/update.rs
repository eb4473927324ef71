use indexmap::IndexMap;
use quarry_core::{Binding, SQL, SqlArg, SqlBuilder};
use serde_json::Value;

use super::insert::{InputModel, input_models};
use super::{AsFind, Hooks, ModelOptions, Operation, operation_common};
use crate::args::{Arg, ArgConverter, should_be_added};
use crate::error::{QueryError, Result};
use crate::field_expression::FieldExpression;
use crate::hooks::{StaticHookCall, call_instance_hooks};
use crate::maybe_async::MaybeAsync;
use crate::model::{InstanceHooks, ModelRef};
use crate::query::QueryBuilder;
use crate::result::QueryResult;

/// `update(values)` and `patch(values)`.
#[derive(Debug, Clone)]
pub struct UpdateOperation {
    name: String,
    input: Option<InputModel>,
    models: Vec<ModelRef>,
    model_options: ModelOptions,
}

impl UpdateOperation {
    pub fn new(name: impl Into<String>, patch: bool) -> Self {
        Self {
            name: name.into(),
            input: None,
            models: Vec::new(),
            model_options: ModelOptions { patch },
        }
    }

    pub fn model(&self) -> Option<&ModelRef> {
        self.models.first()
    }
}

impl Operation for UpdateOperation {
    operation_common!(
        Hooks::ON_ADD | Hooks::ON_BEFORE2 | Hooks::ON_BEFORE3 | Hooks::ON_BUILD_KNEX | Hooks::ON_AFTER2
    );

    fn on_add(&mut self, builder: &mut QueryBuilder, args: Vec<Arg>) -> Result<bool> {
        if !should_be_added(&self.name, builder, &args)? {
            return Ok(false);
        }
        let Some(arg) = args.into_iter().next() else {
            return Ok(true);
        };
        let input = input_models(builder.model_class(), arg)?
            .into_iter()
            .next()
            .ok_or_else(|| QueryError::NotAModel {
                table: builder.model_class().table_name().to_string(),
                found: "[]".to_string(),
            })?;
        self.models = vec![input.model.clone()];
        self.input = Some(input);
        Ok(true)
    }

    fn on_before2(&mut self, builder: &mut QueryBuilder) -> MaybeAsync<()> {
        let ctx = builder.context();
        let patch = self.model_options.patch;
        let instance = call_instance_hooks(&self.models, InstanceHooks::BEFORE_UPDATE, |class, model| {
            class.model_before_update(model, patch, &ctx)
        });
        let static_hook = StaticHookCall::new(builder, &*self);
        instance.and_then(move |()| static_hook.before(|class, args| class.before_update(args)))
    }

    fn on_before3(&mut self, builder: &mut QueryBuilder) -> MaybeAsync<()> {
        let empty = self
            .input
            .as_ref()
            .is_none_or(|input| input.sql_values.is_empty() && input.model.to_database_json().is_empty());
        if empty {
            builder.resolve(QueryResult::Count(0));
        }
        MaybeAsync::ok(())
    }

    fn on_build_knex(&mut self, knex: SqlBuilder, builder: &QueryBuilder) -> Result<SqlBuilder> {
        let Some(input) = &self.input else {
            return Ok(knex);
        };
        let values = convert_field_expressions(builder, &self.name, input)?;
        Ok(knex.call("update", vec![SqlArg::Map(values)])?)
    }

    fn on_after2(&mut self, builder: &mut QueryBuilder, result: QueryResult) -> MaybeAsync<QueryResult> {
        let ctx = builder.context();
        let patch = self.model_options.patch;
        let instance = call_instance_hooks(&self.models, InstanceHooks::AFTER_UPDATE, |class, model| {
            class.model_after_update(model, patch, &ctx)
        });
        let static_hook = StaticHookCall::new(builder, &*self);
        instance.and_then(move |()| static_hook.after(result, |class, args| class.after_update(args)))
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

/// The column assignments of `input`. A `column:json.path` key becomes a
/// `jsonb_set` of the column and is removed from the model.
pub(crate) fn convert_field_expressions(
    builder: &QueryBuilder,
    operation: &str,
    input: &InputModel,
) -> Result<Vec<(compact_str::CompactString, SqlArg)>> {
    let converter = ArgConverter::new(builder, operation);
    let mut entries: Vec<(String, SqlArg)> = input
        .model
        .to_database_json()
        .into_iter()
        .map(|(key, value)| (key, SqlArg::Value(value)))
        .collect();
    for (index, (key, value)) in input.sql_values.iter().enumerate() {
        if let Some(value) = converter.convert(index, value)? {
            entries.push((key.clone(), value));
        }
    }

    let caches = builder.caches();
    let mut converted: IndexMap<String, SqlArg> = IndexMap::with_capacity(entries.len());
    for (key, value) in entries {
        if !key.contains(':') {
            converted.insert(key, value);
            continue;
        }

        let parsed = FieldExpression::parse_cached(&caches.fields, &key)?;
        let (placeholder, value) = match value {
            SqlArg::Sql(sql) => ("to_jsonb(?)", Binding::Sql(sql)),
            SqlArg::Query(query) => ("to_jsonb(?)", Binding::Sql(query.to_subquery()?)),
            other => {
                let json = other.to_json()?;
                ("?", Binding::Value(Value::String(json.to_string())))
            }
        };
        // Earlier paths into the same column nest, and the column keeps the
        // place it was first set at.
        let target = match converted.get(&parsed.column) {
            Some(SqlArg::Sql(previous)) => Binding::Sql(previous.clone()),
            _ => Binding::Value(Value::String(parsed.column.clone())),
        };
        let sql = SQL::raw_with_bindings(
            &format!("jsonb_set(??, '{}', {placeholder}, true)", parsed.json_path()),
            [target, value],
        )?;

        input.model.remove(&key);
        converted.insert(parsed.column, SqlArg::Sql(sql));
    }

    Ok(converted
        .into_iter()
        .map(|(key, value)| (key.into(), value))
        .collect())
}
