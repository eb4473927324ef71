use super::{Hooks, Operation, operation_common};
use crate::args::Arg;
use crate::error::{QueryError, Result};
use crate::query::QueryBuilder;

/// `find_by_id(id)`: a `where` on the identifier columns. Composite
/// identifiers are given as arrays.
#[derive(Debug, Clone)]
pub struct FindByIdOperation {
    name: String,
    id: Arg,
}

impl FindByIdOperation {
    pub fn new() -> Self {
        Self {
            name: "find_by_id".to_string(),
            id: Arg::Undefined,
        }
    }

    pub fn id(&self) -> &Arg {
        &self.id
    }
}

impl Default for FindByIdOperation {
    fn default() -> Self {
        Self::new()
    }
}

impl Operation for FindByIdOperation {
    operation_common!(Hooks::ON_ADD | Hooks::ON_BUILD);

    fn on_add(&mut self, _builder: &mut QueryBuilder, args: Vec<Arg>) -> Result<bool> {
        if self.id.is_undefined()
            && let Some(id) = args.into_iter().next()
        {
            self.id = id;
        }
        Ok(true)
    }

    fn on_build(&mut self, builder: &mut QueryBuilder) -> Result<()> {
        if self.id.is_undefined() && !builder.internal_options().skip_undefined {
            return Err(QueryError::UndefinedId {
                operation: self.name.clone(),
            });
        }
        let columns = builder.full_id_column();
        builder.where_composite((columns, self.id.clone()));
        Ok(())
    }
}

/// `find_by_ids(ids)`: a `where in` on the identifier columns.
#[derive(Debug, Clone)]
pub struct FindByIdsOperation {
    name: String,
    ids: Arg,
}

impl FindByIdsOperation {
    pub fn new() -> Self {
        Self {
            name: "find_by_ids".to_string(),
            ids: Arg::Undefined,
        }
    }
}

impl Default for FindByIdsOperation {
    fn default() -> Self {
        Self::new()
    }
}

impl Operation for FindByIdsOperation {
    operation_common!(Hooks::ON_ADD | Hooks::ON_BUILD);

    fn on_add(&mut self, _builder: &mut QueryBuilder, args: Vec<Arg>) -> Result<bool> {
        self.ids = args.into_iter().next().unwrap_or(Arg::Undefined);
        Ok(true)
    }

    fn on_build(&mut self, builder: &mut QueryBuilder) -> Result<()> {
        let columns = builder.full_id_column();
        builder.where_in_composite(columns, self.ids.clone());
        Ok(())
    }
}
