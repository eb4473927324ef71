//! Rewrites applied to nested query builders before they are compiled as
//! subqueries of a parent query.

use quarry_core::Dialect;

use crate::operation::KnexOperation;
use crate::query::{QueryBuilder, Selector};

const MYSQL_SUBQUERY_ALIAS: &str = "mysql_subquery_fix";

/// MySQL refuses statements like
///
/// ```sql
/// update foo set bar = 1 where id in (select id from foo)
/// ```
///
/// because the subquery reads the table the statement modifies. Such
/// subqueries of `update` and `delete` queries are wrapped into
/// `select * from (...) as mysql_subquery_fix`, which MySQL materializes
/// first.
pub(crate) fn wrap_mysql_modify_subquery(query: QueryBuilder, parent: &QueryBuilder) -> QueryBuilder {
    if parent.dialect() != Dialect::MySQL {
        return query;
    }
    if !parent.is_update() && !parent.is_delete() {
        return query;
    }

    let parent_table = parent.table_name();
    if query.table_name() != parent_table && !has_joins_to_table(&query, &parent_table) {
        return query;
    }

    let mut inner = query;
    inner.as_(MYSQL_SUBQUERY_ALIAS);
    let mut wrapper = QueryBuilder::for_class(inner.model_class().clone());
    wrapper.from(inner);
    wrapper
}

fn has_joins_to_table(query: &QueryBuilder, table: &str) -> bool {
    let mut found = false;
    query.for_each_operation(Selector::join(), true, |op| {
        let joined = op
            .downcast_ref::<KnexOperation>()
            .and_then(|knex| knex.args().first())
            .and_then(|arg| arg.as_str());
        found = joined == Some(table);
        !found
    });
    found
}
