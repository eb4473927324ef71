use ::rusqlite::types::{Value as SqliteValue, ValueRef};
use ::rusqlite::{Connection as RusqliteConnection, params_from_iter};
use futures_util::FutureExt;
use futures_util::future::{self, LocalBoxFuture};
use quarry_core::{CompiledQuery, Dialect, Method};
use serde_json::{Number, Value};

use super::{Connection, RawResult};
use crate::error::Result;
use crate::model::Row;

/// [`Connection`] over a rusqlite connection. Statements run synchronously.
#[derive(Debug)]
pub struct SqliteConnection {
    conn: RusqliteConnection,
}

impl SqliteConnection {
    pub const fn new(conn: RusqliteConnection) -> Self {
        Self { conn }
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(RusqliteConnection::open_in_memory()?))
    }

    /// Gets a reference to the underlying connection
    pub fn conn(&self) -> &RusqliteConnection {
        &self.conn
    }

    fn run(&self, query: &CompiledQuery) -> Result<RawResult> {
        let mut stmt = self.conn.prepare(&query.sql)?;
        let params = params_from_iter(query.bindings.iter().map(to_sqlite));

        if stmt.column_count() > 0 {
            let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
            let mut rows = stmt.query(params)?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut record = Row::new();
                for (i, column) in columns.iter().enumerate() {
                    record.insert(column.clone(), from_sqlite(row.get_ref(i)?));
                }
                out.push(record);
            }
            return Ok(RawResult {
                affected: out.len() as u64,
                rows: out,
                ids: Vec::new(),
            });
        }

        let affected = stmt.execute(params)? as u64;
        let ids = if query.method == Method::Insert && affected > 0 {
            vec![Value::from(self.conn.last_insert_rowid())]
        } else {
            Vec::new()
        };
        Ok(RawResult {
            rows: Vec::new(),
            affected,
            ids,
        })
    }
}

impl Connection for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::SQLite
    }

    fn execute<'a>(&'a self, query: &'a CompiledQuery) -> LocalBoxFuture<'a, Result<RawResult>> {
        future::ready(self.run(query)).boxed_local()
    }
}

fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqliteValue::Integer(i),
            None => SqliteValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqliteValue::Text(s.clone()),
        other => SqliteValue::Text(other.to_string()),
    }
}

fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(r) => Number::from_f64(r).map_or(Value::Null, Value::Number),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(blob) => Value::Array(blob.iter().map(|b| Value::from(*b)).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compiled(sql: &str, bindings: Vec<Value>, method: Method) -> CompiledQuery {
        CompiledQuery {
            sql: sql.to_string(),
            bindings,
            method,
            returning: Vec::new(),
        }
    }

    #[tokio::test]
    async fn rows_and_generated_ids() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.conn()
            .execute_batch("create table t (id integer primary key, name text, score real)")
            .unwrap();

        let inserted = conn
            .execute(&compiled(
                r#"insert into "t" ("name", "score") values (?, ?)"#,
                vec![json!("a"), json!(1.5)],
                Method::Insert,
            ))
            .await
            .unwrap();
        assert_eq!(inserted.ids, vec![json!(1)]);
        assert_eq!(inserted.affected, 1);

        let selected = conn
            .execute(&compiled(r#"select * from "t""#, vec![], Method::Select))
            .await
            .unwrap();
        assert_eq!(
            Value::Object(selected.rows[0].clone()),
            json!({ "id": 1, "name": "a", "score": 1.5 })
        );
    }
}
