// Runs compiled query plans against the store and returns rows as JSON
// objects keyed by column name, the shape tool results are fed back to the
// model in.

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::{Map, Number, Value};

use crate::error::ToolError;
use crate::plan::QueryPlan;

fn column_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}

/// Execute a plan, binding parameters positionally. Store-level failures
/// (including a malformed compiled statement) surface as `Execution`,
/// attributable to the one tool call that produced the plan.
pub fn run_plan(conn: &Connection, plan: &QueryPlan) -> Result<Vec<Value>, ToolError> {
    let mut stmt = conn
        .prepare(&plan.sql)
        .map_err(|e| ToolError::Execution(format!("prepare failed: {}", e)))?;

    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = stmt
        .query(rusqlite::params_from_iter(plan.params.iter()))
        .map_err(|e| ToolError::Execution(format!("bind failed: {}", e)))?;

    let mut out = Vec::new();
    loop {
        let row = match rows.next() {
            Ok(Some(row)) => row,
            Ok(None) => break,
            Err(e) => return Err(ToolError::Execution(format!("row fetch failed: {}", e))),
        };

        let mut obj = Map::new();
        for (idx, name) in columns.iter().enumerate() {
            let value = row
                .get_ref(idx)
                .map_err(|e| ToolError::Execution(format!("column read failed: {}", e)))?;
            obj.insert(name.clone(), column_value(value));
        }
        out.push(Value::Object(obj));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_fixtures::seeded_connection;
    use crate::plan::{QueryBuilder, SortOrder};

    #[test]
    fn test_rows_keyed_by_column_name() {
        let conn = seeded_connection();

        let mut qb = QueryBuilder::new(
            "SELECT name, party, state FROM deputies",
        );
        qb.filter("state = ?", "SP".to_string())
            .order_by("name", SortOrder::Asc);
        let rows = run_plan(&conn, &qb.build()).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["name"], "Ana Souza");
        assert_eq!(rows[0]["party"], "PT");
    }

    #[test]
    fn test_empty_result_is_ok_not_error() {
        let conn = seeded_connection();

        let mut qb = QueryBuilder::new("SELECT name FROM deputies");
        qb.filter("state = ?", "AC".to_string());
        let rows = run_plan(&conn, &qb.build()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_malformed_plan_is_execution_error() {
        let conn = seeded_connection();
        let plan = QueryPlan {
            sql: "SELECT nope FROM nowhere".to_string(),
            params: vec![],
        };
        let err = run_plan(&conn, &plan).unwrap_err();
        assert!(matches!(err, ToolError::Execution(_)));
    }
}
