// Zero-inclusive expense statistics.
//
// The population for an average is the full deputy roster of the group, not
// just the deputies that happen to have expense rows in the period. Per-
// deputy totals are computed in a subquery and LEFT JOINed back onto the
// deputies table, so a deputy with no matching expenses contributes a zero
// total and still counts in the denominator.

use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use serde_json::Value;

use crate::error::ToolError;
use crate::executor::run_plan;
use crate::plan::{QueryBuilder, QueryPlan};
use crate::resolver::resolve_party;
use crate::tools::{apply_period_filters, Args};

fn order_clause(args: &Args) -> &'static str {
    match args.get_str("order_by") {
        Some("avg_asc") => "avg_per_deputy ASC",
        Some("avg_desc") => "avg_per_deputy DESC",
        Some("total_asc") => "total ASC",
        _ => "total DESC",
    }
}

pub fn statistics(conn: &Connection, args: &Args) -> Result<Value, ToolError> {
    let group_by = args.get_str("group_by").unwrap_or("none");

    // Period filters go INSIDE the subquery. Putting them on the outer
    // query would turn the LEFT JOIN into an inner join and silently drop
    // the zero-expense deputies from the population.
    let mut inner = QueryBuilder::new(
        "SELECT e.deputy_id AS deputy_id, SUM(e.net_value) AS total FROM expenses e",
    );
    apply_period_filters(&mut inner, args, false);
    inner.group_by("e.deputy_id");
    let inner_plan = inner.build();

    let (key_select, key_group) = match group_by {
        "state" => ("d.state AS state, ", Some("d.state")),
        "party" => ("d.party AS party, ", Some("d.party")),
        _ => ("", None),
    };

    // MIN/MAX deliberately skip the NULLs from zero-expense deputies:
    // they bound the spenders, while the average counts everyone.
    let mut sql = format!(
        "SELECT {}COUNT(DISTINCT d.id) AS deputy_count, \
         COALESCE(SUM(t.total), 0.0) AS total, \
         COALESCE(SUM(t.total), 0.0) / COUNT(DISTINCT d.id) AS avg_per_deputy, \
         MIN(t.total) AS min_per_deputy, \
         MAX(t.total) AS max_per_deputy \
         FROM deputies d LEFT JOIN ({}) t ON t.deputy_id = d.id",
        key_select, inner_plan.sql
    );
    let mut params = inner_plan.params;

    // Roster filters stay on the outer query; they narrow the population
    // itself, not which expenses count.
    let mut predicates: Vec<&'static str> = Vec::new();
    if let Some(state) = args.get_str("state") {
        predicates.push("d.state = ?");
        params.push(SqlValue::Text(state.to_uppercase()));
    }
    if let Some(party) = args.get_str("party") {
        predicates.push("d.party = ?");
        params.push(SqlValue::Text(resolve_party(party)));
    }
    if let Some(legislature) = args.get_i64("legislature") {
        predicates.push("d.legislature = ?");
        params.push(SqlValue::Integer(legislature));
    }
    if !predicates.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&predicates.join(" AND "));
    }

    if let Some(key) = key_group {
        sql.push_str(" GROUP BY ");
        sql.push_str(key);

        // min_deputies filters groups after aggregation
        sql.push_str(" HAVING COUNT(DISTINCT d.id) >= ?");
        params.push(SqlValue::Integer(args.get_i64("min_deputies").unwrap_or(1)));

        sql.push_str(" ORDER BY ");
        sql.push_str(order_clause(args));

        if let Some(limit) = args.get_i64("limit") {
            sql.push_str(" LIMIT ?");
            params.push(SqlValue::Integer(limit));
        }
    }

    let plan = QueryPlan { sql, params };
    Ok(Value::Array(run_plan(conn, &plan)?))
}
