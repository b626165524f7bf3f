// Ranking and breakdown tools: grouped sums ordered by total.

use rusqlite::Connection;
use serde_json::Value;

use super::{apply_period_filters, Args};
use crate::error::ToolError;
use crate::executor::run_plan;
use crate::plan::{QueryBuilder, SortOrder};
use crate::resolver::resolve_expense_terms;

fn requested_order(args: &Args) -> SortOrder {
    args.get_str("order_by")
        .and_then(SortOrder::parse)
        .unwrap_or(SortOrder::Desc)
}

/// Ranking of deputies by summed net value.
pub fn top_deputies(conn: &Connection, args: &Args) -> Result<Value, ToolError> {
    let mut qb = QueryBuilder::new(
        "SELECT d.name, d.party, d.state, SUM(e.net_value) AS total
         FROM deputies d
         JOIN expenses e ON d.id = e.deputy_id",
    );
    apply_period_filters(&mut qb, args, true);
    if let Some(state) = args.get_str("state") {
        qb.filter("d.state = ?", state.to_uppercase());
    }
    if let Some(term) = args.get_str("expense_type") {
        // Semantic expansion: "aluguel de carro" reaches the stored
        // "LOCAÇÃO OU FRETAMENTO DE VEÍCULOS AUTOMOTORES" category
        qb.filter_any_like("e.expense_type", &resolve_expense_terms(term));
    }
    qb.group_by("d.id, d.name, d.party, d.state")
        .order_by("total", requested_order(args))
        .limit(args.get_i64("limit").unwrap_or(10));

    Ok(Value::Array(run_plan(conn, &qb.build())?))
}

/// Ranking of parties by summed net value.
pub fn top_parties(conn: &Connection, args: &Args) -> Result<Value, ToolError> {
    let mut qb = QueryBuilder::new(
        "SELECT d.party, SUM(e.net_value) AS total
         FROM deputies d
         JOIN expenses e ON d.id = e.deputy_id",
    );
    apply_period_filters(&mut qb, args, true);
    qb.group_by("d.party")
        .order_by("total", requested_order(args))
        .limit(args.get_i64("limit").unwrap_or(10));

    Ok(Value::Array(run_plan(conn, &qb.build())?))
}

/// Ranking of states by summed net value, with the distinct deputy count.
pub fn top_states(conn: &Connection, args: &Args) -> Result<Value, ToolError> {
    let mut qb = QueryBuilder::new(
        "SELECT d.state, SUM(e.net_value) AS total, COUNT(DISTINCT d.id) AS deputy_count
         FROM deputies d
         JOIN expenses e ON d.id = e.deputy_id",
    );
    apply_period_filters(&mut qb, args, true);
    qb.group_by("d.state")
        .order_by("total", requested_order(args))
        .limit(args.get_i64("limit").unwrap_or(10));

    Ok(Value::Array(run_plan(conn, &qb.build())?))
}

const TYPES_BASE: &str = "SELECT e.expense_type, SUM(e.net_value) AS total, COUNT(*) AS count
         FROM expenses e";

const TYPES_BASE_JOINED: &str =
    "SELECT e.expense_type, SUM(e.net_value) AS total, COUNT(*) AS count
         FROM expenses e
         JOIN deputies d ON e.deputy_id = d.id";

/// Breakdown by expense category. The deputies join is added only when a
/// state or legislature filter requires it; otherwise the expenses table is
/// scanned alone.
pub fn expense_types(conn: &Connection, args: &Args) -> Result<Value, ToolError> {
    let needs_join = args.get_str("state").is_some() || args.get_i64("legislature").is_some();

    let mut qb = QueryBuilder::new(if needs_join { TYPES_BASE_JOINED } else { TYPES_BASE });

    if let Some(deputy_id) = args.get_i64("deputy_id") {
        qb.filter("e.deputy_id = ?", deputy_id);
    }
    if let Some(state) = args.get_str("state") {
        qb.filter("d.state = ?", state.to_uppercase());
    }
    if let Some(term) = args.get_str("expense_type") {
        qb.filter_any_like("e.expense_type", &resolve_expense_terms(term));
    }
    apply_period_filters(&mut qb, args, needs_join);

    qb.group_by("e.expense_type")
        .order_by("total", SortOrder::Desc)
        .limit(args.get_i64("limit").unwrap_or(10));

    Ok(Value::Array(run_plan(conn, &qb.build())?))
}

const SUPPLIERS_BASE: &str =
    "SELECT e.supplier_name, e.supplier_tax_id, SUM(e.net_value) AS total, COUNT(*) AS count
         FROM expenses e";

const SUPPLIERS_BASE_JOINED: &str =
    "SELECT e.supplier_name, e.supplier_tax_id, SUM(e.net_value) AS total, COUNT(*) AS count
         FROM expenses e
         JOIN deputies d ON e.deputy_id = d.id";

/// Supplier ranking by summed payments; without a deputy_id it ranks
/// across all deputies.
pub fn top_suppliers(conn: &Connection, args: &Args) -> Result<Value, ToolError> {
    let needs_join = args.get_i64("legislature").is_some();

    let mut qb = QueryBuilder::new(if needs_join { SUPPLIERS_BASE_JOINED } else { SUPPLIERS_BASE });

    if let Some(deputy_id) = args.get_i64("deputy_id") {
        qb.filter("e.deputy_id = ?", deputy_id);
    }
    apply_period_filters(&mut qb, args, needs_join);

    qb.group_by("e.supplier_name, e.supplier_tax_id")
        .order_by("total", SortOrder::Desc)
        .limit(args.get_i64("limit").unwrap_or(10));

    Ok(Value::Array(run_plan(conn, &qb.build())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_fixtures::seeded_connection;
    use crate::tools::{spec_for, validate_args, ToolName};
    use serde_json::json;

    fn args_for(tool: ToolName, raw: Value) -> Args {
        validate_args(spec_for(tool), &raw).unwrap()
    }

    #[test]
    fn test_top_deputies_descending_by_default() {
        let conn = seeded_connection();
        let args = args_for(ToolName::GetTopDeputies, json!({ "year": 2024 }));
        let rows = top_deputies(&conn, &args).unwrap();
        let rows = rows.as_array().unwrap().clone();

        assert_eq!(rows.len(), 3); // deputy 400 has no expenses, never ranks
        assert_eq!(rows[0]["name"], "Ana Souza"); // 3500
        assert_eq!(rows[1]["name"], "Bruno Lima"); // 3200
        assert_eq!(rows[2]["name"], "Carla Dias"); // 800
    }

    #[test]
    fn test_top_deputies_ascending_for_lowest_spenders() {
        let conn = seeded_connection();
        let args = args_for(
            ToolName::GetTopDeputies,
            json!({ "year": 2024, "order_by": "asc", "limit": 1 }),
        );
        let rows = top_deputies(&conn, &args).unwrap();
        let rows = rows.as_array().unwrap().clone();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "Carla Dias");
    }

    #[test]
    fn test_top_deputies_semantic_expense_filter() {
        let conn = seeded_connection();
        // "aluguel de carro" must match LOCAÇÃO OU FRETAMENTO DE VEÍCULOS
        // AUTOMOTORES through the resolver's keyword set
        let args = args_for(
            ToolName::GetTopDeputies,
            json!({ "expense_type": "aluguel de carro" }),
        );
        let rows = top_deputies(&conn, &args).unwrap();
        let rows = rows.as_array().unwrap().clone();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "Ana Souza");
        assert_eq!(rows[0]["total"], json!(2000.0));
    }

    #[test]
    fn test_top_parties_limit_and_order() {
        let conn = seeded_connection();
        let args = args_for(
            ToolName::GetTopParties,
            json!({ "year": 2024, "limit": 5, "order_by": "desc" }),
        );
        let rows = top_parties(&conn, &args).unwrap();
        let rows = rows.as_array().unwrap().clone();

        // Only 2 parties exist; limit 5 returns them all, ordered
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["party"], "PT"); // 6700
        assert_eq!(rows[0]["total"], json!(6700.0));
        assert_eq!(rows[1]["party"], "PL"); // 800
    }

    #[test]
    fn test_top_states_counts_distinct_deputies() {
        let conn = seeded_connection();
        let args = args_for(ToolName::GetTopStates, json!({ "year": 2024 }));
        let rows = top_states(&conn, &args).unwrap();
        let rows = rows.as_array().unwrap().clone();

        let sp = rows.iter().find(|r| r["state"] == "SP").unwrap();
        // Two SP deputies have 2024 expenses (Ana, Carla); Daniel has none
        assert_eq!(sp["deputy_count"], json!(2));
    }

    #[test]
    fn test_expense_types_no_join_without_state_filter() {
        let conn = seeded_connection();
        let args = args_for(ToolName::GetExpenseTypes, json!({ "deputy_id": 100 }));
        let rows = expense_types(&conn, &args).unwrap();
        let rows = rows.as_array().unwrap().clone();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["expense_type"], "LOCAÇÃO OU FRETAMENTO DE VEÍCULOS AUTOMOTORES");
    }

    #[test]
    fn test_expense_types_state_filter_joins_deputies() {
        let conn = seeded_connection();
        let args = args_for(ToolName::GetExpenseTypes, json!({ "state": "MG" }));
        let rows = expense_types(&conn, &args).unwrap();
        let rows = rows.as_array().unwrap().clone();

        // Only Bruno Lima (MG): airfare and phone
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["expense_type"], "PASSAGEM AÉREA - SIGEPA");
    }

    #[test]
    fn test_top_suppliers_across_all_deputies() {
        let conn = seeded_connection();
        let args = args_for(ToolName::GetTopSuppliers, json!({}));
        let rows = top_suppliers(&conn, &args).unwrap();
        let rows = rows.as_array().unwrap().clone();

        assert_eq!(rows[0]["supplier_name"], "CIA AÉREA GAMA");
        assert_eq!(rows[0]["total"], json!(3000.0));
        // OPERADORA DELTA aggregates across deputies 200 and 300
        let delta = rows.iter().find(|r| r["supplier_name"] == "OPERADORA DELTA").unwrap();
        assert_eq!(delta["count"], json!(2));
    }

    #[test]
    fn test_top_suppliers_scoped_to_deputy() {
        let conn = seeded_connection();
        let args = args_for(ToolName::GetTopSuppliers, json!({ "deputy_id": 100 }));
        let rows = top_suppliers(&conn, &args).unwrap();
        let rows = rows.as_array().unwrap().clone();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["supplier_name"], "LOCADORA BETA");
    }
}
