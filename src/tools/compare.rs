// Side-by-side comparison tools. Same grouped-sum shape as the rankings,
// but scoped to an explicit membership list instead of a LIMIT.

use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use serde_json::Value;

use super::{apply_period_filters, Args};
use crate::error::ToolError;
use crate::executor::run_plan;
use crate::plan::{QueryBuilder, SortOrder};
use crate::resolver::{resolve_expense_terms, resolve_party};

/// Compare total expenses across an explicit list of deputies.
pub fn compare_deputies(conn: &Connection, args: &Args) -> Result<Value, ToolError> {
    let ids = args.get_i64_array("deputy_ids").unwrap_or_default();

    let mut qb = QueryBuilder::new(
        "SELECT d.id, d.name, d.party, d.state,
                SUM(e.net_value) AS total, COUNT(*) AS count
         FROM deputies d
         JOIN expenses e ON d.id = e.deputy_id",
    );
    qb.filter_in("d.id", ids.into_iter().map(SqlValue::Integer).collect());
    apply_period_filters(&mut qb, args, true);
    qb.group_by("d.id, d.name, d.party, d.state")
        .order_by("total", SortOrder::Desc);

    Ok(Value::Array(run_plan(conn, &qb.build())?))
}

/// Compare parties. Each acronym is mapped through the successor table
/// before the query, so "PFL vs PT" compares UNIÃO against PT.
pub fn compare_parties(conn: &Connection, args: &Args) -> Result<Value, ToolError> {
    let parties: Vec<SqlValue> = args
        .get_str_array("parties")
        .unwrap_or_default()
        .iter()
        .map(|p| SqlValue::Text(resolve_party(p)))
        .collect();

    let mut qb = QueryBuilder::new(
        "SELECT d.party,
                SUM(e.net_value) AS total,
                COUNT(DISTINCT d.id) AS deputy_count,
                COUNT(*) AS expense_count
         FROM deputies d
         JOIN expenses e ON d.id = e.deputy_id",
    );
    qb.filter_in("d.party", parties);
    if let Some(term) = args.get_str("expense_type") {
        qb.filter_any_like("e.expense_type", &resolve_expense_terms(term));
    }
    apply_period_filters(&mut qb, args, true);
    qb.group_by("d.party").order_by("total", SortOrder::Desc);

    Ok(Value::Array(run_plan(conn, &qb.build())?))
}

/// Compare states (UFs). Acronyms are uppercased before binding.
pub fn compare_states(conn: &Connection, args: &Args) -> Result<Value, ToolError> {
    let states: Vec<SqlValue> = args
        .get_str_array("states")
        .unwrap_or_default()
        .iter()
        .map(|s| SqlValue::Text(s.to_uppercase()))
        .collect();

    let mut qb = QueryBuilder::new(
        "SELECT d.state,
                SUM(e.net_value) AS total,
                COUNT(DISTINCT d.id) AS deputy_count,
                COUNT(*) AS expense_count
         FROM deputies d
         JOIN expenses e ON d.id = e.deputy_id",
    );
    qb.filter_in("d.state", states);
    apply_period_filters(&mut qb, args, true);
    qb.group_by("d.state").order_by("total", SortOrder::Desc);

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
    fn test_compare_deputies_ordered_by_total() {
        let conn = seeded_connection();
        let args = args_for(
            ToolName::CompareDeputies,
            json!({ "deputy_ids": [100, 300], "year": 2024 }),
        );
        let rows = compare_deputies(&conn, &args).unwrap();
        let rows = rows.as_array().unwrap().clone();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "Ana Souza");
        assert_eq!(rows[0]["total"], json!(3500.0));
        assert_eq!(rows[1]["name"], "Carla Dias");
        assert_eq!(rows[1]["total"], json!(800.0));
    }

    #[test]
    fn test_compare_deputies_omits_ids_without_expenses() {
        let conn = seeded_connection();
        // Deputy 400 has no expense rows; the inner join drops them, the
        // answer must then say so rather than invent a zero
        let args = args_for(ToolName::CompareDeputies, json!({ "deputy_ids": [100, 400] }));
        let rows = compare_deputies(&conn, &args).unwrap();
        let rows = rows.as_array().unwrap().clone();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!(100));
    }

    #[test]
    fn test_compare_parties_resolves_successors() {
        let conn = seeded_connection();
        // PR dissolved into PL, so this compares PT against PL
        let args = args_for(
            ToolName::CompareParties,
            json!({ "parties": ["PT", "PR"], "year": 2024 }),
        );
        let rows = compare_parties(&conn, &args).unwrap();
        let rows = rows.as_array().unwrap().clone();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["party"], "PT");
        assert_eq!(rows[0]["deputy_count"], json!(2));
        assert_eq!(rows[1]["party"], "PL");
        assert_eq!(rows[1]["total"], json!(800.0));
    }

    #[test]
    fn test_compare_parties_with_expense_type_filter() {
        let conn = seeded_connection();
        let args = args_for(
            ToolName::CompareParties,
            json!({ "parties": ["PT", "PL"], "expense_type": "telefonia" }),
        );
        let rows = compare_parties(&conn, &args).unwrap();
        let rows = rows.as_array().unwrap().clone();

        // PT: Bruno's 200 phone bill; PL: Carla's 150 (2023)
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["party"], "PT");
        assert_eq!(rows[0]["total"], json!(200.0));
        assert_eq!(rows[1]["total"], json!(150.0));
    }

    #[test]
    fn test_compare_states_lowercase_input() {
        let conn = seeded_connection();
        let args = args_for(
            ToolName::CompareStates,
            json!({ "states": ["sp", "mg"], "year": 2024 }),
        );
        let rows = compare_states(&conn, &args).unwrap();
        let rows = rows.as_array().unwrap().clone();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["state"], "SP"); // 3500 + 800
        assert_eq!(rows[0]["total"], json!(4300.0));
        assert_eq!(rows[0]["deputy_count"], json!(2));
        assert_eq!(rows[1]["state"], "MG");
    }
}
