// Deputy lookup and per-deputy expense tools.

use rusqlite::Connection;
use serde::Serialize;
use serde_json::{json, Value};

use super::{apply_period_filters, Args};
use crate::error::ToolError;
use crate::executor::run_plan;
use crate::plan::{QueryBuilder, SortOrder};
use crate::resolver::resolve_party;

const DEPUTY_COLUMNS: &str =
    "SELECT id, name, party, state, legislature, email, photo_url FROM deputies";

/// Case-insensitive substring search on deputy name, capped at 10 rows.
///
/// SQLite's LIKE folds case for ASCII only, so the raw term is matched
/// alongside its upper- and lowercase renderings; "JOSÉ" then finds a
/// stored "José" through the lowercase variant.
pub fn search_deputy(conn: &Connection, args: &Args) -> Result<Value, ToolError> {
    let name = args.get_str("name").unwrap_or_default().trim();

    let mut variants = vec![name.to_string()];
    for candidate in [name.to_uppercase(), name.to_lowercase()] {
        if !variants.contains(&candidate) {
            variants.push(candidate);
        }
    }

    let mut qb = QueryBuilder::new(DEPUTY_COLUMNS);
    qb.filter_any_like("name", &variants)
        .order_by("name", SortOrder::Asc)
        .limit(10);

    Ok(Value::Array(run_plan(conn, &qb.build())?))
}

/// Roster listing for one party, optionally narrowed to a state. The party
/// acronym goes through the successor map first, so questions about
/// deprecated parties land on the current roster.
pub fn deputies_by_party(conn: &Connection, args: &Args) -> Result<Value, ToolError> {
    let party = resolve_party(args.get_str("party").unwrap_or_default());
    let limit = args.get_i64("limit").unwrap_or(100);

    let mut qb = QueryBuilder::new(DEPUTY_COLUMNS);
    qb.filter("party = ?", party);
    if let Some(state) = args.get_str("state") {
        qb.filter("state = ?", state.to_uppercase());
    }
    qb.order_by("name", SortOrder::Asc).limit(limit);

    Ok(Value::Array(run_plan(conn, &qb.build())?))
}

/// Total and count of one deputy's expenses, joined for display fields.
pub fn deputy_expenses(conn: &Connection, args: &Args) -> Result<Value, ToolError> {
    let deputy_id = args.get_i64("deputy_id").unwrap_or_default();

    let mut qb = QueryBuilder::new(
        "SELECT d.name, d.party, d.state,
                SUM(e.net_value) AS total, COUNT(*) AS count
         FROM deputies d
         JOIN expenses e ON d.id = e.deputy_id",
    );
    qb.filter("d.id = ?", deputy_id);
    apply_period_filters(&mut qb, args, true);
    qb.group_by("d.id, d.name, d.party, d.state");

    Ok(Value::Array(run_plan(conn, &qb.build())?))
}

#[derive(Debug, Serialize)]
pub struct MonthlyExpenseSummary {
    pub total_expenses: f64,
    pub total_count: i64,
    pub months_with_expenses: usize,
    pub avg_monthly_expense: f64,
}

/// Per-month totals for one deputy plus the average monthly expense.
///
/// The average is computed here, after the grouped rows return, as
/// `total / months_with_any_expense`. Months with no expense rows are
/// absent from the grouped result and must not contribute a zero to the
/// denominator, so a SQL-side AVG (or dividing by 12) would be wrong.
pub fn deputy_monthly_expenses(conn: &Connection, args: &Args) -> Result<Value, ToolError> {
    let deputy_id = args.get_i64("deputy_id").unwrap_or_default();

    let mut qb = QueryBuilder::new(
        "SELECT d.name, d.party, d.state, e.year, e.month,
                SUM(e.net_value) AS monthly_total, COUNT(*) AS monthly_count
         FROM deputies d
         JOIN expenses e ON d.id = e.deputy_id",
    );
    qb.filter("d.id = ?", deputy_id);
    apply_period_filters(&mut qb, args, true);
    qb.group_by("d.id, e.year, e.month").order_by_fixed("e.year, e.month");

    let monthly_rows = run_plan(conn, &qb.build())?;

    let total_expenses: f64 = monthly_rows
        .iter()
        .map(|row| row["monthly_total"].as_f64().unwrap_or(0.0))
        .sum();
    let total_count: i64 = monthly_rows
        .iter()
        .map(|row| row["monthly_count"].as_i64().unwrap_or(0))
        .sum();
    let months_with_expenses = monthly_rows.len();
    let avg_monthly_expense = if months_with_expenses > 0 {
        total_expenses / months_with_expenses as f64
    } else {
        0.0
    };

    let deputy_info = monthly_rows.first().map(|row| {
        json!({
            "name": row["name"],
            "party": row["party"],
            "state": row["state"],
        })
    });

    let breakdown: Vec<Value> = monthly_rows
        .iter()
        .map(|row| {
            json!({
                "year": row["year"],
                "month": row["month"],
                "monthly_total": row["monthly_total"],
                "monthly_count": row["monthly_count"],
            })
        })
        .collect();

    let summary = MonthlyExpenseSummary {
        total_expenses,
        total_count,
        months_with_expenses,
        avg_monthly_expense,
    };

    Ok(json!({
        "deputy_info": deputy_info,
        "monthly_breakdown": breakdown,
        "summary": summary,
    }))
}
