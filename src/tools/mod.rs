// Query tool catalog.
//
// A fixed set of named analytic operations the language model may invoke.
// Each tool declares a parameter schema (validated before anything touches
// the store) and compiles its arguments into a parameterized QueryPlan.
// Dispatch is by closed enum, so adding a tool without wiring it is a
// compile error.

mod compare;
mod deputies;
mod rankings;

use once_cell::sync::Lazy;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

use crate::cota;
use crate::error::ToolError;
use crate::plan::QueryBuilder;
use crate::stats;

pub use deputies::MonthlyExpenseSummary;

/// Every tool in the catalog. Closed set: dispatch matches exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    SearchDeputy,
    GetDeputiesByParty,
    GetDeputyExpenses,
    GetDeputyMonthlyExpenses,
    GetTopDeputies,
    GetTopParties,
    GetTopStates,
    GetExpenseTypes,
    GetTopSuppliers,
    CompareDeputies,
    CompareParties,
    CompareStates,
    GetStatistics,
    GetCotaInfo,
}

impl ToolName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::SearchDeputy => "search_deputy",
            ToolName::GetDeputiesByParty => "get_deputies_by_party",
            ToolName::GetDeputyExpenses => "get_deputy_expenses",
            ToolName::GetDeputyMonthlyExpenses => "get_deputy_monthly_expenses",
            ToolName::GetTopDeputies => "get_top_deputies",
            ToolName::GetTopParties => "get_top_parties",
            ToolName::GetTopStates => "get_top_states",
            ToolName::GetExpenseTypes => "get_expense_types",
            ToolName::GetTopSuppliers => "get_top_suppliers",
            ToolName::CompareDeputies => "compare_deputies",
            ToolName::CompareParties => "compare_parties",
            ToolName::CompareStates => "compare_states",
            ToolName::GetStatistics => "get_statistics",
            ToolName::GetCotaInfo => "get_cota_info",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        ALL_TOOLS.iter().copied().find(|t| t.as_str() == s)
    }
}

pub const ALL_TOOLS: [ToolName; 14] = [
    ToolName::SearchDeputy,
    ToolName::GetDeputiesByParty,
    ToolName::GetDeputyExpenses,
    ToolName::GetDeputyMonthlyExpenses,
    ToolName::GetTopDeputies,
    ToolName::GetTopParties,
    ToolName::GetTopStates,
    ToolName::GetExpenseTypes,
    ToolName::GetTopSuppliers,
    ToolName::CompareDeputies,
    ToolName::CompareParties,
    ToolName::CompareStates,
    ToolName::GetStatistics,
    ToolName::GetCotaInfo,
];

/// Parameter value type, used for validation and schema generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Integer,
    String,
    IntegerArray,
    StringArray,
    Choice(&'static [&'static str]),
}

impl ParamKind {
    fn type_name(&self) -> &'static str {
        match self {
            ParamKind::Integer => "integer",
            ParamKind::String | ParamKind::Choice(_) => "string",
            ParamKind::IntegerArray => "array of integers",
            ParamKind::StringArray => "array of strings",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<Value>,
    pub description: &'static str,
}

impl ParamSpec {
    fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self { name, kind, required: true, default: None, description }
    }

    fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self { name, kind, required: false, default: None, description }
    }

    fn with_default(
        name: &'static str,
        kind: ParamKind,
        default: Value,
        description: &'static str,
    ) -> Self {
        Self { name, kind, required: false, default: Some(default), description }
    }
}

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: ToolName,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
}

/// The shared period filters carried by most expense tools.
fn period_params() -> Vec<ParamSpec> {
    vec![
        ParamSpec::optional("year", ParamKind::Integer, "Filter by year (e.g. 2024)"),
        ParamSpec::optional("month", ParamKind::Integer, "Filter by month (1-12)"),
        ParamSpec::optional("day", ParamKind::Integer, "Filter by day of month (1-31)"),
        ParamSpec::optional(
            "legislature",
            ParamKind::Integer,
            "Filter by legislature (legislative term)",
        ),
        ParamSpec::optional(
            "start_date",
            ParamKind::String,
            "Start date for period filter (format: YYYY-MM-DD)",
        ),
        ParamSpec::optional(
            "end_date",
            ParamKind::String,
            "End date for period filter (format: YYYY-MM-DD)",
        ),
    ]
}

const ORDER_BY_DESC: &str =
    "Sort order: \"desc\" for highest expenses (default), \"asc\" for lowest. \
     Use \"asc\" when the user asks who spent the least.";

static CATALOG: Lazy<Vec<ToolSpec>> = Lazy::new(|| {
    vec![
        ToolSpec {
            name: ToolName::SearchDeputy,
            description: "Search for deputies by name (partial, case-insensitive). \
                          Returns deputy information including party and state.",
            params: vec![ParamSpec::required(
                "name",
                ParamKind::String,
                "Deputy name or partial name to search for",
            )],
        },
        ToolSpec {
            name: ToolName::GetDeputiesByParty,
            description: "Get all deputies from a specific political party, optionally \
                          filtered by state. Use when the user asks to list the deputies \
                          of a party.",
            params: vec![
                ParamSpec::required(
                    "party",
                    ParamKind::String,
                    "Party acronym (e.g. CIDADANIA, PT, PL, MDB)",
                ),
                ParamSpec::optional("state", ParamKind::String, "Filter by state (e.g. SP, RJ, MG)"),
                ParamSpec::with_default(
                    "limit",
                    ParamKind::Integer,
                    json!(100),
                    "Maximum number of results (default 100)",
                ),
            ],
        },
        ToolSpec {
            name: ToolName::GetDeputyExpenses,
            description: "Get total expenses for a specific deputy, optionally filtered \
                          by year, month, day, legislature, or date range.",
            params: {
                let mut p = vec![ParamSpec::required(
                    "deputy_id",
                    ParamKind::Integer,
                    "Deputy ID from the database",
                )];
                p.extend(period_params());
                p
            },
        },
        ToolSpec {
            name: ToolName::GetDeputyMonthlyExpenses,
            description: "Get expenses grouped by month for a specific deputy, including \
                          monthly totals and the average monthly expense. Use this for \
                          questions about average spending per month or monthly patterns. \
                          The average divides by the number of months that have expenses, \
                          not by twelve.",
            params: vec![
                ParamSpec::required("deputy_id", ParamKind::Integer, "Deputy ID from the database"),
                ParamSpec::optional("year", ParamKind::Integer, "Filter by year (e.g. 2024)"),
                ParamSpec::optional(
                    "legislature",
                    ParamKind::Integer,
                    "Filter by legislature (legislative term)",
                ),
                ParamSpec::optional(
                    "start_date",
                    ParamKind::String,
                    "Start date for period filter (format: YYYY-MM-DD)",
                ),
                ParamSpec::optional(
                    "end_date",
                    ParamKind::String,
                    "End date for period filter (format: YYYY-MM-DD)",
                ),
            ],
        },
        ToolSpec {
            name: ToolName::GetTopDeputies,
            description: "Get a ranking of deputies by expenses. Optionally filtered by \
                          period, state, or expense category (partial category names are \
                          understood, e.g. \"aluguel de carros\", \"combustível\").",
            params: {
                let mut p = period_params();
                p.push(ParamSpec::optional(
                    "state",
                    ParamKind::String,
                    "Filter by state (e.g. SP, RJ, MG)",
                ));
                p.push(ParamSpec::optional(
                    "expense_type",
                    ParamKind::String,
                    "Filter by expense type/category. Partial matching is supported.",
                ));
                p.push(ParamSpec::with_default(
                    "order_by",
                    ParamKind::Choice(&["asc", "desc"]),
                    json!("desc"),
                    ORDER_BY_DESC,
                ));
                p.push(ParamSpec::with_default(
                    "limit",
                    ParamKind::Integer,
                    json!(10),
                    "Number of results to return (default 10)",
                ));
                p
            },
        },
        ToolSpec {
            name: ToolName::GetTopParties,
            description: "Get a ranking of political parties by total expenses, \
                          optionally filtered by period.",
            params: {
                let mut p = period_params();
                p.push(ParamSpec::with_default(
                    "order_by",
                    ParamKind::Choice(&["asc", "desc"]),
                    json!("desc"),
                    ORDER_BY_DESC,
                ));
                p.push(ParamSpec::with_default(
                    "limit",
                    ParamKind::Integer,
                    json!(10),
                    "Number of results to return (default 10)",
                ));
                p
            },
        },
        ToolSpec {
            name: ToolName::GetTopStates,
            description: "Get a ranking of states (UFs) by total expenses, optionally \
                          filtered by period. Includes the deputy count per state.",
            params: {
                let mut p = period_params();
                p.push(ParamSpec::with_default(
                    "order_by",
                    ParamKind::Choice(&["asc", "desc"]),
                    json!("desc"),
                    ORDER_BY_DESC,
                ));
                p.push(ParamSpec::with_default(
                    "limit",
                    ParamKind::Integer,
                    json!(10),
                    "Number of results to return (default 10)",
                ));
                p
            },
        },
        ToolSpec {
            name: ToolName::GetExpenseTypes,
            description: "Get a breakdown of expenses by type/category. Can filter by \
                          deputy, state, period, or a specific expense category (in which \
                          case it returns that category's total rather than a ranking).",
            params: {
                let mut p = vec![ParamSpec::optional(
                    "deputy_id",
                    ParamKind::Integer,
                    "Deputy ID (omit for all deputies)",
                )];
                p.push(ParamSpec::optional(
                    "state",
                    ParamKind::String,
                    "Filter by state (e.g. SP, RJ, MG)",
                ));
                p.push(ParamSpec::optional(
                    "expense_type",
                    ParamKind::String,
                    "Filter by a specific expense type/category. Partial matching is supported.",
                ));
                p.extend(period_params());
                p.push(ParamSpec::with_default(
                    "limit",
                    ParamKind::Integer,
                    json!(10),
                    "Number of results to return (default 10)",
                ));
                p
            },
        },
        ToolSpec {
            name: ToolName::GetTopSuppliers,
            description: "Get a ranking of suppliers/companies by total payments. If \
                          deputy_id is omitted, ranks across ALL deputies.",
            params: {
                let mut p = vec![ParamSpec::optional(
                    "deputy_id",
                    ParamKind::Integer,
                    "Deputy ID (omit for all deputies)",
                )];
                p.extend(period_params());
                p.push(ParamSpec::with_default(
                    "limit",
                    ParamKind::Integer,
                    json!(10),
                    "Number of results to return (default 10)",
                ));
                p
            },
        },
        ToolSpec {
            name: ToolName::CompareDeputies,
            description: "Compare expenses between two or more deputies, optionally \
                          filtered by period.",
            params: {
                let mut p = vec![ParamSpec::required(
                    "deputy_ids",
                    ParamKind::IntegerArray,
                    "Deputy IDs to compare",
                )];
                p.extend(period_params());
                p
            },
        },
        ToolSpec {
            name: ToolName::CompareParties,
            description: "Compare expenses between two or more political parties, \
                          optionally filtered by period or expense category.",
            params: {
                let mut p = vec![ParamSpec::required(
                    "parties",
                    ParamKind::StringArray,
                    "Party acronyms to compare (e.g. [\"PT\", \"PL\", \"PSDB\"])",
                )];
                p.push(ParamSpec::optional(
                    "expense_type",
                    ParamKind::String,
                    "Filter by expense type/category. Partial matching is supported.",
                ));
                p.extend(period_params());
                p
            },
        },
        ToolSpec {
            name: ToolName::CompareStates,
            description: "Compare expenses between two or more states (UFs), optionally \
                          filtered by period.",
            params: {
                let mut p = vec![ParamSpec::required(
                    "states",
                    ParamKind::StringArray,
                    "State acronyms to compare (e.g. [\"SP\", \"RJ\", \"MG\"])",
                )];
                p.extend(period_params());
                p
            },
        },
        ToolSpec {
            name: ToolName::GetStatistics,
            description: "Calculate expense statistics per deputy: deputy count, total, \
                          average, and the min/max per-deputy totals. IMPORTANT: the group \
                          average sums ALL expenses of deputies in the group and divides \
                          by the TOTAL number of deputies in the group, including deputies \
                          with zero expenses. Use for questions about averages or deputy \
                          counts. Tie order between equal groups is not guaranteed.",
            params: {
                let mut p = vec![ParamSpec::required(
                    "group_by",
                    ParamKind::Choice(&["state", "party", "none"]),
                    "How to group: state=by UF, party=by political party, none=overall",
                )];
                p.push(ParamSpec::optional(
                    "state",
                    ParamKind::String,
                    "Filter by state (e.g. MG, SP)",
                ));
                p.push(ParamSpec::optional(
                    "party",
                    ParamKind::String,
                    "Filter by party (e.g. PT, PL)",
                ));
                p.extend(period_params());
                p.push(ParamSpec::optional(
                    "order_by",
                    ParamKind::Choice(&["avg_asc", "avg_desc", "total_asc", "total_desc"]),
                    "Sort order when grouping: avg_asc/avg_desc by average per deputy, \
                     total_asc/total_desc by total (default total_desc)",
                ));
                p.push(ParamSpec::optional(
                    "limit",
                    ParamKind::Integer,
                    "Limit number of groups returned (default: all groups)",
                ));
                p.push(ParamSpec::with_default(
                    "min_deputies",
                    ParamKind::Integer,
                    json!(1),
                    "Minimum number of deputies required in a group. Use higher values \
                     to filter out small groups with skewed averages.",
                ));
                p
            },
        },
        ToolSpec {
            name: ToolName::GetCotaInfo,
            description: "Look up the CEAP (parliamentary allowance) rules: what the \
                          quota covers, per-state monthly limits, and prohibited uses. \
                          Static reference knowledge, no expense data involved.",
            params: vec![
                ParamSpec::optional(
                    "topic",
                    ParamKind::String,
                    "Narrow to a topic: rules, limits/values, or prohibitions. \
                     Unknown topics return the full document.",
                ),
                ParamSpec::optional(
                    "state",
                    ParamKind::String,
                    "Return the monthly allowance for one state (e.g. SP)",
                ),
            ],
        },
    ]
});

pub fn catalog() -> &'static [ToolSpec] {
    &CATALOG
}

pub fn spec_for(name: ToolName) -> &'static ToolSpec {
    CATALOG
        .iter()
        .find(|s| s.name == name)
        .expect("catalog covers every ToolName")
}

/// JSON Schema descriptions of the whole catalog, in the function-calling
/// format OpenAI-compatible endpoints expect.
pub fn catalog_schemas() -> Vec<Value> {
    CATALOG.iter().map(tool_schema).collect()
}

fn tool_schema(spec: &ToolSpec) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in &spec.params {
        let mut prop = Map::new();
        match param.kind {
            ParamKind::Integer => {
                prop.insert("type".into(), json!("integer"));
            }
            ParamKind::String => {
                prop.insert("type".into(), json!("string"));
            }
            ParamKind::IntegerArray => {
                prop.insert("type".into(), json!("array"));
                prop.insert("items".into(), json!({ "type": "integer" }));
            }
            ParamKind::StringArray => {
                prop.insert("type".into(), json!("array"));
                prop.insert("items".into(), json!({ "type": "string" }));
            }
            ParamKind::Choice(choices) => {
                prop.insert("type".into(), json!("string"));
                prop.insert("enum".into(), json!(choices));
            }
        }
        prop.insert("description".into(), json!(param.description));
        if let Some(default) = &param.default {
            prop.insert("default".into(), default.clone());
        }
        properties.insert(param.name.to_string(), Value::Object(prop));
        if param.required {
            required.push(param.name);
        }
    }

    json!({
        "type": "function",
        "function": {
            "name": spec.name.as_str(),
            "description": spec.description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            },
        },
    })
}

/// Validated arguments with typed accessors. Constructed only by
/// `validate_args`, so the typed getters cannot see unchecked input.
#[derive(Debug, Clone)]
pub struct Args(Map<String, Value>);

impl Args {
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn get_i64_array(&self, name: &str) -> Option<Vec<i64>> {
        self.0
            .get(name)
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_i64).collect())
    }

    pub fn get_str_array(&self, name: &str) -> Option<Vec<String>> {
        self.0.get(name).and_then(Value::as_array).map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
    }
}

fn matches_kind(kind: ParamKind, value: &Value) -> bool {
    match kind {
        ParamKind::Integer => value.as_i64().is_some(),
        ParamKind::String => value.is_string(),
        ParamKind::IntegerArray => value
            .as_array()
            .map(|arr| arr.iter().all(|v| v.as_i64().is_some()))
            .unwrap_or(false),
        ParamKind::StringArray => value
            .as_array()
            .map(|arr| arr.iter().all(Value::is_string))
            .unwrap_or(false),
        ParamKind::Choice(choices) => value
            .as_str()
            .map(|s| choices.contains(&s))
            .unwrap_or(false),
    }
}

/// Validate raw model-supplied arguments against a tool's parameter schema:
/// required fields present, types correct, enum choices honored, defaults
/// applied. Unknown extra fields are dropped. Rejects before any query runs.
pub fn validate_args(spec: &ToolSpec, raw: &Value) -> Result<Args, ToolError> {
    let empty = Map::new();
    let raw_map = match raw {
        Value::Object(map) => map,
        Value::Null => &empty,
        _ => {
            return Err(ToolError::Validation(
                "arguments must be a JSON object".to_string(),
            ))
        }
    };

    let mut validated = Map::new();

    for param in &spec.params {
        match raw_map.get(param.name) {
            Some(Value::Null) | None => {
                if param.required {
                    return Err(ToolError::missing(param.name));
                }
                if let Some(default) = &param.default {
                    validated.insert(param.name.to_string(), default.clone());
                }
            }
            Some(value) => {
                if !matches_kind(param.kind, value) {
                    if let ParamKind::Choice(choices) = param.kind {
                        return Err(ToolError::Validation(format!(
                            "field '{}' must be one of {:?}",
                            param.name, choices
                        )));
                    }
                    return Err(ToolError::wrong_type(param.name, param.kind.type_name()));
                }
                if matches!(param.kind, ParamKind::IntegerArray | ParamKind::StringArray)
                    && value.as_array().map(Vec::is_empty).unwrap_or(false)
                {
                    return Err(ToolError::Validation(format!(
                        "field '{}' must not be empty",
                        param.name
                    )));
                }
                validated.insert(param.name.to_string(), value.clone());
            }
        }
    }

    Ok(Args(validated))
}

/// Shared period filters: each present argument appends one AND predicate.
/// Expense columns are aliased `e.*`, deputies `d.*`; the legislature filter
/// requires the deputies join to be present in the base statement.
pub(crate) fn apply_period_filters(qb: &mut QueryBuilder, args: &Args, with_deputies_join: bool) {
    if with_deputies_join {
        if let Some(legislature) = args.get_i64("legislature") {
            qb.filter("d.legislature = ?", legislature);
        }
    }
    if let Some(year) = args.get_i64("year") {
        qb.filter("e.year = ?", year);
    }
    if let Some(month) = args.get_i64("month") {
        qb.filter("e.month = ?", month);
    }
    if let Some(day) = args.get_i64("day") {
        qb.filter("CAST(strftime('%d', e.document_date) AS INTEGER) = ?", day);
    }
    if let Some(start) = args.get_str("start_date") {
        qb.filter("date(e.document_date) >= date(?)", start.to_string());
    }
    if let Some(end) = args.get_str("end_date") {
        qb.filter("date(e.document_date) <= date(?)", end.to_string());
    }
}

/// Execute one validated-and-compiled tool call against the store.
/// This is the only entry point the orchestrator uses.
pub fn run_tool(conn: &Connection, tool_name: &str, raw_args: &Value) -> Result<Value, ToolError> {
    let name = ToolName::parse(tool_name).ok_or_else(|| ToolError::NotFound(tool_name.into()))?;
    let args = validate_args(spec_for(name), raw_args)?;

    tracing::debug!(tool = tool_name, args = %raw_args, "executing tool");

    match name {
        ToolName::SearchDeputy => deputies::search_deputy(conn, &args),
        ToolName::GetDeputiesByParty => deputies::deputies_by_party(conn, &args),
        ToolName::GetDeputyExpenses => deputies::deputy_expenses(conn, &args),
        ToolName::GetDeputyMonthlyExpenses => deputies::deputy_monthly_expenses(conn, &args),
        ToolName::GetTopDeputies => rankings::top_deputies(conn, &args),
        ToolName::GetTopParties => rankings::top_parties(conn, &args),
        ToolName::GetTopStates => rankings::top_states(conn, &args),
        ToolName::GetExpenseTypes => rankings::expense_types(conn, &args),
        ToolName::GetTopSuppliers => rankings::top_suppliers(conn, &args),
        ToolName::CompareDeputies => compare::compare_deputies(conn, &args),
        ToolName::CompareParties => compare::compare_parties(conn, &args),
        ToolName::CompareStates => compare::compare_states(conn, &args),
        ToolName::GetStatistics => stats::statistics(conn, &args),
        ToolName::GetCotaInfo => Ok(cota::cota_info(
            args.get_str("topic"),
            args.get_str("state"),
        )),
    }
}
