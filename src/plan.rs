// Parameterized query construction.
//
// Every user-supplied value is collected as a bound parameter next to the
// predicate fragment that uses it; placeholders are rendered by position at
// the end. SQL text only ever comes from compile-time constants (`&'static
// str` fragments and closed enum tokens), so the "values never inlined"
// invariant holds mechanically rather than by convention.

use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

/// Sort direction. The only token interpolated directly into SQL, drawn
/// from this closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

/// A compiled, ready-to-execute query: SQL with positional placeholders and
/// the values to bind, in placeholder order.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Accumulates `(predicate fragment, bound values)` pairs on top of a fixed
/// SELECT base, then renders the final statement.
pub struct QueryBuilder {
    base: &'static str,
    predicates: Vec<String>,
    where_params: Vec<Value>,
    group_by: Option<&'static str>,
    having: Option<&'static str>,
    having_params: Vec<Value>,
    order_by: Option<String>,
    limit: Option<i64>,
}

impl QueryBuilder {
    pub fn new(base: &'static str) -> Self {
        Self {
            base,
            predicates: Vec::new(),
            where_params: Vec::new(),
            group_by: None,
            having: None,
            having_params: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    /// Append one AND predicate. The fragment must contain exactly one `?`.
    pub fn filter(&mut self, fragment: &'static str, value: impl Into<Value>) -> &mut Self {
        debug_assert_eq!(fragment.matches('?').count(), 1);
        self.predicates.push(fragment.to_string());
        self.where_params.push(value.into());
        self
    }

    /// Append a membership predicate: `expr IN (?, ?, ...)`.
    pub fn filter_in(&mut self, expr: &'static str, values: Vec<Value>) -> &mut Self {
        let placeholders = vec!["?"; values.len()].join(", ");
        self.predicates.push(format!("{} IN ({})", expr, placeholders));
        self.where_params.extend(values);
        self
    }

    /// Append an OR'd substring-match predicate:
    /// `(expr LIKE ? OR expr LIKE ? ...)`, one `%kw%` pattern per keyword.
    pub fn filter_any_like(&mut self, expr: &'static str, keywords: &[String]) -> &mut Self {
        let clauses: Vec<String> = keywords.iter().map(|_| format!("{} LIKE ?", expr)).collect();
        self.predicates.push(format!("({})", clauses.join(" OR ")));
        for kw in keywords {
            self.where_params.push(Value::Text(format!("%{}%", kw)));
        }
        self
    }

    pub fn group_by(&mut self, expr: &'static str) -> &mut Self {
        self.group_by = Some(expr);
        self
    }

    /// HAVING clause with exactly one `?`.
    pub fn having(&mut self, fragment: &'static str, value: impl Into<Value>) -> &mut Self {
        debug_assert_eq!(fragment.matches('?').count(), 1);
        self.having = Some(fragment);
        self.having_params.push(value.into());
        self
    }

    /// ORDER BY a result column with a direction token.
    pub fn order_by(&mut self, column: &'static str, order: SortOrder) -> &mut Self {
        self.order_by = Some(format!("{} {}", column, order.as_sql()));
        self
    }

    /// ORDER BY a fixed composite expression (e.g. "year, month").
    pub fn order_by_fixed(&mut self, expr: &'static str) -> &mut Self {
        self.order_by = Some(expr.to_string());
        self
    }

    pub fn limit(&mut self, n: i64) -> &mut Self {
        self.limit = Some(n);
        self
    }

    /// Render to SQL + bound values. Placeholder order: WHERE predicates in
    /// insertion order, then HAVING, then LIMIT.
    pub fn build(&self) -> QueryPlan {
        let mut sql = String::from(self.base);

        if !self.predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.predicates.join(" AND "));
        }

        if let Some(group) = self.group_by {
            sql.push_str(" GROUP BY ");
            sql.push_str(group);
        }

        if let Some(having) = self.having {
            sql.push_str(" HAVING ");
            sql.push_str(having);
        }

        if let Some(order) = &self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }

        let mut params = self.where_params.clone();
        params.extend(self.having_params.clone());

        if let Some(n) = self.limit {
            sql.push_str(" LIMIT ?");
            params.push(Value::Integer(n));
        }

        QueryPlan { sql, params }
    }
}
