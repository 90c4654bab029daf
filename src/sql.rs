use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

use crate::error::{ReportError, Result};

// ---------------------------------------------------------------------------
// Fragments
// ---------------------------------------------------------------------------

/// A piece of SQL text together with the positional (`?`) parameters it
/// binds, in textual order. Fragments are values: combining two returns a
/// new fragment and leaves both inputs untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    sql: String,
    params: Vec<Value>,
}

impl Fragment {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into(), params: Vec::new() }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self { sql: sql.into(), params }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.sql.trim().is_empty()
    }

    /// Join non-empty fragments with `sep`.
    pub fn join<'a>(parts: impl IntoIterator<Item = &'a Fragment>, sep: &str) -> Fragment {
        let mut sql = String::new();
        let mut params = Vec::new();
        for part in parts.into_iter().filter(|p| !p.is_empty()) {
            if !sql.is_empty() {
                sql.push_str(sep);
            }
            sql.push_str(&part.sql);
            params.extend(part.params.iter().cloned());
        }
        Fragment { sql, params }
    }

    /// `self` followed by `other`, separated by a space.
    pub fn then(&self, other: &Fragment) -> Fragment {
        Fragment::join([self, other], " ")
    }

    pub fn wrap(&self, prefix: &str, suffix: &str) -> Fragment {
        Fragment {
            sql: format!("{prefix}{}{suffix}", self.sql),
            params: self.params.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// One result row, columns kept in select order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<(String, Value)>,
}

impl Row {
    pub fn new(values: Vec<(String, Value)>) -> Self {
        Self { values }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.iter().find(|(name, _)| name == column).map(|(_, v)| v)
    }

    pub fn is_null(&self, column: &str) -> bool {
        matches!(self.get(column), None | Some(Value::Null))
    }

    pub fn f64(&self, column: &str) -> Option<f64> {
        match self.get(column)? {
            Value::Real(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            Value::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn i64(&self, column: &str) -> Option<i64> {
        match self.get(column)? {
            Value::Integer(v) => Some(*v),
            Value::Real(v) => Some(*v as i64),
            Value::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Plain-text rendering of a cell; NULL becomes an empty string.
    pub fn text(&self, column: &str) -> String {
        match self.get(column) {
            Some(Value::Text(s)) => s.clone(),
            Some(Value::Integer(v)) => v.to_string(),
            Some(Value::Real(v)) => v.to_string(),
            Some(Value::Blob(b)) => format!("<{} bytes>", b.len()),
            Some(Value::Null) | None => String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Runs SQL text against a backing store.
pub trait QueryExecutor {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize>;
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    fn execute_fragment(&self, fragment: &Fragment) -> Result<usize> {
        self.execute(fragment.sql(), fragment.params())
    }

    fn query_fragment(&self, fragment: &Fragment) -> Result<Vec<Row>> {
        self.query(fragment.sql(), fragment.params())
    }
}

fn failed(sql: &str) -> impl Fn(rusqlite::Error) -> ReportError + '_ {
    move |source| ReportError::Execution { sql: sql.to_string(), source }
}

impl QueryExecutor for Connection {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        tracing::debug!(target: "lybunt::sql", params = params.len(), "execute: {sql}");
        Connection::execute(self, sql, params_from_iter(params)).map_err(failed(sql))
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        tracing::debug!(target: "lybunt::sql", params = params.len(), "query: {sql}");
        let mut stmt = self.prepare(sql).map_err(failed(sql))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let rows = stmt
            .query_map(params_from_iter(params), |r| {
                let mut values = Vec::with_capacity(columns.len());
                for (i, name) in columns.iter().enumerate() {
                    values.push((name.clone(), r.get::<_, Value>(i)?));
                }
                Ok(Row { values })
            })
            .map_err(failed(sql))?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(failed(sql))
    }
}
