//! Guarded ad-hoc SQL over the warehouse.
//!
//! Read statements return rows as JSON, capped by a row limit and an elapsed
//! time budget checked between rows. Write statements only run when the
//! caller opts in.

use std::time::{Duration, Instant};

use ::duckdb::types::Value as DuckValue;
use ::duckdb::Connection;
use serde::Serialize;
use serde_json::Value;

use crate::WarehouseError;

/// Statement keywords that never modify the database.
const READ_KEYWORDS: [&str; 6] = ["SELECT", "WITH", "EXPLAIN", "SHOW", "DESCRIBE", "SUMMARIZE"];

/// Limits applied to one ad-hoc query.
#[derive(Debug, Clone, Copy)]
pub struct QueryGuardrails {
    /// Rows returned before the result is marked truncated.
    pub max_rows: usize,
    /// Elapsed time budget in milliseconds, checked after execution and
    /// between fetched rows. A running statement is not interrupted.
    pub query_timeout_ms: u64,
}

impl Default for QueryGuardrails {
    fn default() -> Self {
        Self {
            max_rows: 10_000,
            query_timeout_ms: 5_000,
        }
    }
}

impl QueryGuardrails {
    fn check(self) -> Result<Self, WarehouseError> {
        if self.max_rows == 0 {
            return Err(rejected("row limit must be at least 1"));
        }
        if self.query_timeout_ms == 0 {
            return Err(rejected("query timeout must be at least 1ms"));
        }
        Ok(self)
    }
}

/// Name and DuckDB type of a result column.
#[derive(Debug, Clone, Serialize)]
pub struct SqlColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub r#type: String,
}

/// Rows of an ad-hoc query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<SqlColumn>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
    /// Set when more rows existed than `max_rows`.
    pub truncated: bool,
}

impl QueryResult {
    fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
            truncated: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatementKind {
    Read,
    Write,
}

impl StatementKind {
    fn of(sql: &str) -> Self {
        let keyword = sql
            .split(|c: char| c.is_whitespace() || c == '(')
            .find(|part| !part.is_empty())
            .unwrap_or_default();
        if READ_KEYWORDS
            .iter()
            .any(|read| keyword.eq_ignore_ascii_case(read))
        {
            Self::Read
        } else {
            Self::Write
        }
    }
}

/// Post-hoc time budget for one query.
struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    fn start(guardrails: QueryGuardrails) -> Self {
        Self {
            started: Instant::now(),
            budget: Duration::from_millis(guardrails.query_timeout_ms),
        }
    }

    fn check(&self) -> Result<(), WarehouseError> {
        if self.started.elapsed() <= self.budget {
            return Ok(());
        }
        Err(WarehouseError::QueryTimeout {
            timeout_ms: u64::try_from(self.budget.as_millis()).unwrap_or(u64::MAX),
        })
    }
}

/// Validate and run `sql` on `connection`.
pub(crate) fn run_guarded(
    connection: &Connection,
    sql: &str,
    guardrails: QueryGuardrails,
    allow_write: bool,
) -> Result<QueryResult, WarehouseError> {
    let guardrails = guardrails.check()?;
    let sql = sql.trim().trim_end_matches(';').trim_end();
    if sql.is_empty() {
        return Err(rejected("query is empty"));
    }

    let deadline = Deadline::start(guardrails);
    match StatementKind::of(sql) {
        StatementKind::Read if statement_count(sql) > 1 && !allow_write => Err(rejected(
            "read-only queries must be a single statement",
        )),
        StatementKind::Read => read_rows(connection, sql, guardrails.max_rows, &deadline),
        StatementKind::Write if allow_write => {
            connection.execute_batch(sql)?;
            deadline.check()?;
            Ok(QueryResult::empty())
        }
        StatementKind::Write => Err(rejected(
            "write statements are refused without --write",
        )),
    }
}

fn read_rows(
    connection: &Connection,
    sql: &str,
    max_rows: usize,
    deadline: &Deadline,
) -> Result<QueryResult, WarehouseError> {
    let mut statement = connection.prepare(sql)?;
    let mut cursor = statement.query([])?;
    let columns = cursor
        .as_ref()
        .map(|executed| {
            executed
                .column_names()
                .into_iter()
                .enumerate()
                .map(|(index, name)| SqlColumn {
                    name,
                    r#type: executed.column_type(index).to_string(),
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    deadline.check()?;

    let mut rows = Vec::new();
    let mut truncated = false;
    while let Some(row) = cursor.next()? {
        deadline.check()?;
        if rows.len() == max_rows {
            truncated = true;
            break;
        }
        let mut cells = Vec::with_capacity(columns.len());
        for index in 0..columns.len() {
            cells.push(json_cell(row.get(index)?));
        }
        rows.push(cells);
    }
    deadline.check()?;

    Ok(QueryResult {
        row_count: rows.len(),
        columns,
        rows,
        truncated,
    })
}

fn json_cell(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(flag) => Value::from(flag),
        DuckValue::TinyInt(number) => Value::from(number),
        DuckValue::SmallInt(number) => Value::from(number),
        DuckValue::Int(number) => Value::from(number),
        DuckValue::BigInt(number) => Value::from(number),
        DuckValue::UTinyInt(number) => Value::from(number),
        DuckValue::USmallInt(number) => Value::from(number),
        DuckValue::UInt(number) => Value::from(number),
        DuckValue::UBigInt(number) => Value::from(number),
        // SUM over BIGINT widens to HUGEINT.
        DuckValue::HugeInt(number) => {
            i64::try_from(number).map_or_else(|_| Value::from(number.to_string()), Value::from)
        }
        // Non-finite floats become null.
        DuckValue::Float(number) => Value::from(f64::from(number)),
        DuckValue::Double(number) => Value::from(number),
        DuckValue::Text(text) => Value::from(text),
        DuckValue::Blob(bytes) => Value::from(hex::encode(bytes)),
        other => Value::from(format!("{other:?}")),
    }
}

fn statement_count(sql: &str) -> usize {
    sql.split(';').filter(|part| !part.trim().is_empty()).count()
}

fn rejected(reason: &str) -> WarehouseError {
    WarehouseError::QueryRejected(reason.to_owned())
}
