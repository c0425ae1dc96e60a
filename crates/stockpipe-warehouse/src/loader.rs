//! Raw price table loads.
//!
//! A load writes one run's combined dataset into the raw table. The default
//! [`LoadPolicy::Replace`] supersedes the table's previous contents entirely,
//! which keeps reruns over the same lookback window idempotent but drops any
//! rows that fall outside the window.

use std::fmt::{Display, Formatter};

use ::duckdb::{params, Connection, ToSql};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{finalize_transaction, TableRef, Warehouse, WarehouseError};

/// Behaviour when the destination table already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPolicy {
    /// Drop and recreate the table with this run's rows only.
    #[default]
    Replace,
    /// Keep existing rows and insert this run's rows after them.
    Append,
    /// Refuse to load into an existing table.
    Fail,
}

impl LoadPolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Append => "append",
            Self::Fail => "fail",
        }
    }
}

impl Display for LoadPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by a raw table load. All of them abort the run.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("refusing to load an empty dataset into '{table}'")]
    EmptyDataset { table: String },

    #[error("table '{table}' already exists and the load policy is 'fail'")]
    TableExists { table: String },

    #[error("write to '{table}' failed: {source}")]
    Write {
        table: String,
        #[source]
        source: WarehouseError,
    },
}

/// One row of the raw price table, already in warehouse column order.
///
/// Dates and timestamps are ISO 8601 strings cast by the database on insert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawPriceRow {
    /// Trading day (`YYYY-MM-DD`).
    pub date: String,
    pub symbol: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub adj_close: Option<f64>,
    pub volume: Option<i64>,
    /// Batch timestamp shared by every row of a run.
    pub load_timestamp: String,
    /// Batch date shared by every row of a run.
    pub load_date: String,
}

/// Result of a successful load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadOutcome {
    pub load_id: String,
    pub target_table: String,
    pub policy: LoadPolicy,
    pub rows_loaded: usize,
    /// Rows in the table after the load (differs from `rows_loaded` only on append).
    pub table_rows: usize,
    /// Distinct symbols in first-appearance order.
    pub symbols_loaded: Vec<String>,
}

const RAW_TABLE_COLUMNS: &str = "\
    date DATE NOT NULL, \
    symbol VARCHAR NOT NULL, \
    open DOUBLE, \
    high DOUBLE, \
    low DOUBLE, \
    close DOUBLE, \
    adj_close DOUBLE, \
    volume BIGINT, \
    load_timestamp TIMESTAMP, \
    load_date DATE";

impl Warehouse {
    /// Load rows into the raw price table under the given policy.
    ///
    /// The whole load runs in a single transaction: on any failure the table is
    /// left exactly as it was before the call.
    pub fn load_raw_prices(
        &self,
        target: &TableRef,
        rows: &[RawPriceRow],
        policy: LoadPolicy,
    ) -> Result<LoadOutcome, LoadError> {
        let table = target.to_string();
        if rows.is_empty() {
            return Err(LoadError::EmptyDataset { table });
        }

        let write_error = |source: WarehouseError| LoadError::Write {
            table: table.clone(),
            source,
        };

        let connection = self.connection().map_err(write_error)?;
        connection
            .execute_batch("BEGIN TRANSACTION")
            .map_err(|error| write_error(error.into()))?;

        let result = (|| -> Result<LoadOutcome, LoadError> {
            connection
                .execute_batch(&format!(
                    "CREATE SCHEMA IF NOT EXISTS {};",
                    target.dataset.quoted()
                ))
                .map_err(|error| write_error(error.into()))?;

            let exists = table_exists(&connection, target).map_err(write_error)?;
            let ddl = match (policy, exists) {
                (LoadPolicy::Fail, true) => {
                    return Err(LoadError::TableExists {
                        table: table.clone(),
                    })
                }
                (LoadPolicy::Replace, _) => format!(
                    "CREATE OR REPLACE TABLE {} ({RAW_TABLE_COLUMNS});",
                    target.qualified()
                ),
                (LoadPolicy::Append | LoadPolicy::Fail, _) => format!(
                    "CREATE TABLE IF NOT EXISTS {} ({RAW_TABLE_COLUMNS});",
                    target.qualified()
                ),
            };
            connection
                .execute_batch(&ddl)
                .map_err(|error| write_error(error.into()))?;

            insert_rows(&connection, target, rows).map_err(write_error)?;

            let table_rows: i64 = connection
                .query_row(
                    &format!("SELECT COUNT(*) FROM {}", target.qualified()),
                    [],
                    |row| row.get(0),
                )
                .map_err(|error| write_error(error.into()))?;

            let outcome = LoadOutcome {
                load_id: Uuid::new_v4().to_string(),
                target_table: table.clone(),
                policy,
                rows_loaded: rows.len(),
                table_rows: usize::try_from(table_rows).unwrap_or_default(),
                symbols_loaded: distinct_symbols(rows),
            };
            record_load(&connection, &outcome).map_err(write_error)?;
            Ok(outcome)
        })();

        match result {
            Ok(outcome) => {
                finalize_transaction(&connection, Ok(outcome)).map_err(write_error)
            }
            Err(error) => {
                let _ = connection.execute_batch("ROLLBACK");
                Err(error)
            }
        }
    }
}

fn table_exists(connection: &Connection, target: &TableRef) -> Result<bool, WarehouseError> {
    let count: i64 = connection.query_row(
        "SELECT COUNT(*) FROM information_schema.tables \
         WHERE table_schema = ? AND table_name = ?",
        params![target.dataset.as_str(), target.table.as_str()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn insert_rows(
    connection: &Connection,
    target: &TableRef,
    rows: &[RawPriceRow],
) -> Result<(), WarehouseError> {
    let insert_sql = format!(
        "INSERT INTO {} \
         (date, symbol, open, high, low, close, adj_close, volume, load_timestamp, load_date) \
         VALUES (CAST(? AS DATE), ?, ?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP), CAST(? AS DATE))",
        target.qualified()
    );
    let mut statement = connection.prepare(&insert_sql)?;

    for row in rows {
        let params: [&dyn ToSql; 10] = [
            &row.date,
            &row.symbol,
            &row.open,
            &row.high,
            &row.low,
            &row.close,
            &row.adj_close,
            &row.volume,
            &row.load_timestamp,
            &row.load_date,
        ];
        statement.execute(params.as_slice())?;
    }

    Ok(())
}

fn record_load(connection: &Connection, outcome: &LoadOutcome) -> Result<(), WarehouseError> {
    let rows_loaded = i64::try_from(outcome.rows_loaded).unwrap_or(i64::MAX);
    let symbols = outcome.symbols_loaded.join(",");
    let params: [&dyn ToSql; 5] = [
        &outcome.load_id,
        &outcome.target_table,
        &outcome.policy.as_str(),
        &rows_loaded,
        &symbols,
    ];
    connection.execute(
        "INSERT INTO load_log (load_id, target_table, policy, rows_loaded, symbols, loaded_at) \
         VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP)",
        params.as_slice(),
    )?;
    Ok(())
}

fn distinct_symbols(rows: &[RawPriceRow]) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    for row in rows {
        if !symbols.iter().any(|symbol| symbol == &row.symbol) {
            symbols.push(row.symbol.clone());
        }
    }
    symbols
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{QueryGuardrails, WarehouseConfig};
    use tempfile::tempdir;

    fn open_warehouse(temp: &tempfile::TempDir) -> Warehouse {
        Warehouse::open(WarehouseConfig {
            home: temp.path().to_path_buf(),
            db_path: temp.path().join("warehouse.duckdb"),
            max_pool_size: 2,
        })
        .expect("warehouse open")
    }

    fn row(symbol: &str, date: &str, close: f64) -> RawPriceRow {
        RawPriceRow {
            date: date.to_string(),
            symbol: symbol.to_string(),
            open: Some(close - 1.0),
            high: Some(close + 1.0),
            low: Some(close - 2.0),
            close: Some(close),
            adj_close: Some(close),
            volume: Some(1_000),
            load_timestamp: "2026-03-02 12:00:00".to_string(),
            load_date: "2026-03-02".to_string(),
        }
    }

    fn count_rows(warehouse: &Warehouse, table: &TableRef) -> i64 {
        let result = warehouse
            .execute_query(
                &format!("SELECT COUNT(*) FROM {}", table.qualified()),
                QueryGuardrails::default(),
                false,
            )
            .expect("count query");
        result.rows[0][0].as_i64().expect("integer count")
    }

    #[test]
    fn replace_policy_supersedes_previous_contents() {
        let temp = tempdir().expect("tempdir");
        let warehouse = open_warehouse(&temp);
        let target = TableRef::parse("market_data", "raw_stock_prices").expect("table");

        let first = vec![
            row("AAPL", "2026-02-23", 10.0),
            row("AAPL", "2026-02-24", 11.0),
            row("MSFT", "2026-02-23", 20.0),
        ];
        warehouse
            .load_raw_prices(&target, &first, LoadPolicy::Replace)
            .expect("first load");
        let second = vec![row("AAPL", "2026-02-25", 12.0)];
        let outcome = warehouse
            .load_raw_prices(&target, &second, LoadPolicy::Replace)
            .expect("second load");

        assert_eq!(outcome.rows_loaded, 1);
        assert_eq!(outcome.table_rows, 1);
        assert_eq!(count_rows(&warehouse, &target), 1);
    }

    #[test]
    fn append_policy_keeps_previous_rows() {
        let temp = tempdir().expect("tempdir");
        let warehouse = open_warehouse(&temp);
        let target = TableRef::parse("market_data", "raw_stock_prices").expect("table");

        let rows = vec![row("AAPL", "2026-02-23", 10.0)];
        warehouse
            .load_raw_prices(&target, &rows, LoadPolicy::Append)
            .expect("first load");
        let outcome = warehouse
            .load_raw_prices(&target, &rows, LoadPolicy::Append)
            .expect("second load");

        assert_eq!(outcome.table_rows, 2);
    }

    #[test]
    fn fail_policy_rejects_existing_table_and_leaves_it_untouched() {
        let temp = tempdir().expect("tempdir");
        let warehouse = open_warehouse(&temp);
        let target = TableRef::parse("market_data", "raw_stock_prices").expect("table");

        let rows = vec![row("AAPL", "2026-02-23", 10.0)];
        warehouse
            .load_raw_prices(&target, &rows, LoadPolicy::Fail)
            .expect("table does not exist yet");
        let error = warehouse
            .load_raw_prices(&target, &rows, LoadPolicy::Fail)
            .expect_err("table exists");

        assert!(matches!(error, LoadError::TableExists { .. }));
        assert_eq!(count_rows(&warehouse, &target), 1);
    }

    #[test]
    fn failed_replace_rolls_back_to_previous_contents() {
        let temp = tempdir().expect("tempdir");
        let warehouse = open_warehouse(&temp);
        let target = TableRef::parse("market_data", "raw_stock_prices").expect("table");

        warehouse
            .load_raw_prices(&target, &[row("AAPL", "2026-02-23", 10.0)], LoadPolicy::Replace)
            .expect("seed load");

        let mut broken = row("AAPL", "2026-02-24", 11.0);
        broken.date = String::from("not-a-date");
        let error = warehouse
            .load_raw_prices(&target, &[broken], LoadPolicy::Replace)
            .expect_err("bad date must fail the load");

        assert!(matches!(error, LoadError::Write { .. }));
        assert!(error.to_string().contains("market_data.raw_stock_prices"));
        assert_eq!(count_rows(&warehouse, &target), 1);
    }

    #[test]
    fn empty_dataset_is_rejected() {
        let temp = tempdir().expect("tempdir");
        let warehouse = open_warehouse(&temp);
        let target = TableRef::parse("market_data", "raw_stock_prices").expect("table");

        let error = warehouse
            .load_raw_prices(&target, &[], LoadPolicy::Replace)
            .expect_err("empty");
        assert!(matches!(error, LoadError::EmptyDataset { .. }));
    }

    #[test]
    fn load_is_logged_with_distinct_symbols() {
        let temp = tempdir().expect("tempdir");
        let warehouse = open_warehouse(&temp);
        let target = TableRef::parse("market_data", "raw_stock_prices").expect("table");

        let rows = vec![
            row("MSFT", "2026-02-23", 20.0),
            row("AAPL", "2026-02-23", 10.0),
            row("MSFT", "2026-02-24", 21.0),
        ];
        let outcome = warehouse
            .load_raw_prices(&target, &rows, LoadPolicy::Replace)
            .expect("load");
        assert_eq!(outcome.symbols_loaded, vec!["MSFT", "AAPL"]);

        let latest = warehouse.latest_load().expect("query").expect("logged");
        assert_eq!(latest.load_id, outcome.load_id);
        assert_eq!(latest.rows_loaded, 3);
        assert_eq!(latest.symbols, "MSFT,AAPL");
    }
}
