//! # Stockpipe Warehouse
//!
//! DuckDB-backed analytical store for the stock price pipeline.
//!
//! ## Overview
//!
//! One warehouse file holds a single project. Each dataset is a DuckDB schema
//! inside that file, and the raw price table plus every transformation model
//! live in the same dataset.
//!
//! ### Features
//!
//! - **Raw loads**: transactional full replace, append or fail-if-exists
//! - **SQL models**: staging view, daily metrics and weekly summary tables
//! - **Data tests**: not-null, uniqueness and accepted-values checks
//! - **Query Guardrails**: read-only ad-hoc SQL with timeout and row limits
//! - **Run history**: every load and pipeline run is recorded
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stockpipe_warehouse::{QueryGuardrails, TableRef, Warehouse};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = Warehouse::open_default()?;
//!     let raw = TableRef::parse("market_data", "raw_stock_prices")?;
//!
//!     warehouse.run_models(&raw)?;
//!
//!     let result = warehouse.execute_query(
//!         "SELECT * FROM market_data.weekly_stock_summary LIMIT 10",
//!         QueryGuardrails::default(),
//!         false,
//!     )?;
//!     println!("{} weekly rows", result.row_count);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `<dataset>.<raw table>` | Raw daily prices, one row per symbol and day |
//! | `<dataset>.stg_stock_prices` | Staging view over the raw table |
//! | `<dataset>.daily_stock_metrics` | Returns, volatility, moving average |
//! | `<dataset>.weekly_stock_summary` | Per-week aggregates |
//! | `load_log` | One row per raw table load |
//! | `pipeline_runs` | One row per pipeline run |

pub mod duckdb;
pub mod migrations;

mod identifier;
mod loader;
mod models;
mod quality;
mod query;
mod runs;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::Connection;
use thiserror::Error;

pub use duckdb::{DuckDbConnectionManager, PooledConnection};
pub use identifier::{Identifier, TableRef};
pub use loader::{LoadError, LoadOutcome, LoadPolicy, RawPriceRow};
pub use models::{Materialization, Model, ModelRun, TransformError, TransformReport};
pub use quality::{default_suite, DataTest, TestOutcome, TestReport};
pub use query::{QueryGuardrails, QueryResult, SqlColumn};
pub use runs::{LoadLogEntry, PipelineRunEntry, RunStatus};

/// Failures raised by the warehouse and its guarded query path.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// Any error reported by `DuckDB` itself.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// Creating the warehouse directory failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Ad-hoc SQL refused before it reached `DuckDB`.
    #[error("query rejected: {0}")]
    QueryRejected(String),

    /// Ad-hoc SQL ran past its time budget.
    #[error("query timed out after {timeout_ms}ms")]
    QueryTimeout { timeout_ms: u64 },

    /// A project, dataset or table name is not a plain SQL identifier.
    #[error("invalid identifier '{value}': expected [A-Za-z_][A-Za-z0-9_]*")]
    InvalidIdentifier { value: String },
}

/// Where the warehouse file lives and how many connections it keeps.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for stockpipe data.
    pub home: PathBuf,
    /// `<home>/<project>.duckdb`.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept in the pool.
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self::for_project(resolve_stockpipe_home(), &Identifier::from_static("stockpipe"))
    }
}

impl WarehouseConfig {
    /// The warehouse file for `project` under `home` (`<home>/<project>.duckdb`).
    pub fn for_project(home: PathBuf, project: &Identifier) -> Self {
        let db_path = home.join(format!("{project}.duckdb"));
        Self {
            home,
            db_path,
            max_pool_size: 4,
        }
    }
}

/// The main warehouse interface.
#[derive(Clone)]
pub struct Warehouse {
    config: WarehouseConfig,
    manager: DuckDbConnectionManager,
}

impl Warehouse {
    /// Open the default `stockpipe` project under the resolved home.
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open a warehouse, creating the file and applying migrations as needed.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::open(config.db_path.clone(), config.max_pool_size)?;
        let warehouse = Self { config, manager };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    /// Apply pending schema migrations.
    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.connection()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    pub(crate) fn connection(&self) -> Result<PooledConnection, WarehouseError> {
        Ok(self.manager.acquire()?)
    }

    /// Run ad-hoc SQL. Statements that modify data need `allow_write`.
    pub fn execute_query(
        &self,
        sql: &str,
        guardrails: QueryGuardrails,
        allow_write: bool,
    ) -> Result<QueryResult, WarehouseError> {
        let connection = self.connection()?;
        query::run_guarded(&connection, sql, guardrails, allow_write)
    }
}

/// Commit on success, roll back on failure.
pub(crate) fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

/// Resolve the stockpipe home directory from `STOCKPIPE_HOME` or `$HOME/.stockpipe`.
pub fn resolve_stockpipe_home() -> PathBuf {
    if let Some(path) = env::var_os("STOCKPIPE_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".stockpipe");
    }

    PathBuf::from(".stockpipe")
}
