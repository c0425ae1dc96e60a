//! CLI argument definitions for stockpipe.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `run` | Run the full task graph |
//! | `extract` | Fetch and validate without loading |
//! | `transform` | Rebuild the three models from the raw table |
//! | `test` | Run the data-quality tests |
//! | `summary` | Show the latest load and recent runs |
//! | `sql` | Query the local DuckDB warehouse |
//!
//! # Global Options
//!
//! Every pipeline setting is a flag that falls back to its environment
//! variable (and `.env`):
//!
//! | Option | Environment | Default |
//! |--------|-------------|---------|
//! | `--symbols` | `STOCK_SYMBOLS` | `AAPL,MSFT,GOOGL,AMZN,META` |
//! | `--history-days` | `STOCK_HISTORY_DAYS` | `60` |
//! | `--project-id` | `WAREHOUSE_PROJECT_ID` | `stockpipe` |
//! | `--dataset-id` | `WAREHOUSE_DATASET_ID` | `market_data` |
//! | `--table-id` | `WAREHOUSE_TABLE_ID` | `raw_stock_prices` |
//! | `--home` | `STOCKPIPE_HOME` | `$HOME/.stockpipe` |
//! | `--fetch-concurrency` | `STOCKPIPE_FETCH_CONCURRENCY` | `1` |
//! | `--request-delay-ms` | `STOCKPIPE_REQUEST_DELAY_MS` | off |
//!
//! # Examples
//!
//! ```bash
//! # Offline run against the synthetic source
//! stockpipe run --mock --pretty
//!
//! # Two symbols, ten days, paced like a polite client
//! stockpipe run --symbols NVDA,TSLA --history-days 10 --request-delay-ms 2000-5000
//!
//! # Inspect the weekly model
//! stockpipe sql "SELECT * FROM market_data.weekly_stock_summary LIMIT 10"
//! ```

use clap::{Args, Parser, Subcommand};
use stockpipe_core::config::{
    DATASET_ID_ENV, FETCH_CONCURRENCY_ENV, HISTORY_DAYS_ENV, HOME_ENV, PROJECT_ID_ENV,
    REQUEST_DELAY_ENV, SYMBOLS_ENV, TABLE_ID_ENV, YAHOO_COOKIE_ENV,
};
use stockpipe_core::{PipelineConfig, ValidationError};

/// Daily stock price pipeline: extract, load, transform, test.
#[derive(Debug, Parser)]
#[command(
    name = "stockpipe",
    author,
    version,
    about = "Daily stock price ELT pipeline",
    long_about = "stockpipe fetches daily price history for a list of symbols, loads it into a \
local DuckDB warehouse, rebuilds the staging, daily metrics and weekly summary models, \
and runs data-quality tests over them.\n\
\n\
Use 'stockpipe <command> --help' for command-specific help."
)]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Use the deterministic synthetic source instead of Yahoo.
    #[arg(long, global = true, default_value_t = false)]
    pub mock: bool,

    #[command(flatten)]
    pub settings: PipelineArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Pipeline settings shared by every command.
#[derive(Debug, Default, Args)]
pub struct PipelineArgs {
    /// Comma-separated ticker symbols.
    #[arg(long, global = true, env = "STOCK_SYMBOLS")]
    pub symbols: Option<String>,

    /// Days of history to fetch, ending now.
    #[arg(long, global = true, env = "STOCK_HISTORY_DAYS")]
    pub history_days: Option<String>,

    /// Project name; selects the warehouse file.
    #[arg(long, global = true, env = "WAREHOUSE_PROJECT_ID")]
    pub project_id: Option<String>,

    /// Dataset (schema) holding the raw table and models.
    #[arg(long, global = true, env = "WAREHOUSE_DATASET_ID")]
    pub dataset_id: Option<String>,

    /// Raw price table name.
    #[arg(long, global = true, env = "WAREHOUSE_TABLE_ID")]
    pub table_id: Option<String>,

    /// Directory holding warehouse files.
    #[arg(long, global = true, env = "STOCKPIPE_HOME")]
    pub home: Option<String>,

    /// Maximum symbol fetches in flight.
    #[arg(long, global = true, env = "STOCKPIPE_FETCH_CONCURRENCY")]
    pub fetch_concurrency: Option<String>,

    /// Random pause before each provider call: 'MS', 'MIN-MAX' or 'off'.
    #[arg(long, global = true, env = "STOCKPIPE_REQUEST_DELAY_MS")]
    pub request_delay_ms: Option<String>,

    /// Cookie header sent to Yahoo.
    #[arg(long, global = true, env = "YAHOO_COOKIE", hide_env_values = true)]
    pub yahoo_cookie: Option<String>,
}

impl PipelineArgs {
    /// Flags already carry their environment fallback, so only flags are consulted.
    pub fn pipeline_config(&self) -> Result<PipelineConfig, ValidationError> {
        PipelineConfig::from_lookup(|key| self.value_for(key))
    }

    fn value_for(&self, key: &str) -> Option<String> {
        let value = match key {
            SYMBOLS_ENV => &self.symbols,
            HISTORY_DAYS_ENV => &self.history_days,
            PROJECT_ID_ENV => &self.project_id,
            DATASET_ID_ENV => &self.dataset_id,
            TABLE_ID_ENV => &self.table_id,
            HOME_ENV => &self.home,
            FETCH_CONCURRENCY_ENV => &self.fetch_concurrency,
            REQUEST_DELAY_ENV => &self.request_delay_ms,
            YAHOO_COOKIE_ENV => &self.yahoo_cookie,
            _ => return None,
        };
        value.clone()
    }
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the full task graph.
    ///
    /// start_pipeline, extract_and_validate, load_to_warehouse,
    /// log_load_results, run_transformations, test_models, end_pipeline.
    ///
    /// # Examples
    ///
    ///   stockpipe run
    ///   stockpipe run --mock --symbols AAPL,MSFT --pretty
    Run,

    /// Fetch and validate price history without touching the warehouse.
    Extract(ExtractArgs),

    /// Rebuild the staging view, daily metrics and weekly summary.
    Transform,

    /// Run the data-quality tests over the models.
    Test,

    /// Show the latest load and recent pipeline runs.
    Summary(SummaryArgs),

    /// Run SQL queries against the DuckDB warehouse.
    ///
    /// Read-only by default; use --write for data modifications.
    ///
    /// # Examples
    ///
    ///   stockpipe sql "SELECT * FROM market_data.daily_stock_metrics LIMIT 10"
    Sql(SqlArgs),
}

/// Arguments for the `extract` command.
#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Include every combined row in the output.
    #[arg(long, default_value_t = false)]
    pub rows: bool,
}

/// Arguments for the `summary` command.
#[derive(Debug, Args)]
pub struct SummaryArgs {
    /// Number of recent runs to list.
    #[arg(long, default_value_t = 10)]
    pub runs: usize,
}

/// Arguments for the `sql` command.
#[derive(Debug, Args)]
pub struct SqlArgs {
    /// SQL query to execute.
    pub query: String,

    /// Allow write operations (INSERT, UPDATE, DELETE, CREATE, etc.).
    #[arg(long, default_value_t = false)]
    pub write: bool,

    /// Maximum number of rows to return.
    #[arg(long, default_value_t = 10_000)]
    pub max_rows: usize,

    /// Query timeout in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    pub query_timeout_ms: u64,
}
