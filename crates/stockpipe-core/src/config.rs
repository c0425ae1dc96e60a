//! Pipeline configuration.
//!
//! Values come from environment-style keys. The CLI feeds in its flags (which
//! fall back to the same environment variables), and tests feed in maps.

use std::path::PathBuf;

use stockpipe_warehouse::{
    resolve_stockpipe_home, Identifier, LoadPolicy, Model, TableRef, WarehouseConfig,
};

use crate::http_client::HttpAuth;
use crate::throttling::RequestPacing;
use crate::{ExtractOptions, Symbol, ValidationError};

pub const SYMBOLS_ENV: &str = "STOCK_SYMBOLS";
pub const HISTORY_DAYS_ENV: &str = "STOCK_HISTORY_DAYS";
pub const PROJECT_ID_ENV: &str = "WAREHOUSE_PROJECT_ID";
pub const DATASET_ID_ENV: &str = "WAREHOUSE_DATASET_ID";
pub const TABLE_ID_ENV: &str = "WAREHOUSE_TABLE_ID";
pub const HOME_ENV: &str = "STOCKPIPE_HOME";
pub const FETCH_CONCURRENCY_ENV: &str = "STOCKPIPE_FETCH_CONCURRENCY";
pub const REQUEST_DELAY_ENV: &str = "STOCKPIPE_REQUEST_DELAY_MS";
pub const YAHOO_COOKIE_ENV: &str = "YAHOO_COOKIE";

pub const DEFAULT_SYMBOLS: &str = "AAPL,MSFT,GOOGL,AMZN,META";
pub const DEFAULT_HISTORY_DAYS: u32 = 60;
pub const DEFAULT_PROJECT_ID: &str = "stockpipe";
pub const DEFAULT_DATASET_ID: &str = "market_data";
pub const DEFAULT_TABLE_ID: &str = "raw_stock_prices";

/// Everything a pipeline run needs to know before it starts.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub symbols: Vec<Symbol>,
    pub history_days: u32,
    pub project_id: Identifier,
    pub raw_table: TableRef,
    pub home: PathBuf,
    pub load_policy: LoadPolicy,
    pub extract: ExtractOptions,
    pub yahoo_cookie: Option<String>,
}

impl PipelineConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let symbols = Symbol::parse_list(&value(SYMBOLS_ENV).unwrap_or_else(|| DEFAULT_SYMBOLS.to_owned()))?;

        let history_days = match value(HISTORY_DAYS_ENV) {
            None => DEFAULT_HISTORY_DAYS,
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|days| *days > 0)
                .ok_or(ValidationError::InvalidHistoryDays { value: raw })?,
        };

        let project_id = identifier("project id", value(PROJECT_ID_ENV), DEFAULT_PROJECT_ID)?;
        let dataset_id = identifier("dataset id", value(DATASET_ID_ENV), DEFAULT_DATASET_ID)?;
        let table_id = identifier("table id", value(TABLE_ID_ENV), DEFAULT_TABLE_ID)?;
        // Models are built next to the raw table and would replace it.
        if let Some(model) = Model::named(table_id.as_str()) {
            return Err(ValidationError::ReservedTableId {
                value: table_id.as_str().to_owned(),
                model: model.name(),
            });
        }

        let home = value(HOME_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(resolve_stockpipe_home);

        let concurrency = match value(FETCH_CONCURRENCY_ENV) {
            None => 1,
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|count| *count > 0)
                .ok_or(ValidationError::InvalidConcurrency { value: raw })?,
        };

        let pacing = match value(REQUEST_DELAY_ENV) {
            None => RequestPacing::disabled(),
            Some(raw) => raw.parse()?,
        };

        Ok(Self {
            symbols,
            history_days,
            project_id,
            raw_table: TableRef::new(dataset_id, table_id),
            home,
            load_policy: LoadPolicy::Replace,
            extract: ExtractOptions {
                concurrency,
                pacing,
            },
            yahoo_cookie: value(YAHOO_COOKIE_ENV),
        })
    }

    /// The warehouse file for this project.
    pub fn warehouse_config(&self) -> WarehouseConfig {
        WarehouseConfig::for_project(self.home.clone(), &self.project_id)
    }

    pub fn yahoo_auth(&self) -> HttpAuth {
        match &self.yahoo_cookie {
            Some(cookie) => HttpAuth::Cookie(cookie.clone()),
            None => HttpAuth::None,
        }
    }

    pub fn symbol_names(&self) -> Vec<String> {
        self.symbols.iter().map(Symbol::to_string).collect()
    }
}

fn identifier(
    field: &'static str,
    value: Option<String>,
    default: &str,
) -> Result<Identifier, ValidationError> {
    let raw = value.unwrap_or_else(|| default.to_owned());
    Identifier::parse(&raw).map_err(|_| ValidationError::InvalidIdentifier { field, value: raw })
}
