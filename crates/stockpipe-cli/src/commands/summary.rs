//! Latest load and recent run history from the warehouse bookkeeping tables.

use serde::Serialize;
use serde_json::Value;
use stockpipe_core::PipelineConfig;
use stockpipe_warehouse::{LoadLogEntry, PipelineRunEntry};

use crate::cli::SummaryArgs;
use crate::error::CliError;

use super::open_warehouse;

#[derive(Debug, Serialize)]
struct SummaryResponseData {
    warehouse: String,
    raw_table: String,
    latest_load: Option<LoadLogEntry>,
    recent_runs: Vec<PipelineRunEntry>,
}

pub fn run(args: &SummaryArgs, config: &PipelineConfig) -> Result<Value, CliError> {
    let warehouse = open_warehouse(config)?;
    let data = SummaryResponseData {
        warehouse: warehouse.db_path().display().to_string(),
        raw_table: config.raw_table.to_string(),
        latest_load: warehouse.latest_load()?,
        recent_runs: warehouse.recent_runs(args.runs)?,
    };
    Ok(serde_json::to_value(data)?)
}
