use serde_json::Value;
use stockpipe_core::PipelineConfig;

use crate::error::CliError;

use super::open_warehouse;

pub fn run(config: &PipelineConfig) -> Result<Value, CliError> {
    let warehouse = open_warehouse(config)?;
    let report = warehouse.run_models(&config.raw_table)?;
    Ok(serde_json::to_value(report)?)
}
