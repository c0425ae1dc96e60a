use std::sync::Arc;

use serde_json::Value;
use stockpipe_core::{MarketDataSource, Pipeline, PipelineConfig};

use crate::error::CliError;

use super::open_warehouse;

pub async fn run(
    config: &PipelineConfig,
    source: Arc<dyn MarketDataSource>,
) -> Result<Value, CliError> {
    let warehouse = open_warehouse(config)?;
    let report = Pipeline::new(config.clone(), source, warehouse).run().await?;
    Ok(serde_json::to_value(report)?)
}
