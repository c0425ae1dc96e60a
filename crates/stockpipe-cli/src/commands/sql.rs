use serde_json::Value;
use stockpipe_core::PipelineConfig;
use stockpipe_warehouse::QueryGuardrails;

use crate::cli::SqlArgs;
use crate::error::CliError;

use super::open_warehouse;

pub fn run(args: &SqlArgs, config: &PipelineConfig) -> Result<Value, CliError> {
    let warehouse = open_warehouse(config)?;
    let guardrails = QueryGuardrails {
        max_rows: args.max_rows,
        query_timeout_ms: args.query_timeout_ms,
    };

    let result = warehouse.execute_query(&args.query, guardrails, args.write)?;
    if result.truncated {
        tracing::warn!(max_rows = args.max_rows, "result truncated");
    }
    Ok(serde_json::to_value(result)?)
}
