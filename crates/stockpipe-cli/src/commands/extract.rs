//! Extraction without a warehouse load.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use stockpipe_core::{
    extract_and_validate, iso_date, iso_timestamp, MarketDataSource, PipelineConfig,
    SymbolFailure, SymbolRows, ValidationReport,
};
use stockpipe_warehouse::RawPriceRow;
use time::OffsetDateTime;

use crate::cli::ExtractArgs;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct ExtractResponseData {
    window_start: String,
    window_end: String,
    load_timestamp: String,
    rows: usize,
    rows_per_symbol: Vec<SymbolRows>,
    validation: ValidationReport,
    skipped_symbols: Vec<SymbolFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    records: Option<Vec<RawPriceRow>>,
}

pub async fn run(
    args: &ExtractArgs,
    config: &PipelineConfig,
    source: Arc<dyn MarketDataSource>,
) -> Result<Value, CliError> {
    let extraction = extract_and_validate(
        source,
        &config.symbols,
        config.history_days,
        OffsetDateTime::now_utc(),
        config.extract,
    )
    .await?;

    let data = ExtractResponseData {
        window_start: iso_date(extraction.window.start()),
        window_end: iso_date(extraction.window.end()),
        load_timestamp: iso_timestamp(extraction.dataset.batch().load_timestamp),
        rows: extraction.dataset.len(),
        rows_per_symbol: extraction.rows_per_symbol(),
        validation: extraction.report,
        skipped_symbols: extraction.failures,
        records: args.rows.then(|| extraction.dataset.to_raw_rows()),
    };
    Ok(serde_json::to_value(data)?)
}
