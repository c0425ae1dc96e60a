//! Extraction and validation stage.
//!
//! Fetches every configured symbol, skips the ones that fail, merges the rest
//! in configured order under one load batch, and scores the result.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::Semaphore;

use crate::data_source::{FetchError, HistoryRequest, MarketDataSource};
use crate::throttling::RequestPacing;
use crate::validation::ValidationReport;
use crate::{CombinedDataset, DateWindow, LoadBatch, Symbol, SymbolFrame, SymbolRows, ValidationError};

/// Fan-out settings for per-symbol fetches.
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    /// Maximum fetches in flight at once.
    pub concurrency: usize,
    /// Pause drawn before each provider call.
    pub pacing: RequestPacing,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            pacing: RequestPacing::disabled(),
        }
    }
}

/// A symbol that was skipped, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolFailure {
    pub symbol: String,
    pub code: &'static str,
    pub message: String,
}

impl SymbolFailure {
    fn new(symbol: &Symbol, error: &FetchError) -> Self {
        Self {
            symbol: symbol.to_string(),
            code: error.code(),
            message: error.message().to_owned(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no data fetched for any of {attempted} symbol(s){}", describe_failures(.failures))]
    NoData {
        attempted: usize,
        failures: Vec<SymbolFailure>,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

fn describe_failures(failures: &[SymbolFailure]) -> String {
    if failures.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = failures
        .iter()
        .map(|failure| format!("{} ({})", failure.symbol, failure.code))
        .collect();
    format!(": {}", parts.join(", "))
}

/// Output of the stage, handed to the loader.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub window: DateWindow,
    pub dataset: CombinedDataset,
    pub report: ValidationReport,
    pub failures: Vec<SymbolFailure>,
}

impl Extraction {
    pub fn rows_per_symbol(&self) -> Vec<SymbolRows> {
        self.dataset.rows_per_symbol()
    }
}

/// Run extraction for `symbols` over the `history_days` before `now`.
///
/// # Errors
///
/// Returns [`ExtractError::NoData`] when every symbol fails or comes back
/// empty. Individual failures are logged and reported in
/// [`Extraction::failures`].
pub async fn extract_and_validate(
    source: Arc<dyn MarketDataSource>,
    symbols: &[Symbol],
    history_days: u32,
    now: OffsetDateTime,
    options: ExtractOptions,
) -> Result<Extraction, ExtractError> {
    let window = DateWindow::trailing(now, history_days)?;
    let batch = LoadBatch::at(now);
    tracing::info!(
        source = source.id(),
        symbols = symbols.len(),
        window = %window,
        "extracting price history"
    );

    let outcomes = fetch_all(source, symbols, window, options).await;

    let mut frames = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for (symbol, outcome) in symbols.iter().zip(outcomes) {
        match outcome {
            Ok(frame) => {
                tracing::info!(symbol = %symbol, rows = frame.len(), "fetched symbol");
                frames.push(frame);
            }
            Err(error) => {
                tracing::warn!(symbol = %symbol, code = error.code(), error = %error, "skipping symbol");
                failures.push(SymbolFailure::new(symbol, &error));
            }
        }
    }

    if frames.is_empty() {
        return Err(ExtractError::NoData {
            attempted: symbols.len(),
            failures,
        });
    }

    let dataset = CombinedDataset::merge(frames, batch);
    let report = ValidationReport::compute(&dataset);
    report.log_findings();
    tracing::info!(
        rows = dataset.len(),
        symbols = dataset.symbols().len(),
        skipped = failures.len(),
        "extraction complete"
    );

    Ok(Extraction {
        window,
        dataset,
        report,
        failures,
    })
}

/// Fetch every symbol with bounded concurrency, returning outcomes in input order.
///
/// All fetches finish before this returns.
async fn fetch_all(
    source: Arc<dyn MarketDataSource>,
    symbols: &[Symbol],
    window: DateWindow,
    options: ExtractOptions,
) -> Vec<Result<SymbolFrame, FetchError>> {
    let permits = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut handles = Vec::with_capacity(symbols.len());

    for symbol in symbols {
        let source = Arc::clone(&source);
        let permits = Arc::clone(&permits);
        let request = HistoryRequest::new(symbol.clone(), window);
        let pacing = options.pacing;

        handles.push(tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return Err(FetchError::internal("fetch pool closed"));
            };
            pacing.pause().await;
            fetch_one(source.as_ref(), request).await
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for (symbol, handle) in symbols.iter().zip(handles) {
        let outcome = handle.await.unwrap_or_else(|error| {
            Err(FetchError::internal(format!(
                "fetch task for '{symbol}' aborted: {error}"
            )))
        });
        outcomes.push(outcome);
    }
    outcomes
}

/// One fetch; an empty frame counts as a failure.
async fn fetch_one(
    source: &dyn MarketDataSource,
    request: HistoryRequest,
) -> Result<SymbolFrame, FetchError> {
    let symbol = request.symbol.clone();
    let window = request.window;
    let frame = source.fetch_history(request).await?;
    if frame.is_empty() {
        return Err(FetchError::no_data(&symbol, window));
    }
    Ok(frame)
}
