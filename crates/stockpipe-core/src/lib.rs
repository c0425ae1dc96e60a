//! # Stockpipe Core
//!
//! Extraction, validation and orchestration for the daily stock price pipeline.
//!
//! ## Overview
//!
//! - **Source adapters** that return one day-granularity frame per symbol
//! - **Extraction** that tolerates per-symbol failures and merges survivors
//! - **Validation** that counts data-quality findings without blocking the load
//! - **Task graph** that loads the warehouse, builds the models and runs the data tests
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Yahoo chart adapter and deterministic synthetic source |
//! | [`config`] | Pipeline configuration from environment-style keys |
//! | [`data_source`] | Source trait, history request and fetch errors |
//! | [`domain`] | Symbols, date windows, price records and combined datasets |
//! | [`error`] | Validation errors |
//! | [`extract`] | Fan-out fetch, merge and validation stage |
//! | [`http_client`] | HTTP client abstraction |
//! | [`pipeline`] | Fixed task graph and run report |
//! | [`retry`] | Retry and backoff policy for provider calls |
//! | [`throttling`] | Randomized pacing between provider calls |
//! | [`validation`] | Data-quality report |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CLI / Task run │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Extraction      │────▶│ Data Source      │
//! │ + Validation    │     │ (Yahoo/Synthetic)│
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Warehouse load  │────▶│ SQL models       │
//! │ (DuckDB)        │     │ + data tests     │
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Per-symbol fetch failures carry a kind and a stable code:
//!
//! ```rust
//! use stockpipe_core::{FetchError, FetchErrorKind};
//!
//! fn describe(error: &FetchError) -> &'static str {
//!     match error.kind() {
//!         FetchErrorKind::RateLimited => "slow down",
//!         FetchErrorKind::NoData => "nothing in window",
//!         _ => "skipped",
//!     }
//! }
//! ```

pub mod adapters;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod extract;
pub mod http_client;
pub mod pipeline;
pub mod retry;
pub mod throttling;
pub mod validation;

// Adapter implementations
pub use adapters::{SyntheticSource, YahooSource};

// Configuration
pub use config::PipelineConfig;

// Data source trait and types
pub use data_source::{
    FetchError, FetchErrorKind, HistoryRequest, MarketDataSource, SourceFuture,
};

// Domain models
pub use domain::{
    iso_date, iso_timestamp, CombinedDataset, CombinedRecord, DateWindow, LoadBatch, PriceRecord,
    Symbol, SymbolFrame, SymbolRows,
};

// Error types
pub use error::ValidationError;

// Extraction
pub use extract::{extract_and_validate, ExtractError, ExtractOptions, Extraction, SymbolFailure};

// HTTP client types
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpErrorKind, HttpFuture, HttpRequest, HttpResponse,
    ReqwestHttpClient,
};

// Task graph
pub use pipeline::{
    LoadSummary, Pipeline, PipelineError, PipelineReport, TaskError, TaskId, TaskRun,
};

// Retry logic
pub use retry::{Backoff, RetryConfig};

// Throttling
pub use throttling::RequestPacing;

// Validation
pub use validation::ValidationReport;

// Warehouse (re-exported from stockpipe-warehouse)
pub use stockpipe_warehouse::{
    LoadPolicy, TableRef, TestReport, TransformReport, Warehouse, WarehouseConfig, WarehouseError,
};
