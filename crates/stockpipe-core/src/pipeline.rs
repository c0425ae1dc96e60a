//! Fixed task graph for one pipeline run.
//!
//! ```text
//! start_pipeline ─▶ extract_and_validate ─▶ load_to_warehouse ─▶ log_load_results
//!                ─▶ run_transformations ─▶ test_models ─▶ end_pipeline
//! ```
//!
//! Tasks run strictly in order. Each one publishes its output to a
//! [`ResultStore`] keyed by task id, and the next task takes that output out of
//! the store. The first failing task halts the run; artifacts written by
//! earlier tasks stay in place.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use stockpipe_warehouse::{
    default_suite, LoadError, RunStatus, TestReport, TransformError, TransformReport, Warehouse,
    WarehouseError,
};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::extract::{extract_and_validate, ExtractError, Extraction, SymbolFailure};
use crate::validation::ValidationReport;
use crate::{iso_timestamp, MarketDataSource, PipelineConfig, SymbolRows};

/// Node of the task graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskId {
    StartPipeline,
    ExtractAndValidate,
    LoadToWarehouse,
    LogLoadResults,
    RunTransformations,
    TestModels,
    EndPipeline,
}

impl TaskId {
    /// Every task in execution order.
    pub const CHAIN: [Self; 7] = [
        Self::StartPipeline,
        Self::ExtractAndValidate,
        Self::LoadToWarehouse,
        Self::LogLoadResults,
        Self::RunTransformations,
        Self::TestModels,
        Self::EndPipeline,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::StartPipeline => "start_pipeline",
            Self::ExtractAndValidate => "extract_and_validate",
            Self::LoadToWarehouse => "load_to_warehouse",
            Self::LogLoadResults => "log_load_results",
            Self::RunTransformations => "run_transformations",
            Self::TestModels => "test_models",
            Self::EndPipeline => "end_pipeline",
        }
    }

    pub const fn upstream(self) -> Option<Self> {
        match self {
            Self::StartPipeline => None,
            Self::ExtractAndValidate => Some(Self::StartPipeline),
            Self::LoadToWarehouse => Some(Self::ExtractAndValidate),
            Self::LogLoadResults => Some(Self::LoadToWarehouse),
            Self::RunTransformations => Some(Self::LogLoadResults),
            Self::TestModels => Some(Self::RunTransformations),
            Self::EndPipeline => Some(Self::TestModels),
        }
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Record handed from the load task to the logging task.
#[derive(Debug, Clone, Serialize)]
pub struct LoadSummary {
    pub load_id: String,
    /// When the raw load committed.
    pub load_time: String,
    pub rows_loaded: usize,
    pub symbols_loaded: Vec<String>,
    pub target_table: String,
    pub validation_report: ValidationReport,
    pub rows_per_symbol: Vec<SymbolRows>,
    pub skipped_symbols: Vec<SymbolFailure>,
}

impl LoadSummary {
    pub fn average_rows_per_symbol(&self) -> f64 {
        if self.symbols_loaded.is_empty() {
            return 0.0;
        }
        self.rows_loaded as f64 / self.symbols_loaded.len() as f64
    }
}

/// Why a task failed.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error("no output from upstream task '{upstream}'")]
    MissingUpstream { upstream: TaskId },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline halted at task '{task}': {source}")]
    TaskFailed {
        task: TaskId,
        #[source]
        source: TaskError,
    },
}

impl PipelineError {
    pub fn task(&self) -> TaskId {
        match self {
            Self::TaskFailed { task, .. } => *task,
        }
    }
}

/// Output a task publishes for its downstream task.
#[derive(Debug)]
pub enum TaskOutput {
    Started { now: OffsetDateTime },
    Extracted(Extraction),
    Loaded(LoadSummary),
    Logged(LoadSummary),
    Transformed(TransformReport),
    Tested(TestReport),
    Finished,
}

/// Task outputs keyed by the task that produced them.
#[derive(Debug, Default)]
pub struct ResultStore {
    outputs: HashMap<TaskId, TaskOutput>,
}

impl ResultStore {
    pub fn publish(&mut self, task: TaskId, output: TaskOutput) {
        self.outputs.insert(task, output);
    }

    /// Remove and return the output of `task`'s upstream.
    pub fn take_upstream(&mut self, task: TaskId) -> Result<TaskOutput, TaskError> {
        let upstream = task.upstream().ok_or(TaskError::MissingUpstream { upstream: task })?;
        self.outputs
            .remove(&upstream)
            .ok_or(TaskError::MissingUpstream { upstream })
    }
}

/// Timing of one completed task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRun {
    pub task: TaskId,
    pub elapsed_ms: u64,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub tasks: Vec<TaskRun>,
    pub load_summary: Option<LoadSummary>,
    pub transform: Option<TransformReport>,
    pub tests: Option<TestReport>,
}

impl PipelineReport {
    fn new(run_id: String) -> Self {
        Self {
            run_id,
            tasks: Vec::new(),
            load_summary: None,
            transform: None,
            tests: None,
        }
    }

    fn observe(&mut self, output: &TaskOutput) {
        match output {
            TaskOutput::Logged(summary) => self.load_summary = Some(summary.clone()),
            TaskOutput::Transformed(report) => self.transform = Some(report.clone()),
            TaskOutput::Tested(report) => self.tests = Some(report.clone()),
            _ => {}
        }
    }
}

/// Runs the task graph against one source and one warehouse.
pub struct Pipeline {
    config: PipelineConfig,
    source: Arc<dyn MarketDataSource>,
    warehouse: Warehouse,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, source: Arc<dyn MarketDataSource>, warehouse: Warehouse) -> Self {
        Self {
            config,
            source,
            warehouse,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn warehouse(&self) -> &Warehouse {
        &self.warehouse
    }

    pub async fn run(&self) -> Result<PipelineReport, PipelineError> {
        self.run_at(OffsetDateTime::now_utc()).await
    }

    /// Run every task with `now` as the run's reference time.
    pub async fn run_at(&self, now: OffsetDateTime) -> Result<PipelineReport, PipelineError> {
        let run_id = Uuid::new_v4().to_string();
        let mut store = ResultStore::default();
        let mut report = PipelineReport::new(run_id.clone());

        for task in TaskId::CHAIN {
            let started = Instant::now();
            let output = match self.execute(task, &run_id, now, &mut store).await {
                Ok(output) => output,
                Err(source) => {
                    tracing::error!(task = task.name(), error = %source, "task failed");
                    self.record_failure(&run_id, task, &source);
                    return Err(PipelineError::TaskFailed { task, source });
                }
            };

            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            tracing::debug!(task = task.name(), elapsed_ms, "task succeeded");
            report.tasks.push(TaskRun { task, elapsed_ms });
            report.observe(&output);
            store.publish(task, output);
        }

        Ok(report)
    }

    async fn execute(
        &self,
        task: TaskId,
        run_id: &str,
        now: OffsetDateTime,
        store: &mut ResultStore,
    ) -> Result<TaskOutput, TaskError> {
        if task == TaskId::StartPipeline {
            return self.start_pipeline(run_id, now);
        }

        let input = store.take_upstream(task)?;
        let upstream = task.upstream().unwrap_or(task);
        match (task, input) {
            (TaskId::ExtractAndValidate, TaskOutput::Started { now }) => {
                let extraction = extract_and_validate(
                    Arc::clone(&self.source),
                    &self.config.symbols,
                    self.config.history_days,
                    now,
                    self.config.extract,
                )
                .await?;
                Ok(TaskOutput::Extracted(extraction))
            }
            (TaskId::LoadToWarehouse, TaskOutput::Extracted(extraction)) => {
                self.load_to_warehouse(extraction).map(TaskOutput::Loaded)
            }
            (TaskId::LogLoadResults, TaskOutput::Loaded(summary)) => {
                log_load_results(&summary);
                Ok(TaskOutput::Logged(summary))
            }
            (TaskId::RunTransformations, TaskOutput::Logged(_)) => {
                let report = self.warehouse.run_models(&self.config.raw_table)?;
                Ok(TaskOutput::Transformed(report))
            }
            (TaskId::TestModels, TaskOutput::Transformed(_)) => {
                let report = self
                    .warehouse
                    .test_models(&self.config.raw_table, &default_suite())?
                    .ensure_passed()?;
                tracing::info!(tests = report.outcomes.len(), "data tests passed");
                Ok(TaskOutput::Tested(report))
            }
            (TaskId::EndPipeline, TaskOutput::Tested(_)) => {
                self.warehouse
                    .finish_run(run_id, RunStatus::Succeeded, None, None)?;
                tracing::info!(run_id, "pipeline run succeeded");
                Ok(TaskOutput::Finished)
            }
            _ => Err(TaskError::MissingUpstream { upstream }),
        }
    }

    fn start_pipeline(&self, run_id: &str, now: OffsetDateTime) -> Result<TaskOutput, TaskError> {
        tracing::info!(
            run_id,
            symbols = ?self.config.symbol_names(),
            history_days = self.config.history_days,
            target = %self.config.raw_table,
            "starting pipeline run"
        );
        self.warehouse
            .begin_run(run_id, &self.config.symbol_names())?;
        Ok(TaskOutput::Started { now })
    }

    fn load_to_warehouse(&self, extraction: Extraction) -> Result<LoadSummary, TaskError> {
        let rows = extraction.dataset.to_raw_rows();
        let outcome =
            self.warehouse
                .load_raw_prices(&self.config.raw_table, &rows, self.config.load_policy)?;

        Ok(LoadSummary {
            load_id: outcome.load_id,
            load_time: iso_timestamp(OffsetDateTime::now_utc()),
            rows_loaded: outcome.rows_loaded,
            symbols_loaded: outcome.symbols_loaded,
            target_table: outcome.target_table,
            validation_report: extraction.report,
            rows_per_symbol: extraction.dataset.rows_per_symbol(),
            skipped_symbols: extraction.failures,
        })
    }

    fn record_failure(&self, run_id: &str, task: TaskId, error: &TaskError) {
        let message = error.to_string();
        if let Err(record_error) =
            self.warehouse
                .finish_run(run_id, RunStatus::Failed, Some(task.name()), Some(&message))
        {
            tracing::warn!(run_id, error = %record_error, "could not record failed run");
        }
    }
}

fn log_load_results(summary: &LoadSummary) {
    tracing::info!(
        load_time = %summary.load_time,
        rows_loaded = summary.rows_loaded,
        symbols = ?summary.symbols_loaded,
        target_table = %summary.target_table,
        "load summary"
    );
    tracing::info!(
        average_rows_per_symbol = format!("{:.1}", summary.average_rows_per_symbol()),
        "rows per symbol"
    );
    for entry in &summary.rows_per_symbol {
        tracing::info!(symbol = %entry.symbol, rows = entry.rows, "loaded symbol");
    }
    if !summary.skipped_symbols.is_empty() {
        tracing::warn!(
            skipped = summary.skipped_symbols.len(),
            symbols = ?summary
                .skipped_symbols
                .iter()
                .map(|failure| failure.symbol.as_str())
                .collect::<Vec<_>>(),
            "symbols skipped during extraction"
        );
    }
    let report = &summary.validation_report;
    if report.is_clean() {
        tracing::info!("validation found no issues");
    } else {
        tracing::warn!(
            negative_price_rows = report.negative_price_rows,
            high_less_than_low_rows = report.high_less_than_low_rows,
            missing_key_field_rows = report.missing_key_field_rows,
            "validation findings"
        );
    }
}
