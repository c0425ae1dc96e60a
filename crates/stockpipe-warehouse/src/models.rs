//! Transformation models built on top of the raw price table.
//!
//! The lineage is strictly linear:
//!
//! ```text
//! raw table ──▶ stg_stock_prices (view) ──▶ daily_stock_metrics (table) ──▶ weekly_stock_summary (table)
//! ```
//!
//! Weeks start on Monday (`date_trunc('week', ...)`), and `day_of_week` uses the
//! matching ISO numbering where Monday is 1 and Sunday is 7.

use std::fmt::{Display, Formatter};
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;

use crate::{Identifier, TableRef, Warehouse, WarehouseError};

/// Errors raised while building models or running data tests on them.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("model '{model}' failed to build: {source}")]
    Model {
        model: &'static str,
        #[source]
        source: WarehouseError,
    },

    #[error("data test '{test}' could not run: {source}")]
    TestQuery {
        test: String,
        #[source]
        source: WarehouseError,
    },

    #[error("data test '{test}' failed with {failures} failing row(s)")]
    TestFailed { test: String, failures: i64 },

    #[error("raw table '{table}' has the same name as model '{model}'")]
    RawTableIsModel { table: String, model: &'static str },
}

/// How a model is persisted in the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Materialization {
    /// Recomputed on every read.
    View,
    /// Rebuilt from scratch on every transformation run.
    Table,
}

/// One node of the transformation lineage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Model {
    Staging,
    DailyMetrics,
    WeeklySummary,
}

impl Model {
    /// All models in build order.
    pub const ALL: [Self; 3] = [Self::Staging, Self::DailyMetrics, Self::WeeklySummary];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Staging => "stg_stock_prices",
            Self::DailyMetrics => "daily_stock_metrics",
            Self::WeeklySummary => "weekly_stock_summary",
        }
    }

    /// The model whose relation is called `name`, ignoring ASCII case.
    pub fn named(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|model| model.name().eq_ignore_ascii_case(name))
    }

    pub const fn materialization(self) -> Materialization {
        match self {
            Self::Staging => Materialization::View,
            Self::DailyMetrics | Self::WeeklySummary => Materialization::Table,
        }
    }

    /// The model this one reads from; `None` means the raw table.
    pub const fn upstream(self) -> Option<Self> {
        match self {
            Self::Staging => None,
            Self::DailyMetrics => Some(Self::Staging),
            Self::WeeklySummary => Some(Self::DailyMetrics),
        }
    }

    /// Where this model lives: the raw table's dataset.
    pub fn relation(self, raw: &TableRef) -> TableRef {
        raw.sibling(Identifier::from_static(self.name()))
    }

    /// Render the `CREATE OR REPLACE` statement that materializes this model.
    pub fn render(self, raw: &TableRef) -> String {
        let target = self.relation(raw).qualified();
        let source = match self.upstream() {
            Some(upstream) => upstream.relation(raw).qualified(),
            None => raw.qualified(),
        };

        match self {
            Self::Staging => format!(
                "CREATE OR REPLACE VIEW {target} AS
SELECT
    date,
    symbol,
    open,
    high,
    low,
    close,
    volume
FROM {source};"
            ),
            Self::DailyMetrics => format!(
                "CREATE OR REPLACE TABLE {target} AS
WITH priced AS (
    SELECT
        date,
        symbol,
        open,
        high,
        low,
        close,
        volume,
        LAG(close) OVER (PARTITION BY symbol ORDER BY date) AS prev_close
    FROM {source}
)
SELECT
    date,
    symbol,
    open,
    high,
    low,
    close,
    volume,
    CASE
        WHEN prev_close IS NULL OR prev_close = 0 THEN NULL
        ELSE ROUND((close - prev_close) / prev_close * 100, 2)
    END AS daily_return,
    CASE
        WHEN open IS NULL OR open = 0 THEN NULL
        ELSE ROUND((high - low) / open * 100, 2)
    END AS daily_volatility,
    ROUND(AVG(close) OVER (
        PARTITION BY symbol
        ORDER BY date
        ROWS BETWEEN 4 PRECEDING AND CURRENT ROW
    ), 2) AS moving_avg_5d,
    CAST(ISODOW(date) AS INTEGER) AS day_of_week,
    CASE
        WHEN close IS NULL OR open IS NULL THEN NULL
        WHEN close > open THEN 'Up'
        WHEN close < open THEN 'Down'
        ELSE 'Flat'
    END AS day_direction
FROM priced
ORDER BY symbol, date;"
            ),
            Self::WeeklySummary => format!(
                "CREATE OR REPLACE TABLE {target} AS
WITH weekly AS (
    SELECT
        CAST(DATE_TRUNC('week', date) AS DATE) AS week_starting,
        symbol,
        AVG(daily_return) AS avg_daily_return,
        AVG(daily_volatility) AS avg_daily_volatility,
        MAX(high) AS weekly_high,
        MIN(low) AS weekly_low,
        CAST(SUM(volume) AS BIGINT) AS weekly_volume,
        COUNT(*) AS trading_days,
        MIN(date) AS first_day,
        MAX(date) AS last_day
    FROM {source}
    GROUP BY 1, 2
),
bounded AS (
    SELECT
        weekly.*,
        opening.open AS week_open,
        closing.close AS week_close
    FROM weekly
    LEFT JOIN {source} AS opening
        ON opening.symbol = weekly.symbol AND opening.date = weekly.first_day
    LEFT JOIN {source} AS closing
        ON closing.symbol = weekly.symbol AND closing.date = weekly.last_day
)
SELECT
    week_starting,
    symbol,
    avg_daily_return,
    avg_daily_volatility,
    weekly_high,
    weekly_low,
    weekly_volume,
    trading_days,
    week_open,
    week_close,
    CASE
        WHEN week_open IS NULL OR week_open = 0 THEN NULL
        ELSE ROUND((week_close - week_open) / week_open * 100, 2)
    END AS weekly_return
FROM bounded
ORDER BY week_starting DESC, symbol;"
            ),
        }
    }
}

impl Display for Model {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of building a single model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelRun {
    pub model: Model,
    pub relation: String,
    pub materialization: Materialization,
    pub rows: i64,
    pub elapsed_ms: u64,
}

/// Outcome of a full transformation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransformReport {
    pub models: Vec<ModelRun>,
}

impl Warehouse {
    /// Build every model in lineage order, stopping at the first failure.
    ///
    /// Models built before a failure keep their new contents; later models keep
    /// whatever their previous successful run produced.
    pub fn run_models(&self, raw: &TableRef) -> Result<TransformReport, TransformError> {
        if let Some(model) = Model::named(raw.table.as_str()) {
            return Err(TransformError::RawTableIsModel {
                table: raw.to_string(),
                model: model.name(),
            });
        }

        let mut report = TransformReport::default();
        for model in Model::ALL {
            report.models.push(self.run_model(model, raw)?);
        }
        Ok(report)
    }

    /// Build a single model from its upstream relation.
    pub fn run_model(&self, model: Model, raw: &TableRef) -> Result<ModelRun, TransformError> {
        let started = Instant::now();
        let model_error = |source: WarehouseError| TransformError::Model {
            model: model.name(),
            source,
        };

        let connection = self.connection().map_err(model_error)?;
        connection
            .execute_batch(&model.render(raw))
            .map_err(|error| model_error(error.into()))?;

        let relation = model.relation(raw);
        let rows: i64 = connection
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", relation.qualified()),
                [],
                |row| row.get(0),
            )
            .map_err(|error| model_error(error.into()))?;

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            model = model.name(),
            relation = %relation,
            rows,
            elapsed_ms,
            "built model"
        );

        Ok(ModelRun {
            model,
            relation: relation.to_string(),
            materialization: model.materialization(),
            rows,
            elapsed_ms,
        })
    }
}
