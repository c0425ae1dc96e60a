//! Data-quality tests run against the transformation models.
//!
//! Each test compiles to a query counting failing rows; a test passes when
//! that count is zero.

use serde::Serialize;

use crate::models::{Model, TransformError};
use crate::{TableRef, Warehouse, WarehouseError};

/// A single assertion over one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataTest {
    NotNull {
        model: Model,
        column: &'static str,
    },
    Unique {
        model: Model,
        columns: &'static [&'static str],
    },
    AcceptedValues {
        model: Model,
        column: &'static str,
        values: &'static [&'static str],
    },
}

impl DataTest {
    pub const fn model(&self) -> Model {
        match self {
            Self::NotNull { model, .. }
            | Self::Unique { model, .. }
            | Self::AcceptedValues { model, .. } => *model,
        }
    }

    /// Stable test name, e.g. `not_null_daily_stock_metrics_date`.
    pub fn name(&self) -> String {
        match self {
            Self::NotNull { model, column } => format!("not_null_{}_{column}", model.name()),
            Self::Unique { model, columns } => {
                format!("unique_{}_{}", model.name(), columns.join("_"))
            }
            Self::AcceptedValues { model, column, .. } => {
                format!("accepted_values_{}_{column}", model.name())
            }
        }
    }

    /// Query returning a single count of failing rows.
    pub fn failing_rows_sql(&self, raw: &TableRef) -> String {
        let relation = self.model().relation(raw).qualified();
        match self {
            Self::NotNull { column, .. } => {
                format!("SELECT COUNT(*) FROM {relation} WHERE {column} IS NULL")
            }
            Self::Unique { columns, .. } => {
                let key = columns.join(", ");
                format!(
                    "SELECT COUNT(*) FROM (SELECT {key} FROM {relation} GROUP BY {key} HAVING COUNT(*) > 1)"
                )
            }
            Self::AcceptedValues { column, values, .. } => {
                let accepted = values
                    .iter()
                    .map(|value| format!("'{}'", value.replace('\'', "''")))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "SELECT COUNT(*) FROM {relation} WHERE {column} IS NOT NULL AND {column} NOT IN ({accepted})"
                )
            }
        }
    }
}

/// The suite run after every transformation.
pub fn default_suite() -> Vec<DataTest> {
    vec![
        DataTest::NotNull {
            model: Model::Staging,
            column: "date",
        },
        DataTest::NotNull {
            model: Model::Staging,
            column: "symbol",
        },
        DataTest::NotNull {
            model: Model::DailyMetrics,
            column: "date",
        },
        DataTest::NotNull {
            model: Model::DailyMetrics,
            column: "symbol",
        },
        DataTest::Unique {
            model: Model::DailyMetrics,
            columns: &["symbol", "date"],
        },
        DataTest::AcceptedValues {
            model: Model::DailyMetrics,
            column: "day_direction",
            values: &["Up", "Down", "Flat"],
        },
        DataTest::NotNull {
            model: Model::WeeklySummary,
            column: "week_starting",
        },
        DataTest::NotNull {
            model: Model::WeeklySummary,
            column: "symbol",
        },
    ]
}

/// Result of one data test.
#[derive(Debug, Clone, Serialize)]
pub struct TestOutcome {
    pub test: String,
    pub model: Model,
    pub failures: i64,
    pub passed: bool,
}

/// Results of a whole suite.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TestReport {
    pub outcomes: Vec<TestOutcome>,
}

impl TestReport {
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.passed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &TestOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.passed)
    }

    /// Turn the first failing test into an error.
    pub fn ensure_passed(self) -> Result<Self, TransformError> {
        if let Some(failure) = self.failed().next() {
            return Err(TransformError::TestFailed {
                test: failure.test.clone(),
                failures: failure.failures,
            });
        }
        Ok(self)
    }
}

impl Warehouse {
    /// Run every test in `suite`, reporting all outcomes.
    ///
    /// A failing assertion is reported in the outcome, not as an error; only a
    /// test whose query cannot execute returns `Err`.
    pub fn test_models(
        &self,
        raw: &TableRef,
        suite: &[DataTest],
    ) -> Result<TestReport, TransformError> {
        let mut report = TestReport::default();
        for test in suite {
            let name = test.name();
            let failures = self
                .count_failures(test, raw)
                .map_err(|source| TransformError::TestQuery {
                    test: name.clone(),
                    source,
                })?;

            if failures > 0 {
                tracing::warn!(test = %name, failures, "data test failed");
            } else {
                tracing::debug!(test = %name, "data test passed");
            }

            report.outcomes.push(TestOutcome {
                test: name,
                model: test.model(),
                failures,
                passed: failures == 0,
            });
        }
        Ok(report)
    }

    fn count_failures(&self, test: &DataTest, raw: &TableRef) -> Result<i64, WarehouseError> {
        let connection = self.connection()?;
        let failures = connection.query_row(&test.failing_rows_sql(raw), [], |row| row.get(0))?;
        Ok(failures)
    }
}
