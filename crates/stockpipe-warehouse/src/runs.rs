//! Load and pipeline run history.

use std::fmt::{Display, Formatter};

use ::duckdb::{params, ToSql};
use serde::Serialize;

use crate::{Warehouse, WarehouseError};

/// Lifecycle state of a recorded pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl Display for RunStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of `load_log`.
#[derive(Debug, Clone, Serialize)]
pub struct LoadLogEntry {
    pub load_id: String,
    pub target_table: String,
    pub policy: String,
    pub rows_loaded: i64,
    /// Comma-separated symbols in first-appearance order.
    pub symbols: String,
    pub loaded_at: String,
}

/// A row of `pipeline_runs`.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRunEntry {
    pub run_id: String,
    pub symbols: String,
    pub status: String,
    pub failed_task: Option<String>,
    pub message: Option<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
}

impl Warehouse {
    /// Record the start of a pipeline run.
    pub fn begin_run(&self, run_id: &str, symbols: &[String]) -> Result<(), WarehouseError> {
        let connection = self.connection()?;
        let symbols = symbols.join(",");
        connection.execute(
            "INSERT INTO pipeline_runs (run_id, symbols, status, started_at) \
             VALUES (?, ?, ?, CURRENT_TIMESTAMP)",
            params![run_id, symbols, RunStatus::Running.as_str()],
        )?;
        Ok(())
    }

    /// Record the final state of a pipeline run.
    pub fn finish_run(
        &self,
        run_id: &str,
        status: RunStatus,
        failed_task: Option<&str>,
        message: Option<&str>,
    ) -> Result<(), WarehouseError> {
        let connection = self.connection()?;
        let params: [&dyn ToSql; 4] = [&status.as_str(), &failed_task, &message, &run_id];
        connection.execute(
            "UPDATE pipeline_runs \
             SET status = ?, failed_task = ?, message = ?, finished_at = CURRENT_TIMESTAMP \
             WHERE run_id = ?",
            params.as_slice(),
        )?;
        Ok(())
    }

    /// Most recent pipeline runs, newest first.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<PipelineRunEntry>, WarehouseError> {
        let connection = self.connection()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut statement = connection.prepare(
            "SELECT run_id, symbols, status, failed_task, message, \
                    CAST(started_at AS VARCHAR), CAST(finished_at AS VARCHAR) \
             FROM pipeline_runs ORDER BY started_at DESC, run_id LIMIT ?",
        )?;
        let rows = statement.query_map(params![limit], |row| {
            Ok(PipelineRunEntry {
                run_id: row.get(0)?,
                symbols: row.get(1)?,
                status: row.get(2)?,
                failed_task: row.get(3)?,
                message: row.get(4)?,
                started_at: row.get(5)?,
                finished_at: row.get(6)?,
            })
        })?;

        let mut entries = Vec::new();
        for entry in rows {
            entries.push(entry?);
        }
        Ok(entries)
    }

    /// The most recent raw table load, if any.
    pub fn latest_load(&self) -> Result<Option<LoadLogEntry>, WarehouseError> {
        let connection = self.connection()?;
        let mut statement = connection.prepare(
            "SELECT load_id, target_table, policy, rows_loaded, symbols, CAST(loaded_at AS VARCHAR) \
             FROM load_log ORDER BY loaded_at DESC LIMIT 1",
        )?;
        let mut rows = statement.query([])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        Ok(Some(LoadLogEntry {
            load_id: row.get(0)?,
            target_table: row.get(1)?,
            policy: row.get(2)?,
            rows_loaded: row.get(3)?,
            symbols: row.get(4)?,
            loaded_at: row.get(5)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Identifier, WarehouseConfig};
    use tempfile::tempdir;

    #[test]
    fn run_lifecycle_is_recorded() {
        let temp = tempdir().expect("tempdir");
        let project = Identifier::parse("runs").expect("project");
        let warehouse =
            Warehouse::open(WarehouseConfig::for_project(temp.path().to_path_buf(), &project))
                .expect("warehouse open");

        let symbols = vec![String::from("AAPL"), String::from("MSFT")];
        warehouse.begin_run("run-1", &symbols).expect("begin");
        warehouse
            .finish_run(
                "run-1",
                RunStatus::Failed,
                Some("load_to_warehouse"),
                Some("table exists"),
            )
            .expect("finish");

        let runs = warehouse.recent_runs(5).expect("runs");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].symbols, "AAPL,MSFT");
        assert_eq!(runs[0].status, "failed");
        assert_eq!(runs[0].failed_task.as_deref(), Some("load_to_warehouse"));
        assert!(runs[0].finished_at.is_some());
    }

    #[test]
    fn latest_load_is_none_on_a_fresh_warehouse() {
        let temp = tempdir().expect("tempdir");
        let project = Identifier::parse("fresh").expect("project");
        let warehouse =
            Warehouse::open(WarehouseConfig::for_project(temp.path().to_path_buf(), &project))
                .expect("warehouse open");

        assert!(warehouse.latest_load().expect("query").is_none());
    }
}
