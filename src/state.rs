use crate::error::AppError;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use time::OffsetDateTime;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Running,
    Complete,
    Error,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "Running",
            RunStatus::Complete => "Complete",
            RunStatus::Error => "Error",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub run_id: String,
    pub status: RunStatus,
    pub created_at: OffsetDateTime,
    pub completed_at: Option<OffsetDateTime>,
    pub artifact_path: Option<PathBuf>,
    pub error: Option<String>,
}

/// Result of asking the registry for a new run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Started(RunRecord),
    /// The concurrency limit was reached; the caller shares this in-flight run.
    Coalesced(RunRecord),
}

impl Admission {
    pub fn record(&self) -> &RunRecord {
        match self {
            Admission::Started(record) | Admission::Coalesced(record) => record,
        }
    }
}

/// In-memory registry of report runs.
#[derive(Debug)]
pub struct AppState {
    runs: HashMap<String, RunRecord>,
    last_finished: Option<String>,
    runs_tx: watch::Sender<Option<RunRecord>>,
}

impl AppState {
    pub fn new() -> Self {
        let (runs_tx, _runs_rx) = watch::channel(None);
        Self {
            runs: HashMap::new(),
            last_finished: None,
            runs_tx,
        }
    }

    pub fn subscribe_runs(&self) -> watch::Receiver<Option<RunRecord>> {
        self.runs_tx.subscribe()
    }

    pub fn run(&self, run_id: &str) -> Option<&RunRecord> {
        self.runs.get(run_id)
    }

    pub fn running_count(&self) -> usize {
        self.runs
            .values()
            .filter(|record| record.status == RunStatus::Running)
            .count()
    }

    /// The run that most recently reached `Complete` or `Error`.
    pub fn last_finished(&self) -> Option<&RunRecord> {
        self.last_finished
            .as_deref()
            .and_then(|run_id| self.runs.get(run_id))
    }

    /// Register a new `Running` run, or hand back the oldest in-flight run when
    /// `max_concurrent` runs are already running.
    pub fn admit_run(&mut self, now: OffsetDateTime, max_concurrent: usize) -> Admission {
        if self.running_count() >= max_concurrent.max(1)
            && let Some(oldest) = self
                .runs
                .values()
                .filter(|record| record.status == RunStatus::Running)
                .min_by_key(|record| record.created_at)
        {
            return Admission::Coalesced(oldest.clone());
        }

        let record = RunRecord {
            run_id: Uuid::new_v4().to_string(),
            status: RunStatus::Running,
            created_at: now,
            completed_at: None,
            artifact_path: None,
            error: None,
        };
        self.runs.insert(record.run_id.clone(), record.clone());
        self.runs_tx.send_replace(Some(record.clone()));
        Admission::Started(record)
    }

    pub fn complete_run(
        &mut self,
        run_id: &str,
        artifact_path: PathBuf,
        now: OffsetDateTime,
    ) -> Result<RunRecord, AppError> {
        self.finish(run_id, now, |record| {
            record.status = RunStatus::Complete;
            record.artifact_path = Some(artifact_path);
        })
    }

    pub fn fail_run(
        &mut self,
        run_id: &str,
        error: String,
        now: OffsetDateTime,
    ) -> Result<RunRecord, AppError> {
        self.finish(run_id, now, |record| {
            record.status = RunStatus::Error;
            record.error = Some(error);
        })
    }

    fn finish(
        &mut self,
        run_id: &str,
        now: OffsetDateTime,
        apply: impl FnOnce(&mut RunRecord),
    ) -> Result<RunRecord, AppError> {
        let record = self
            .runs
            .get_mut(run_id)
            .ok_or_else(|| AppError::RunNotFound(run_id.to_string()))?;
        if record.status != RunStatus::Running {
            return Err(AppError::RunFinished {
                run_id: run_id.to_string(),
                status: record.status.to_string(),
            });
        }

        apply(record);
        record.completed_at = Some(now);
        let updated = record.clone();
        self.last_finished = Some(run_id.to_string());
        self.runs_tx.send_replace(Some(updated.clone()));
        Ok(updated)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
