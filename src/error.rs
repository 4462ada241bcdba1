use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] StoreError),
    #[error("failed to write report: {0}")]
    OutputWrite(String),
    #[error("ingest failed: {0}")]
    Ingest(String),
    #[error("report task failed: {0}")]
    Task(String),
    #[error("report run not found: {0}")]
    RunNotFound(String),
    #[error("report run {run_id} is already {status}")]
    RunFinished { run_id: String, status: String },
    #[error("state lock poisoned")]
    StateLock,
}

