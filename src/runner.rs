use crate::error::AppError;
use crate::report::{ReportSettings, generate_report};
use crate::state::{Admission, AppState};
use crate::store::StoreConnector;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Runs report generation in the background and records the outcome in [`AppState`].
pub struct ReportRunner {
    state: Arc<RwLock<AppState>>,
    connector: Arc<dyn StoreConnector>,
    settings: ReportSettings,
    max_concurrent_runs: usize,
    handles: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl ReportRunner {
    pub fn new(
        state: Arc<RwLock<AppState>>,
        connector: Arc<dyn StoreConnector>,
        settings: ReportSettings,
        max_concurrent_runs: usize,
    ) -> Self {
        Self {
            state,
            connector,
            settings,
            max_concurrent_runs: max_concurrent_runs.max(1),
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn state(&self) -> &Arc<RwLock<AppState>> {
        &self.state
    }

    /// Start a new run, or join the oldest in-flight one when the concurrency limit is reached.
    pub async fn trigger(&self) -> Result<Admission, AppError> {
        let admission = {
            let mut state = self.state.write().map_err(|_| AppError::StateLock)?;
            state.admit_run(OffsetDateTime::now_utc(), self.max_concurrent_runs)
        };

        match &admission {
            Admission::Started(record) => {
                info!(run_id = %record.run_id, "Report run started");
                let handle = tokio::spawn(execute_run(
                    self.state.clone(),
                    self.connector.clone(),
                    self.settings.clone(),
                    record.run_id.clone(),
                ));
                let mut handles = self.handles.lock().await;
                handles.retain(|_, handle| !handle.is_finished());
                handles.insert(record.run_id.clone(), handle);
            }
            Admission::Coalesced(record) => {
                info!(run_id = %record.run_id, "Report run already in flight, reusing it");
            }
        }

        Ok(admission)
    }

    /// Wait for a run spawned by this runner to finish. Unknown or already reaped runs return at once.
    pub async fn wait(&self, run_id: &str) -> Result<(), AppError> {
        let handle = self.handles.lock().await.remove(run_id);
        match handle {
            Some(handle) => handle
                .await
                .map_err(|err| AppError::Task(err.to_string())),
            None => Ok(()),
        }
    }
}

async fn execute_run(
    state: Arc<RwLock<AppState>>,
    connector: Arc<dyn StoreConnector>,
    settings: ReportSettings,
    run_id: String,
) {
    let result = tokio::task::spawn_blocking(move || generate_report(connector.as_ref(), &settings))
        .await
        .map_err(|err| AppError::Task(err.to_string()))
        .and_then(|result| result);

    record_outcome(&state, &run_id, result);
}

fn record_outcome(state: &RwLock<AppState>, run_id: &str, result: Result<PathBuf, AppError>) {
    let now = OffsetDateTime::now_utc();
    let mut guard = match state.write() {
        Ok(guard) => guard,
        Err(_) => {
            error!(run_id, "State lock poisoned, report outcome lost");
            return;
        }
    };

    let update = match result {
        Ok(path) => {
            info!(run_id, path = %path.display(), "Report run complete");
            guard.complete_run(run_id, path, now)
        }
        Err(err) => {
            error!(run_id, error = %err, "Report run failed");
            guard.fail_run(run_id, err.to_string(), now)
        }
    };
    if let Err(err) = update {
        error!(run_id, error = %err, "Failed to record report outcome");
    }
}
