//! A submitted import job: one deposit directory, or a batch directory of deposits.
//!
//! The job is the only writer of its [`JobStatus`]; readers hold a `watch` receiver
//! and always see the latest snapshot.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::contract::{DatasetRepository, DepositValidator};
use crate::deposit::{Deposit, DepositOutcome};
use crate::error::{IngestError, Result};
use crate::output::OutputArea;
use crate::task::DepositTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

/// Point-in-time view of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    pub job_id: Uuid,
    pub path: PathBuf,
    pub single_object: bool,
    pub state: JobState,
    pub processed: usize,
    pub failed: usize,
    pub rejected: usize,
    /// Reason the job failed, when it did.
    pub error: Option<String>,
}

impl JobStatus {
    pub fn pending(path: &Path, single_object: bool) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            path: path.to_path_buf(),
            single_object,
            state: JobState::Pending,
            processed: 0,
            failed: 0,
            rejected: 0,
            error: None,
        }
    }

    fn count(&mut self, outcome: DepositOutcome) {
        match outcome {
            DepositOutcome::Processed => self.processed += 1,
            DepositOutcome::Failed => self.failed += 1,
            DepositOutcome::Rejected => self.rejected += 1,
            DepositOutcome::Pending => {}
        }
    }
}

pub struct ImportJob {
    path: PathBuf,
    single_object: bool,
    deposits: Vec<Deposit>,
    output: OutputArea,
    config: Arc<IngestConfig>,
    repository: Arc<dyn DatasetRepository>,
    validator: Arc<dyn DepositValidator>,
    status: watch::Sender<JobStatus>,
}

impl ImportJob {
    pub fn new(
        deposits: Vec<Deposit>,
        output: OutputArea,
        config: Arc<IngestConfig>,
        repository: Arc<dyn DatasetRepository>,
        validator: Arc<dyn DepositValidator>,
        status: watch::Sender<JobStatus>,
    ) -> Self {
        let (path, single_object) = {
            let current = status.borrow();
            (current.path.clone(), current.single_object)
        };
        Self {
            path,
            single_object,
            deposits,
            output,
            config,
            repository,
            validator,
            status,
        }
    }

    /// Runs the job to completion. The final state is published on the status channel.
    pub async fn run(mut self) {
        let job_id = self.status.borrow().job_id;
        info!(%job_id, path = %self.path.display(), single_object = self.single_object, "[JOB] Start");
        self.status.send_modify(|s| s.state = JobState::Running);

        match self.execute().await {
            Ok(()) => {
                self.status.send_modify(|s| s.state = JobState::Done);
                let status = self.status.borrow().clone();
                info!(
                    %job_id,
                    processed = status.processed,
                    failed = status.failed,
                    rejected = status.rejected,
                    "[JOB] Done"
                );
            }
            Err(e) => {
                error!(%job_id, path = %self.path.display(), error = ?e, "[JOB] Failed");
                self.fail(e.to_string());
            }
        }
    }

    /// Marks the job failed without running it.
    pub fn fail(&self, reason: String) {
        self.status.send_modify(|s| {
            s.state = JobState::Failed;
            s.error = Some(reason);
        });
    }

    async fn execute(&mut self) -> Result<()> {
        let deposits = std::mem::take(&mut self.deposits);
        for deposit in deposits {
            let task = DepositTask::new(
                deposit,
                &self.config,
                &self.output,
                self.repository.clone(),
                self.validator.as_ref(),
            );
            let outcome = task.run().await?;
            self.status.send_modify(|s| s.count(outcome));
        }
        Ok(())
    }
}

/// Loads every deposit of a submission before any of them is touched, so a malformed
/// deposit is reported to the submitter instead of leaving a batch half done.
pub fn load_deposits(path: &Path, single_object: bool) -> Result<Vec<Deposit>> {
    let deposits = deposit_dirs(path, single_object)?
        .iter()
        .map(|dir| Deposit::load(dir))
        .collect::<Result<Vec<_>>>()?;
    info!(path = %path.display(), deposits = deposits.len(), "[JOB] Deposits loaded");
    Ok(deposits)
}

fn deposit_dirs(path: &Path, single_object: bool) -> Result<Vec<PathBuf>> {
    if single_object {
        return Ok(vec![path.to_path_buf()]);
    }
    let entries = fs::read_dir(path).map_err(|e| IngestError::io("list batch", path, e))?;
    let mut dirs = Vec::new();
    for entry in entries {
        let dir = entry
            .map_err(|e| IngestError::io("list batch", path, e))?
            .path();
        if dir.is_dir() {
            dirs.push(dir);
        }
    }
    dirs.sort();
    Ok(dirs)
}
