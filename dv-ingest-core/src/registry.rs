//! Submission front door: one tracked job per path, run on a bounded pool of workers.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{watch, Semaphore};
use tracing::{error, info, warn};

use crate::config::IngestConfig;
use crate::contract::{DatasetRepository, DepositValidator};
use crate::error::{IngestError, Result};
use crate::job::{load_deposits, ImportJob, JobStatus};
use crate::output::OutputArea;

pub struct JobRegistry {
    config: Arc<IngestConfig>,
    inbox: PathBuf,
    outbox: PathBuf,
    repository: Arc<dyn DatasetRepository>,
    validator: Arc<dyn DepositValidator>,
    workers: Arc<Semaphore>,
    jobs: Mutex<HashMap<PathBuf, watch::Receiver<JobStatus>>>,
}

impl JobRegistry {
    /// Creates a registry. The inbox and outbox must exist.
    pub fn new(
        config: IngestConfig,
        repository: Arc<dyn DatasetRepository>,
        validator: Arc<dyn DepositValidator>,
    ) -> Result<Self> {
        let inbox = canonical(&config.inbox, "inbox")?;
        let outbox = canonical(&config.outbox, "outbox")?;
        let workers = Arc::new(Semaphore::new(config.workers.max(1)));
        config.trace_loaded();
        Ok(Self {
            config: Arc::new(config),
            inbox,
            outbox,
            repository,
            validator,
            workers,
            jobs: Mutex::new(HashMap::new()),
        })
    }

    /// Validates a submission, loads its deposits, prepares its output area and starts
    /// the job.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, path: impl AsRef<Path>, single_object: bool) -> Result<JobStatus> {
        let path = submission_path(path.as_ref())?;
        let path = path.as_path();
        let mut jobs = self.lock_jobs();
        if jobs.contains_key(path) {
            return Err(IngestError::Configuration(format!(
                "Path already submitted: {}",
                path.display()
            )));
        }
        let output_root = self.output_root(path, single_object)?;
        let deposits = load_deposits(path, single_object)?;
        let output = OutputArea::prepare(&output_root, single_object)?;

        let (tx, rx) = watch::channel(JobStatus::pending(path, single_object));
        let status = rx.borrow().clone();
        jobs.insert(path.to_path_buf(), rx);
        drop(jobs);

        let job = ImportJob::new(
            deposits,
            output,
            self.config.clone(),
            self.repository.clone(),
            self.validator.clone(),
            tx,
        );
        let workers = self.workers.clone();
        tokio::spawn(async move {
            match workers.acquire_owned().await {
                Ok(_permit) => job.run().await,
                Err(e) => {
                    error!(error = ?e, "[JOB] Worker pool closed");
                    job.fail(format!("Worker pool closed: {e}"));
                }
            }
        });
        info!(
            job_id = %status.job_id,
            path = %path.display(),
            single_object,
            output = %output_root.display(),
            "[JOB] Submitted"
        );
        Ok(status)
    }

    /// Latest status of the job submitted for `path`.
    pub fn status(&self, path: impl AsRef<Path>) -> Result<JobStatus> {
        let path = submission_path(path.as_ref())?;
        self.lock_jobs()
            .get(&path)
            .map(|rx| rx.borrow().clone())
            .ok_or_else(|| not_tracked(&path))
    }

    /// Waits until the job for `path` is done or failed and returns its final status.
    pub async fn wait(&self, path: impl AsRef<Path>) -> Result<JobStatus> {
        let path = submission_path(path.as_ref())?;
        let mut rx = self
            .lock_jobs()
            .get(&path)
            .cloned()
            .ok_or_else(|| not_tracked(&path))?;
        let finished = rx
            .wait_for(|status| status.state.is_terminal())
            .await
            .map(|status| status.clone());
        match finished {
            Ok(status) => Ok(status),
            Err(_) => {
                warn!(path = %path.display(), "[JOB] Job ended without a final status");
                Ok(rx.borrow().clone())
            }
        }
    }

    /// Stops tracking `path` so it can be submitted again. A running job is not stopped.
    pub fn evict(&self, path: impl AsRef<Path>) -> Result<JobStatus> {
        let path = submission_path(path.as_ref())?;
        let rx = self.lock_jobs().remove(&path).ok_or_else(|| not_tracked(&path))?;
        let status = rx.borrow().clone();
        info!(path = %path.display(), state = ?status.state, "[JOB] Evicted");
        Ok(status)
    }

    /// Paths currently tracked, sorted.
    pub fn tracked(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.lock_jobs().keys().cloned().collect();
        paths.sort();
        paths
    }

    fn output_root(&self, path: &Path, single_object: bool) -> Result<PathBuf> {
        output_root(&self.inbox, &self.outbox, path, single_object)
    }

    fn lock_jobs(&self) -> MutexGuard<'_, HashMap<PathBuf, watch::Receiver<JobStatus>>> {
        // A panic while holding the lock cannot leave the map half updated.
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Mirrors the position of a submission under the inbox inside the outbox.
/// A single deposit shares the output root of its parent directory.
///
/// Fails if `path` is not a valid submission path or does not lie under `inbox`.
pub fn output_root(inbox: &Path, outbox: &Path, path: &Path, single_object: bool) -> Result<PathBuf> {
    let path = submission_path(path)?;
    let relative = path.strip_prefix(inbox).map_err(|_| {
        IngestError::Configuration(format!(
            "Path {} is not in inbox {}",
            path.display(),
            inbox.display()
        ))
    })?;
    let mirrored = if single_object {
        relative.parent().unwrap_or_else(|| Path::new(""))
    } else {
        relative
    };
    Ok(outbox.join(mirrored))
}

/// The form of `path` under which a submission is checked and tracked: absolute, free of
/// `..` and with `.` components and trailing separators dropped.
pub fn submission_path(path: &Path) -> Result<PathBuf> {
    if !path.is_absolute() {
        return Err(IngestError::Configuration(format!(
            "Path must be absolute: {}",
            path.display()
        )));
    }
    if path.components().any(|c| c == Component::ParentDir) {
        return Err(IngestError::Configuration(format!(
            "Path must not contain '..': {}",
            path.display()
        )));
    }
    Ok(path.components().collect())
}

/// Resolves a configured directory, which must exist.
pub fn canonical(path: &Path, what: &str) -> Result<PathBuf> {
    path.canonicalize().map_err(|e| {
        IngestError::Configuration(format!("Cannot resolve {what} {}: {e}", path.display()))
    })
}

fn not_tracked(path: &Path) -> IngestError {
    IngestError::Configuration(format!("No job tracked for {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_root_mirrors_inbox_layout() {
        let inbox = Path::new("/in");
        let outbox = Path::new("/out");
        assert_eq!(
            output_root(inbox, outbox, Path::new("/in/batches/b1"), false).unwrap(),
            PathBuf::from("/out/batches/b1")
        );
        assert_eq!(
            output_root(inbox, outbox, Path::new("/in/batches/d1"), true).unwrap(),
            PathBuf::from("/out/batches")
        );
        assert!(output_root(inbox, outbox, Path::new("batches/b1"), false).is_err());
        assert!(output_root(inbox, outbox, Path::new("/elsewhere/b1"), false).is_err());
        assert!(output_root(inbox, outbox, Path::new("/in/../elsewhere"), false).is_err());
    }

    #[test]
    fn submission_path_is_normalised() {
        assert_eq!(
            submission_path(Path::new("/in/./batches/b1/")).unwrap(),
            PathBuf::from("/in/batches/b1")
        );
        assert!(submission_path(Path::new("/in/x/../b1")).is_err());
        assert!(submission_path(Path::new("in/b1")).is_err());
    }
}
