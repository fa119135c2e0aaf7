//! Ingest settings: directories, upload limits, workers and publish polling.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Settings shared by the job registry and every deposit run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Submissions must lie under this directory.
    pub inbox: PathBuf,
    /// Output roots are created under this directory, mirroring the inbox layout.
    pub outbox: PathBuf,
    /// Where temporary upload archives are written; system temp dir when unset.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    #[serde(default)]
    pub upload: UploadLimits,
    /// Number of jobs allowed to run at the same time.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub publish_poll: PollPolicy,
}

impl IngestConfig {
    pub fn new(inbox: impl Into<PathBuf>, outbox: impl Into<PathBuf>) -> Self {
        Self {
            inbox: inbox.into(),
            outbox: outbox.into(),
            temp_dir: None,
            upload: UploadLimits::default(),
            workers: default_workers(),
            publish_poll: PollPolicy::default(),
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            inbox = %self.inbox.display(),
            outbox = %self.outbox.display(),
            workers = self.workers,
            max_files_per_upload = self.upload.max_files_per_upload,
            max_upload_size = self.upload.max_upload_size,
            "Loaded IngestConfig"
        );
        debug!(?self, "IngestConfig loaded (full debug)");
    }
}

/// Bounds applied to every upload archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadLimits {
    #[serde(default = "default_max_files")]
    pub max_files_per_upload: usize,
    /// Maximum cumulative size in bytes of the files in one archive.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_files_per_upload: default_max_files(),
            max_upload_size: default_max_upload_size(),
        }
    }
}

/// Bounded exponential backoff used while waiting for a dataset state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl PollPolicy {
    /// Delay to wait after the given (zero-based) attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let millis = self
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_workers() -> usize {
    2
}

fn default_max_files() -> usize {
    1000
}

fn default_max_upload_size() -> u64 {
    1024 * 1024 * 1024
}

fn default_max_attempts() -> u32 {
    10
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}
