//! Deposit-scoped cache of the files in the target dataset.
//!
//! Listing all files of a dataset is the slowest repository call for large datasets, so it
//! is made at most once per dataset per deposit run. After that the index follows the
//! remote state through [`RemoteFileIndex::put`] and [`RemoteFileIndex::remove`].

use std::collections::HashMap;

use tracing::debug;

use crate::contract::{DatasetRepository, RemoteFile};
use crate::error::{IngestError, Result};

#[derive(Debug, Default)]
pub struct RemoteFileIndex {
    pid: Option<String>,
    populated: bool,
    files: HashMap<String, RemoteFile>,
    listings: usize,
}

impl RemoteFileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a dataset that was just created and is therefore empty.
    pub fn track_new_dataset(&mut self, pid: &str) {
        self.pid = Some(pid.to_string());
        self.populated = true;
        self.files.clear();
    }

    /// Returns the file map of `pid`, listing the dataset on first use.
    pub async fn resolve(
        &mut self,
        repository: &dyn DatasetRepository,
        pid: &str,
    ) -> Result<&HashMap<String, RemoteFile>> {
        self.switch_to(pid);
        if self.populated {
            debug!(pid, files = self.files.len(), "[INDEX] Using cached file list");
        } else {
            debug!(pid, "[INDEX] Listing files in dataset");
            let listed = repository
                .list_files(pid)
                .await
                .map_err(IngestError::remote("list_files"))?;
            self.listings += 1;
            for file in listed {
                self.files.insert(file.logical_path(), file);
            }
            self.populated = true;
            debug!(pid, files = self.files.len(), "[INDEX] File list retrieved");
        }
        Ok(&self.files)
    }

    /// Looks up one logical path, listing the dataset on first use.
    pub async fn get(
        &mut self,
        repository: &dyn DatasetRepository,
        pid: &str,
        path: &str,
    ) -> Result<RemoteFile> {
        self.resolve(repository, pid)
            .await?
            .get(path)
            .cloned()
            .ok_or_else(|| IngestError::MissingRemoteFile {
                pid: pid.to_string(),
                path: path.to_string(),
            })
    }

    /// Records a file added to `pid`.
    pub fn put(&mut self, pid: &str, file: RemoteFile) {
        self.switch_to(pid);
        self.files.insert(file.logical_path(), file);
    }

    /// Forgets a file deleted from `pid`.
    pub fn remove(&mut self, pid: &str, path: &str) -> Option<RemoteFile> {
        self.switch_to(pid);
        self.files.remove(path)
    }

    /// Number of full listings made so far.
    pub fn listings(&self) -> usize {
        self.listings
    }

    fn switch_to(&mut self, pid: &str) {
        if self.pid.as_deref() != Some(pid) {
            self.pid = Some(pid.to_string());
            self.populated = false;
            self.files.clear();
        }
    }
}
