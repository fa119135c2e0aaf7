//! Per-deposit pipeline: turns the bags of one deposit into remote mutations.
//!
//! Each bag goes through the same fixed sequence of steps:
//!   1. resolve the dataset (create it, or update the metadata of the target)
//!   2. apply edit instructions: delete, then replace, then add restricted files
//!   3. add the remaining (unrestricted) files
//!   4. update file metadata
//!   5. run the lifecycle action (publish, or submit for review)
//!
//! Bags are processed in name order; the dataset created or updated by one bag is the
//! target of the next. Any error aborts the remaining steps for the whole deposit.
//!
//! The processor owns a [`RemoteFileIndex`] for the duration of one deposit, so the files
//! of the target dataset are listed at most once however many bags and files are involved.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::{IngestConfig, PollPolicy, UploadLimits};
use crate::contract::{DatasetRepository, DatasetState, FileMetadata, VersionBump};
use crate::deposit::{Bag, Deposit, UpdateAction};
use crate::error::{IngestError, Result};
use crate::file_index::RemoteFileIndex;
use crate::partition::{absolute_paths, partition};
use crate::wait::wait_for_state;
use crate::zipper::BatchZipper;

/// What happened to the dataset for one bag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BagReport {
    pub bag: String,
    pub pid: String,
    pub created: bool,
    pub deleted: usize,
    pub replaced: usize,
    pub added_restricted: usize,
    pub added_unrestricted: usize,
    pub batches: usize,
    pub metadata_updated: usize,
    pub action: Option<UpdateAction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositReport {
    pub deposit: String,
    pub pid: String,
    pub bags: Vec<BagReport>,
}

pub struct DepositProcessor {
    repository: Arc<dyn DatasetRepository>,
    limits: UploadLimits,
    temp_dir: Option<PathBuf>,
    poll: PollPolicy,
    index: RemoteFileIndex,
}

impl DepositProcessor {
    pub fn new(repository: Arc<dyn DatasetRepository>, config: &IngestConfig) -> Self {
        Self {
            repository,
            limits: config.upload,
            temp_dir: config.temp_dir.clone(),
            poll: config.publish_poll,
            index: RemoteFileIndex::new(),
        }
    }

    /// Number of full file listings made by this processor.
    pub fn listings(&self) -> usize {
        self.index.listings()
    }

    /// Runs every bag of the deposit and returns the identity of the resulting dataset.
    pub async fn process(&mut self, deposit: &Deposit) -> Result<DepositReport> {
        info!(
            deposit = deposit.id(),
            bags = deposit.bags().len(),
            "[DEPOSIT] Start processing"
        );
        let mut target = deposit.updates_dataset().map(str::to_string);
        let mut bags = Vec::with_capacity(deposit.bags().len());
        for bag in deposit.bags() {
            match self.process_bag(deposit.id(), bag, target.as_deref()).await {
                Ok(report) => {
                    target = Some(report.pid.clone());
                    bags.push(report);
                }
                Err(e) => {
                    error!(deposit = deposit.id(), bag = bag.name(), error = %e, "[BAG] Processing failed");
                    return Err(e);
                }
            }
        }
        let pid = target.ok_or_else(|| {
            IngestError::Configuration(format!("Deposit {} has no bags", deposit.id()))
        })?;
        info!(deposit = deposit.id(), pid = %pid, listings = self.listings(), "[DEPOSIT] End processing");
        Ok(DepositReport {
            deposit: deposit.id().to_string(),
            pid,
            bags,
        })
    }

    async fn process_bag(
        &mut self,
        deposit_id: &str,
        bag: &Bag,
        target: Option<&str>,
    ) -> Result<BagReport> {
        info!(deposit = deposit_id, bag = bag.name(), target = target.unwrap_or("-"), "[BAG] Start");
        let data_dir = bag.data_dir();
        let sets = partition(&data_dir, bag.edit.as_ref())?;

        let mut report = BagReport {
            bag: bag.name().to_string(),
            action: bag.update_state,
            ..BagReport::default()
        };

        // 1. Create new dataset or update existing dataset
        let pid = match target {
            None => {
                let pid = self.create_dataset(bag).await?;
                report.created = true;
                pid
            }
            Some(pid) => {
                self.update_dataset_metadata(bag, pid).await?;
                pid.to_string()
            }
        };
        report.pid = pid.clone();

        // 2. Edit instructions
        if bag.edit.is_some() {
            report.deleted = self.delete_files(&pid, &sets.delete).await?;
            report.replaced = self.replace_files(&pid, &data_dir, &sets.replace).await?;
            let (files, batches) = self
                .upload_files(&pid, &data_dir, &sets.add_restricted, true)
                .await?;
            report.added_restricted = files;
            report.batches += batches;
        } else {
            debug!(bag = bag.name(), "No edit instructions found. Skipping edit processing.");
        }

        // 3. Unrestricted files
        let (files, batches) = self
            .upload_files(&pid, &data_dir, &sets.add_unrestricted, false)
            .await?;
        report.added_unrestricted = files;
        report.batches += batches;

        // 4. File metadata
        report.metadata_updated = self.update_file_metadata(&pid, bag.files.as_deref()).await?;

        // 5. Lifecycle action
        self.process_update_state(&pid, bag.update_state).await?;

        info!(
            deposit = deposit_id,
            bag = bag.name(),
            pid = %pid,
            deleted = report.deleted,
            replaced = report.replaced,
            added_restricted = report.added_restricted,
            added_unrestricted = report.added_unrestricted,
            batches = report.batches,
            "[BAG] End"
        );
        Ok(report)
    }

    async fn create_dataset(&mut self, bag: &Bag) -> Result<String> {
        debug!(bag = bag.name(), "Creating new dataset");
        let pid = self
            .repository
            .create_dataset(&bag.dataset)
            .await
            .map_err(IngestError::remote("create_dataset"))?;
        self.index.track_new_dataset(&pid);
        info!(bag = bag.name(), pid = %pid, "[BAG] Created dataset");
        Ok(pid)
    }

    async fn update_dataset_metadata(&self, bag: &Bag, pid: &str) -> Result<()> {
        debug!(bag = bag.name(), pid, "Start updating dataset metadata");
        self.repository
            .update_dataset_metadata(pid, &bag.dataset)
            .await
            .map_err(IngestError::remote("update_dataset_metadata"))?;
        debug!(bag = bag.name(), pid, "End updating dataset metadata");
        Ok(())
    }

    async fn delete_files(&mut self, pid: &str, files: &BTreeSet<String>) -> Result<usize> {
        debug!(pid, files = files.len(), "Start deleting files");
        for path in files {
            let file = self.index.get(self.repository.as_ref(), pid, path).await?;
            debug!(pid, path = %path, file_id = %file.id, "Deleting file");
            self.repository
                .delete_file(file.id)
                .await
                .map_err(IngestError::remote("delete_file"))?;
            self.index.remove(pid, path);
        }
        debug!(pid, "End deleting files");
        Ok(files.len())
    }

    async fn replace_files(
        &mut self,
        pid: &str,
        data_dir: &Path,
        files: &BTreeSet<String>,
    ) -> Result<usize> {
        debug!(pid, files = files.len(), "Start replacing files");
        for (path, local) in files.iter().zip(absolute_paths(data_dir, files)) {
            let file = self.index.get(self.repository.as_ref(), pid, path).await?;
            debug!(pid, path = %path, file_id = %file.id, "Replacing file");
            self.repository
                .replace_file(pid, &file, &local)
                .await
                .map_err(IngestError::remote("replace_file"))?;
        }
        debug!(pid, "End replacing files");
        Ok(files.len())
    }

    /// Uploads `files` in bounded batches. Returns the number of files and batches uploaded.
    async fn upload_files(
        &mut self,
        pid: &str,
        data_dir: &Path,
        files: &BTreeSet<String>,
        restricted: bool,
    ) -> Result<(usize, usize)> {
        if files.is_empty() {
            debug!(pid, restricted, "No files to upload");
            return Ok((0, 0));
        }
        info!(pid, restricted, files = files.len(), "[UPLOAD] Start uploading files");
        let mut zipper = BatchZipper::new(
            data_dir,
            files.iter().cloned().collect::<Vec<_>>(),
            self.limits,
            self.temp_dir.clone(),
        );
        let mut batches = 0;
        loop {
            let (next, batch) = zipper.pack_next().await?;
            zipper = next;
            let Some(batch) = batch else { break };
            let added = self
                .repository
                .add_files(pid, batch.path(), restricted)
                .await
                .map_err(IngestError::remote("add_files"))?;
            batches += 1;
            debug!(
                pid,
                batch = batches,
                files = batch.files().len(),
                bytes = batch.bytes(),
                registered = added.len(),
                cumulative = zipper.zipped_count(),
                "[UPLOAD] Uploaded batch"
            );
            for file in added {
                self.index.put(pid, file);
            }
            batch.close()?;
        }
        info!(pid, restricted, files = zipper.zipped_count(), batches, "[UPLOAD] End uploading files");
        Ok((zipper.zipped_count(), batches))
    }

    async fn update_file_metadata(
        &mut self,
        pid: &str,
        files: Option<&[FileMetadata]>,
    ) -> Result<usize> {
        let Some(files) = files else {
            debug!(pid, "No file metadata instructions found. Skipping file metadata update.");
            return Ok(0);
        };
        debug!(pid, files = files.len(), "Start updating file metadata");
        for metadata in files {
            let path = metadata.logical_path();
            let file = self.index.get(self.repository.as_ref(), pid, &path).await?;
            self.repository
                .update_file_metadata(file.id, metadata)
                .await
                .map_err(IngestError::remote("update_file_metadata"))?;
        }
        debug!(pid, "End updating file metadata");
        Ok(files.len())
    }

    async fn process_update_state(&self, pid: &str, action: Option<UpdateAction>) -> Result<()> {
        match action {
            None => {
                debug!(pid, "No update state found. Skipping update state processing.");
                Ok(())
            }
            Some(UpdateAction::PublishMajor) => self.publish(pid, VersionBump::Major).await,
            Some(UpdateAction::PublishMinor) => self.publish(pid, VersionBump::Minor).await,
            Some(UpdateAction::SubmitForReview) => {
                warn!(pid, "submit-for-review is not supported yet; dataset stays in draft");
                Ok(())
            }
        }
    }

    async fn publish(&self, pid: &str, bump: VersionBump) -> Result<()> {
        info!(pid, bump = ?bump, "Publishing dataset");
        self.repository
            .publish(pid, bump)
            .await
            .map_err(IngestError::remote("publish"))?;
        wait_for_state(self.repository.as_ref(), pid, DatasetState::Released, &self.poll).await
    }
}
