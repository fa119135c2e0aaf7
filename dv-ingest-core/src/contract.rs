//! # contract: the seams between the ingest pipeline and its collaborators
//!
//! This module defines the capability interface of the remote dataset repository
//! ([`DatasetRepository`]) and the deposit acceptance hook ([`DepositValidator`]),
//! together with the plain data types that cross those seams.
//!
//! ## Mocking & Testing
//! - Both traits are annotated for `mockall`, so the pipeline can be driven by
//!   deterministic mocks in unit and integration tests (`MockDatasetRepository`,
//!   `MockDepositValidator`, exported by the default `test-export-mocks` feature).
//!
//! ## Implementing a repository client
//! - Implement [`DatasetRepository`] for the concrete transport.
//! - Convert every upstream failure into a boxed [`RemoteError`]; the pipeline wraps it
//!   with the name of the failing operation.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::deposit::Deposit;
use crate::error::IngestError;

/// Error type returned by repository clients.
pub type RemoteError = Box<dyn std::error::Error + Send + Sync>;

/// Numeric identifier of a file in the remote repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub i64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a file as reported by the remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id: FileId,
    pub label: String,
    #[serde(default)]
    pub directory_label: Option<String>,
    #[serde(default)]
    pub restricted: bool,
    #[serde(default)]
    pub size: u64,
}

impl RemoteFile {
    /// Key of this file within its dataset: `directoryLabel/label`, or `label`.
    pub fn logical_path(&self) -> String {
        logical_path(self.directory_label.as_deref(), &self.label)
    }
}

/// Joins a directory label and a file label into a logical path.
pub fn logical_path(directory_label: Option<&str>, label: &str) -> String {
    match directory_label {
        Some(dir) if !dir.trim_matches('/').is_empty() => {
            format!("{}/{}", dir.trim_matches('/'), label)
        }
        _ => label.to_string(),
    }
}

/// Dataset metadata document, opaque to the pipeline apart from its file list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetMetadata(pub serde_json::Value);

impl DatasetMetadata {
    /// Returns the document with `datasetVersion.files` forced to an empty list.
    /// Files are always added separately, never inline with the metadata.
    pub fn without_files(mut self) -> Self {
        if let Some(version) = self
            .0
            .get_mut("datasetVersion")
            .and_then(|v| v.as_object_mut())
        {
            version.insert("files".to_string(), serde_json::Value::Array(Vec::new()));
        }
        self
    }
}

/// Metadata to push for one file, as described in a bag's file-metadata instructions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restricted: Option<bool>,
    /// Any further fields are passed through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl FileMetadata {
    pub fn logical_path(&self) -> String {
        logical_path(self.directory_label.as_deref(), &self.label)
    }
}

/// Version bump applied when publishing a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionBump {
    Major,
    Minor,
}

/// Lifecycle state of a dataset's latest version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DatasetState {
    Draft,
    InReview,
    Released,
    Deaccessioned,
}

/// Capability interface of the remote dataset repository.
///
/// Every method is a single remote call; implementors must not retry mutating calls
/// on their own, because the pipeline relies on each call happening exactly once.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DatasetRepository: Send + Sync {
    /// Create a new dataset and return its persistent identifier.
    async fn create_dataset(&self, metadata: &DatasetMetadata) -> Result<String, RemoteError>;

    /// Replace the metadata of the draft version of an existing dataset.
    async fn update_dataset_metadata(
        &self,
        pid: &str,
        metadata: &DatasetMetadata,
    ) -> Result<(), RemoteError>;

    /// List every file in the latest version of the dataset. Expensive for large datasets.
    async fn list_files(&self, pid: &str) -> Result<Vec<RemoteFile>, RemoteError>;

    /// Delete a single file from the draft version.
    async fn delete_file(&self, file_id: FileId) -> Result<(), RemoteError>;

    /// Replace the content of an existing file with a local file.
    async fn replace_file(
        &self,
        pid: &str,
        file: &RemoteFile,
        local_path: &Path,
    ) -> Result<(), RemoteError>;

    /// Upload a zip archive; the repository unpacks it and returns the files it added.
    async fn add_files(
        &self,
        pid: &str,
        archive: &Path,
        restricted: bool,
    ) -> Result<Vec<RemoteFile>, RemoteError>;

    /// Push metadata fields for a single file.
    async fn update_file_metadata(
        &self,
        file_id: FileId,
        metadata: &FileMetadata,
    ) -> Result<(), RemoteError>;

    /// Publish the draft version with the given version bump.
    async fn publish(&self, pid: &str, bump: VersionBump) -> Result<(), RemoteError>;

    /// Current lifecycle state of the dataset's latest version.
    async fn dataset_state(&self, pid: &str) -> Result<DatasetState, RemoteError>;
}

/// Acceptance check run on a deposit before any remote call is made.
/// Returning [`IngestError::Rejected`] marks the deposit as rejected rather than failed.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait DepositValidator: Send + Sync {
    fn validate(&self, deposit: &Deposit) -> Result<(), IngestError>;
}
