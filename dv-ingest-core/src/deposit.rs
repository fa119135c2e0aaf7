//! Deposits and their bags, as read from disk.
//!
//! A deposit directory holds one or more bags (subdirectories with a `bagit.txt`) and an
//! optional `deposit.properties`. Each bag carries a `data/` payload directory and its
//! instruction documents. Everything is read once, when the deposit is loaded.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::contract::{DatasetMetadata, FileMetadata};
use crate::error::{IngestError, Result};
use crate::properties::{DepositProperties, UPDATES_DATASET_KEY};

pub const BAGIT_FILE: &str = "bagit.txt";
pub const DATA_DIR: &str = "data";
pub const DATASET_FILE: &str = "dataset.yml";
pub const EDIT_FILE: &str = "edit.yml";
pub const UPDATE_STATE_FILE: &str = "update-state.yml";
pub const FILES_FILE: &str = "files.yml";

/// Relative file paths (under a bag's data directory) named by `edit.yml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditInstructions {
    #[serde(default)]
    pub delete_files: BTreeSet<String>,
    #[serde(default)]
    pub replace_files: BTreeSet<String>,
    #[serde(default)]
    pub add_restricted_files: BTreeSet<String>,
}

#[derive(Deserialize)]
struct EditDocument {
    #[serde(default)]
    edit: EditInstructions,
}

/// Terminal lifecycle action requested by `update-state.yml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateAction {
    PublishMajor,
    PublishMinor,
    /// Accepted in instructions but not acted upon yet.
    SubmitForReview,
}

impl fmt::Display for UpdateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateAction::PublishMajor => write!(f, "publish-major"),
            UpdateAction::PublishMinor => write!(f, "publish-minor"),
            UpdateAction::SubmitForReview => write!(f, "submit-for-review"),
        }
    }
}

#[derive(Deserialize)]
struct UpdateStateDocument {
    action: UpdateAction,
}

#[derive(Deserialize)]
struct FilesDocument {
    #[serde(default)]
    files: Vec<FileMetadata>,
}

/// One bag of a deposit. Immutable once read.
#[derive(Debug, Clone)]
pub struct Bag {
    name: String,
    location: PathBuf,
    pub dataset: DatasetMetadata,
    pub edit: Option<EditInstructions>,
    pub files: Option<Vec<FileMetadata>>,
    pub update_state: Option<UpdateAction>,
}

impl Bag {
    /// Reads a bag directory. Fails if it has no `bagit.txt` or no `dataset.yml`.
    pub fn load(location: &Path) -> Result<Self> {
        if !location.join(BAGIT_FILE).is_file() {
            return Err(IngestError::Configuration(format!(
                "Not a bag: {}",
                location.display()
            )));
        }
        let name = dir_name(location);
        let dataset = read_yaml::<DatasetMetadata>(&location.join(DATASET_FILE))?
            .ok_or_else(|| {
                IngestError::instructions(location.join(DATASET_FILE), "dataset metadata is required")
            })?
            .without_files();
        let edit = read_yaml::<EditDocument>(&location.join(EDIT_FILE))?.map(|doc| doc.edit);
        let files = read_yaml::<FilesDocument>(&location.join(FILES_FILE))?.map(|doc| doc.files);
        let update_state =
            read_yaml::<UpdateStateDocument>(&location.join(UPDATE_STATE_FILE))?.map(|doc| doc.action);

        debug!(
            bag = %name,
            has_edit = edit.is_some(),
            has_files = files.is_some(),
            update_state = ?update_state,
            "Loaded bag"
        );
        Ok(Self {
            name,
            location: location.to_path_buf(),
            dataset,
            edit,
            files,
            update_state,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn data_dir(&self) -> PathBuf {
        self.location.join(DATA_DIR)
    }
}

/// Terminal outcome of a deposit run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepositOutcome {
    Pending,
    Processed,
    Failed,
    Rejected,
}

impl DepositOutcome {
    /// Name of the output subdirectory the deposit is moved to.
    pub fn dir_name(&self) -> Option<&'static str> {
        match self {
            DepositOutcome::Pending => None,
            DepositOutcome::Processed => Some("processed"),
            DepositOutcome::Failed => Some("failed"),
            DepositOutcome::Rejected => Some("rejected"),
        }
    }
}

/// A directory submitted for ingestion.
#[derive(Debug, Clone)]
pub struct Deposit {
    id: String,
    location: PathBuf,
    bags: Vec<Bag>,
    updates_dataset: Option<String>,
    pub outcome: DepositOutcome,
}

impl Deposit {
    /// Reads a deposit directory and all of its bags, ordered by bag directory name.
    pub fn load(location: &Path) -> Result<Self> {
        let id = dir_name(location);
        let mut bag_dirs = Vec::new();
        let entries =
            fs::read_dir(location).map_err(|e| IngestError::io("list deposit", location, e))?;
        for entry in entries {
            let path = entry
                .map_err(|e| IngestError::io("list deposit", location, e))?
                .path();
            if path.is_dir() && path.join(BAGIT_FILE).is_file() {
                bag_dirs.push(path);
            }
        }
        bag_dirs.sort_by_key(|path| dir_name(path));
        if bag_dirs.is_empty() {
            return Err(IngestError::Configuration(format!(
                "No bags found in deposit {}",
                location.display()
            )));
        }

        let bags = bag_dirs
            .iter()
            .map(|dir| Bag::load(dir))
            .collect::<Result<Vec<_>>>()?;
        let properties = DepositProperties::load(location)?;
        let updates_dataset = properties
            .get(UPDATES_DATASET_KEY)
            .filter(|pid| !pid.is_empty())
            .map(str::to_string);

        info!(
            deposit = %id,
            bags = bags.len(),
            updates_dataset = updates_dataset.as_deref().unwrap_or("-"),
            "[DEPOSIT] Loaded deposit"
        );
        Ok(Self {
            id,
            location: location.to_path_buf(),
            bags,
            updates_dataset,
            outcome: DepositOutcome::Pending,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn bags(&self) -> &[Bag] {
        &self.bags
    }

    /// Identity of the dataset this deposit updates, if any.
    pub fn updates_dataset(&self) -> Option<&str> {
        self.updates_dataset.as_deref()
    }

    /// Lifecycle action of the first bag that requests one.
    pub fn update_action(&self) -> Option<UpdateAction> {
        self.bags.iter().find_map(|bag| bag.update_state)
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.is_file() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).map_err(|e| IngestError::io("read instructions", path, e))?;
    serde_yaml::from_str(&content)
        .map(Some)
        .map_err(|e| IngestError::instructions(path, e))
}
