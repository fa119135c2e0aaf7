#![allow(dead_code)]

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use dv_ingest_core::contract::{
    DatasetMetadata, DatasetRepository, DatasetState, FileId, FileMetadata, RemoteError,
    RemoteFile, VersionBump,
};

pub const DATASET_YML: &str = "datasetVersion:\n  license: CC0\n  files:\n    - label: ignored.txt\n";

/// Writes a bag under `deposit`. `files` are paths relative to `data/` with their content.
pub fn write_bag(
    deposit: &Path,
    name: &str,
    files: &[(&str, &str)],
    edit: Option<&str>,
    update_state: Option<&str>,
) -> PathBuf {
    let bag = deposit.join(name);
    fs::create_dir_all(bag.join("data")).unwrap();
    fs::write(bag.join("bagit.txt"), "BagIt-Version: 0.97\n").unwrap();
    fs::write(bag.join("dataset.yml"), DATASET_YML).unwrap();
    for (path, content) in files {
        let target = bag.join("data").join(path);
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(target, content).unwrap();
    }
    if let Some(edit) = edit {
        fs::write(bag.join("edit.yml"), edit).unwrap();
    }
    if let Some(action) = update_state {
        fs::write(bag.join("update-state.yml"), format!("action: {action}\n")).unwrap();
    }
    bag
}

/// One `add_files` call as seen by the fake.
#[derive(Debug, Clone)]
pub struct Upload {
    pub pid: String,
    pub archive: PathBuf,
    pub files: Vec<String>,
    pub restricted: bool,
}

#[derive(Debug, Default)]
struct FakeDataset {
    files: Vec<RemoteFile>,
    state: Option<DatasetState>,
}

#[derive(Debug, Default)]
struct FakeState {
    datasets: HashMap<String, FakeDataset>,
    next_dataset: u32,
    next_file: i64,
    calls: Vec<String>,
    listings: usize,
    uploads: Vec<Upload>,
    replaced: Vec<String>,
    metadata_updates: Vec<FileId>,
}

/// In-memory repository: keeps datasets and files, unpacks uploaded archives.
#[derive(Debug, Default)]
pub struct FakeRepository {
    state: Mutex<FakeState>,
    /// Operations that fail when called.
    failing: Vec<&'static str>,
}

impl FakeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(operation: &'static str) -> Self {
        Self {
            failing: vec![operation],
            ..Self::default()
        }
    }

    /// Seeds an existing, released dataset.
    pub fn with_dataset(self, pid: &str, files: &[(Option<&str>, &str)]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let mut dataset = FakeDataset {
                state: Some(DatasetState::Released),
                ..FakeDataset::default()
            };
            for (dir, label) in files {
                state.next_file += 1;
                dataset.files.push(RemoteFile {
                    id: FileId(state.next_file),
                    label: label.to_string(),
                    directory_label: dir.map(str::to_string),
                    restricted: false,
                    size: 1,
                });
            }
            state.datasets.insert(pid.to_string(), dataset);
        }
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn listings(&self) -> usize {
        self.state.lock().unwrap().listings
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn replaced(&self) -> Vec<String> {
        self.state.lock().unwrap().replaced.clone()
    }

    pub fn metadata_updates(&self) -> usize {
        self.state.lock().unwrap().metadata_updates.len()
    }

    /// Logical paths and restricted flags of the files in a dataset, sorted.
    pub fn files_of(&self, pid: &str) -> Vec<(String, bool)> {
        let state = self.state.lock().unwrap();
        let mut files: Vec<_> = state
            .datasets
            .get(pid)
            .map(|d| {
                d.files
                    .iter()
                    .map(|f| (f.logical_path(), f.restricted))
                    .collect()
            })
            .unwrap_or_default();
        files.sort();
        files
    }

    pub fn state_of(&self, pid: &str) -> Option<DatasetState> {
        self.state
            .lock()
            .unwrap()
            .datasets
            .get(pid)
            .and_then(|d| d.state)
    }

    fn record(&self, operation: &'static str) -> Result<(), RemoteError> {
        self.state.lock().unwrap().calls.push(operation.to_string());
        if self.failing.contains(&operation) {
            return Err(format!("{operation} unavailable").into());
        }
        Ok(())
    }
}

fn unpack(archive: &Path) -> Result<Vec<(String, u64)>, RemoteError> {
    let mut zip = zip::ZipArchive::new(File::open(archive)?)?;
    let mut entries = Vec::new();
    for i in 0..zip.len() {
        let entry = zip.by_index(i)?;
        entries.push((entry.name().to_string(), entry.size()));
    }
    Ok(entries)
}

#[async_trait]
impl DatasetRepository for FakeRepository {
    async fn create_dataset(&self, _metadata: &DatasetMetadata) -> Result<String, RemoteError> {
        self.record("create_dataset")?;
        let mut state = self.state.lock().unwrap();
        state.next_dataset += 1;
        let pid = format!("doi:10.5072/FK2/{:04}", state.next_dataset);
        state.datasets.insert(
            pid.clone(),
            FakeDataset {
                state: Some(DatasetState::Draft),
                ..FakeDataset::default()
            },
        );
        Ok(pid)
    }

    async fn update_dataset_metadata(
        &self,
        pid: &str,
        _metadata: &DatasetMetadata,
    ) -> Result<(), RemoteError> {
        self.record("update_dataset_metadata")?;
        let mut state = self.state.lock().unwrap();
        let dataset = state
            .datasets
            .get_mut(pid)
            .ok_or_else(|| format!("no dataset {pid}"))?;
        dataset.state = Some(DatasetState::Draft);
        Ok(())
    }

    async fn list_files(&self, pid: &str) -> Result<Vec<RemoteFile>, RemoteError> {
        self.record("list_files")?;
        let mut state = self.state.lock().unwrap();
        state.listings += 1;
        Ok(state
            .datasets
            .get(pid)
            .map(|d| d.files.clone())
            .unwrap_or_default())
    }

    async fn delete_file(&self, file_id: FileId) -> Result<(), RemoteError> {
        self.record("delete_file")?;
        let mut state = self.state.lock().unwrap();
        for dataset in state.datasets.values_mut() {
            dataset.files.retain(|f| f.id != file_id);
        }
        Ok(())
    }

    async fn replace_file(
        &self,
        _pid: &str,
        file: &RemoteFile,
        local_path: &Path,
    ) -> Result<(), RemoteError> {
        self.record("replace_file")?;
        if !local_path.is_file() {
            return Err(format!("missing local file {}", local_path.display()).into());
        }
        self.state
            .lock()
            .unwrap()
            .replaced
            .push(file.logical_path());
        Ok(())
    }

    async fn add_files(
        &self,
        pid: &str,
        archive: &Path,
        restricted: bool,
    ) -> Result<Vec<RemoteFile>, RemoteError> {
        self.record("add_files")?;
        let entries = unpack(archive)?;
        let mut state = self.state.lock().unwrap();
        let mut added = Vec::new();
        for (name, size) in &entries {
            state.next_file += 1;
            let (dir, label) = match name.rsplit_once('/') {
                Some((dir, label)) => (Some(dir.to_string()), label.to_string()),
                None => (None, name.clone()),
            };
            added.push(RemoteFile {
                id: FileId(state.next_file),
                label,
                directory_label: dir,
                restricted,
                size: *size,
            });
        }
        let dataset = state
            .datasets
            .get_mut(pid)
            .ok_or_else(|| format!("no dataset {pid}"))?;
        dataset.files.extend(added.iter().cloned());
        state.uploads.push(Upload {
            pid: pid.to_string(),
            archive: archive.to_path_buf(),
            files: entries.into_iter().map(|(name, _)| name).collect(),
            restricted,
        });
        Ok(added)
    }

    async fn update_file_metadata(
        &self,
        file_id: FileId,
        _metadata: &FileMetadata,
    ) -> Result<(), RemoteError> {
        self.record("update_file_metadata")?;
        self.state.lock().unwrap().metadata_updates.push(file_id);
        Ok(())
    }

    async fn publish(&self, pid: &str, _bump: VersionBump) -> Result<(), RemoteError> {
        self.record("publish")?;
        let mut state = self.state.lock().unwrap();
        let dataset = state
            .datasets
            .get_mut(pid)
            .ok_or_else(|| format!("no dataset {pid}"))?;
        dataset.state = Some(DatasetState::Released);
        Ok(())
    }

    async fn dataset_state(&self, pid: &str) -> Result<DatasetState, RemoteError> {
        self.record("dataset_state")?;
        self.state_of(pid)
            .ok_or_else(|| format!("no dataset {pid}").into())
    }
}
