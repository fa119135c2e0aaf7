//! Output area of a job: the `processed/`, `failed/` and `rejected/` directories
//! deposits are moved to once their outcome is known.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::deposit::{Deposit, DepositOutcome};
use crate::error::{IngestError, Result};

const OUTCOMES: [DepositOutcome; 3] = [
    DepositOutcome::Processed,
    DepositOutcome::Failed,
    DepositOutcome::Rejected,
];

#[derive(Debug, Clone)]
pub struct OutputArea {
    root: PathBuf,
}

impl OutputArea {
    /// Creates the outcome directories under `root`.
    ///
    /// In batch mode every outcome directory must be empty, so results of an earlier run
    /// are never mixed with this one.
    pub fn prepare(root: &Path, single_object: bool) -> Result<Self> {
        for outcome in OUTCOMES {
            let Some(name) = outcome.dir_name() else {
                continue;
            };
            let dir = root.join(name);
            fs::create_dir_all(&dir).map_err(|e| IngestError::io("create output dir", &dir, e))?;
            if !single_object && !is_empty(&dir)? {
                return Err(IngestError::Configuration(format!(
                    "Output directory {} already exists and is not empty",
                    dir.display()
                )));
            }
        }
        debug!(root = %root.display(), single_object, "Output area ready");
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory deposits with `outcome` are moved to.
    pub fn dir(&self, outcome: DepositOutcome) -> Option<PathBuf> {
        outcome.dir_name().map(|name| self.root.join(name))
    }

    /// Moves the deposit directory into the directory matching `outcome`.
    pub fn relocate(&self, deposit: &Deposit, outcome: DepositOutcome) -> Result<PathBuf> {
        let dir = self.dir(outcome).ok_or_else(|| {
            IngestError::Configuration(format!(
                "Deposit {} has no terminal outcome to relocate to",
                deposit.id()
            ))
        })?;
        let target = dir.join(deposit.id());
        if target.exists() {
            return Err(IngestError::io(
                "relocate deposit",
                &target,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "target already exists"),
            ));
        }
        fs::rename(deposit.location(), &target)
            .map_err(|e| IngestError::io("relocate deposit", deposit.location(), e))?;
        info!(
            deposit = deposit.id(),
            outcome = ?outcome,
            target = %target.display(),
            "[DEPOSIT] Relocated"
        );
        Ok(target)
    }
}

fn is_empty(dir: &Path) -> Result<bool> {
    let mut entries = fs::read_dir(dir).map_err(|e| IngestError::io("list output dir", dir, e))?;
    Ok(entries.next().is_none())
}
