//! Dry-run view of what ingesting a deposit would do, without contacting the repository.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use dv_ingest_core::config::IngestConfig;
use dv_ingest_core::contract::DepositValidator;
use dv_ingest_core::deposit::{Deposit, UpdateAction};
use dv_ingest_core::partition::partition;
use dv_ingest_core::task::StructuralValidator;
use dv_ingest_core::zipper::{plan, BatchPlan};
use tracing::info;

#[derive(Debug)]
pub struct DepositPlan {
    pub deposit: String,
    pub bags: Vec<BagPlan>,
    /// Reason the deposit would be rejected, if any.
    pub rejection: Option<String>,
}

#[derive(Debug)]
pub struct BagPlan {
    pub bag: String,
    pub target: Target,
    pub delete: usize,
    pub replace: usize,
    pub restricted_batches: Vec<BatchPlan>,
    pub unrestricted_batches: Vec<BatchPlan>,
    pub metadata_updates: usize,
    pub action: Option<UpdateAction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    NewDataset,
    Existing(String),
    /// The dataset resolved by the previous bag.
    PreviousBag,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::NewDataset => write!(f, "new dataset"),
            Target::Existing(pid) => write!(f, "{pid}"),
            Target::PreviousBag => write!(f, "dataset of previous bag"),
        }
    }
}

/// Loads the deposit at `deposit_dir` and computes its plan.
pub fn plan_deposit(config: &IngestConfig, deposit_dir: &Path) -> Result<DepositPlan> {
    let deposit = Deposit::load(deposit_dir)
        .with_context(|| format!("Failed to load deposit {}", deposit_dir.display()))?;

    if let Err(e) = StructuralValidator.validate(&deposit) {
        info!(deposit = deposit.id(), error = %e, "Deposit would be rejected");
        return Ok(DepositPlan {
            deposit: deposit.id().to_string(),
            bags: Vec::new(),
            rejection: Some(e.to_string()),
        });
    }

    let mut bags = Vec::with_capacity(deposit.bags().len());
    for (index, bag) in deposit.bags().iter().enumerate() {
        let data_dir = bag.data_dir();
        let sets = partition(&data_dir, bag.edit.as_ref())?;
        let target = match (index, deposit.updates_dataset()) {
            (0, Some(pid)) => Target::Existing(pid.to_string()),
            (0, None) => Target::NewDataset,
            _ => Target::PreviousBag,
        };
        bags.push(BagPlan {
            bag: bag.name().to_string(),
            target,
            delete: sets.delete.len(),
            replace: sets.replace.len(),
            restricted_batches: plan(&data_dir, &sets.add_restricted, config.upload)?,
            unrestricted_batches: plan(&data_dir, &sets.add_unrestricted, config.upload)?,
            metadata_updates: bag.files.as_ref().map_or(0, Vec::len),
            action: bag.update_state,
        });
    }
    Ok(DepositPlan {
        deposit: deposit.id().to_string(),
        bags,
        rejection: None,
    })
}

impl fmt::Display for DepositPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Deposit {}", self.deposit)?;
        if let Some(reason) = &self.rejection {
            return writeln!(f, "  REJECTED: {reason}");
        }
        for bag in &self.bags {
            writeln!(f, "  Bag {} -> {}", bag.bag, bag.target)?;
            writeln!(f, "    delete: {}, replace: {}", bag.delete, bag.replace)?;
            write_batches(f, "restricted", &bag.restricted_batches)?;
            write_batches(f, "unrestricted", &bag.unrestricted_batches)?;
            writeln!(f, "    file metadata updates: {}", bag.metadata_updates)?;
            match bag.action {
                Some(action) => writeln!(f, "    action: {action}")?,
                None => writeln!(f, "    action: none")?,
            }
        }
        Ok(())
    }
}

fn write_batches(f: &mut fmt::Formatter<'_>, kind: &str, batches: &[BatchPlan]) -> fmt::Result {
    let files: usize = batches.iter().map(|b| b.files.len()).sum();
    let bytes: u64 = batches.iter().map(|b| b.bytes).sum();
    writeln!(
        f,
        "    add {kind}: {files} files, {bytes} bytes in {} batches",
        batches.len()
    )
}
