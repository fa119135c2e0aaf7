//! One deposit, start to finish: validate, process, record the outcome, relocate.
//!
//! Errors raised while validating or processing decide the outcome of the deposit and
//! stop there; they never reach the job. Errors while recording the outcome or moving
//! the deposit are returned, because the deposit is then left in an unknown place.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::IngestConfig;
use crate::contract::{DatasetRepository, DepositValidator};
use crate::deposit::{Deposit, DepositOutcome, UpdateAction};
use crate::error::{ErrorKind, Result};
use crate::output::OutputArea;
use crate::partition::partition;
use crate::processor::{DepositProcessor, DepositReport};
use crate::properties::DepositProperties;

pub const STATE_LABEL_KEY: &str = "state.label";
pub const STATE_DESCRIPTION_KEY: &str = "state.description";
pub const DOI_KEY: &str = "identifier.doi";

/// Rejects deposits whose instructions cannot be applied to their own payload:
/// unsafe instruction paths, or replace targets missing from the data directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralValidator;

impl DepositValidator for StructuralValidator {
    fn validate(&self, deposit: &Deposit) -> Result<()> {
        for bag in deposit.bags() {
            partition(&bag.data_dir(), bag.edit.as_ref())?;
        }
        Ok(())
    }
}

pub struct DepositTask<'a> {
    deposit: Deposit,
    config: &'a IngestConfig,
    output: &'a OutputArea,
    repository: Arc<dyn DatasetRepository>,
    validator: &'a dyn DepositValidator,
}

impl<'a> DepositTask<'a> {
    pub fn new(
        deposit: Deposit,
        config: &'a IngestConfig,
        output: &'a OutputArea,
        repository: Arc<dyn DatasetRepository>,
        validator: &'a dyn DepositValidator,
    ) -> Self {
        Self {
            deposit,
            config,
            output,
            repository,
            validator,
        }
    }

    /// Runs the deposit and returns its terminal outcome.
    pub async fn run(mut self) -> Result<DepositOutcome> {
        info!(deposit = self.deposit.id(), "[DEPOSIT] START Processing deposit");
        let result = match self.validator.validate(&self.deposit) {
            Ok(()) => {
                let mut processor = DepositProcessor::new(self.repository.clone(), self.config);
                processor.process(&self.deposit).await
            }
            Err(e) => Err(e),
        };

        let outcome = match &result {
            Ok(_) => DepositOutcome::Processed,
            Err(e) if e.kind() == ErrorKind::Rejection => {
                warn!(deposit = self.deposit.id(), error = %e, "[DEPOSIT] Rejected");
                DepositOutcome::Rejected
            }
            Err(e) => {
                error!(deposit = self.deposit.id(), error = ?e, "[DEPOSIT] Failed");
                DepositOutcome::Failed
            }
        };
        self.deposit.outcome = outcome;
        self.record_outcome(&result)?;
        self.output.relocate(&self.deposit, outcome)?;
        info!(deposit = self.deposit.id(), outcome = ?outcome, "[DEPOSIT] END Processing deposit");
        Ok(outcome)
    }

    fn record_outcome(&self, result: &Result<DepositReport>) -> Result<()> {
        let mut properties = DepositProperties::load(self.deposit.location())?;
        let (label, description) = state_of(self.deposit.update_action(), result);
        properties.set(STATE_LABEL_KEY, label);
        properties.set(STATE_DESCRIPTION_KEY, &description);
        if let Ok(report) = result {
            properties.set(DOI_KEY, &report.pid);
        }
        properties.save()
    }
}

fn state_of(action: Option<UpdateAction>, result: &Result<DepositReport>) -> (&'static str, String) {
    match result {
        Ok(_) => match action {
            Some(UpdateAction::PublishMajor | UpdateAction::PublishMinor) => {
                ("PUBLISHED", "The dataset is published".to_string())
            }
            Some(UpdateAction::SubmitForReview) => {
                ("ACCEPTED", "The dataset is submitted for review".to_string())
            }
            None => ("ACCEPTED", "The dataset is stored as a draft".to_string()),
        },
        Err(e) if e.kind() == ErrorKind::Rejection => ("REJECTED", e.to_string()),
        Err(e) => ("FAILED", e.to_string()),
    }
}
