//! Bounded polling of a dataset until it reaches a wanted state.

use tracing::{debug, error, info};

use crate::config::PollPolicy;
use crate::contract::{DatasetRepository, DatasetState};
use crate::error::{IngestError, Result};

/// Polls the dataset until it reaches `target`, backing off between attempts.
///
/// Gives up with a remote error after `policy.max_attempts` polls.
pub async fn wait_for_state(
    repository: &dyn DatasetRepository,
    pid: &str,
    target: DatasetState,
    policy: &PollPolicy,
) -> Result<()> {
    let attempts = policy.max_attempts.max(1);
    let mut last = None;
    for attempt in 0..attempts {
        let state = repository
            .dataset_state(pid)
            .await
            .map_err(IngestError::remote("dataset_state"))?;
        if state == target {
            info!(pid, state = ?state, attempt, "Dataset reached expected state");
            return Ok(());
        }
        debug!(pid, state = ?state, target = ?target, attempt, "Dataset not in expected state yet");
        last = Some(state);
        if attempt + 1 < attempts {
            tokio::time::sleep(policy.delay_after(attempt)).await;
        }
    }
    error!(pid, target = ?target, last = ?last, attempts, "Dataset did not reach expected state");
    Err(IngestError::Remote {
        operation: "wait_for_state",
        source: format!(
            "dataset {pid} still {last:?} after {attempts} polls, expected {target:?}"
        )
        .into(),
    })
}
