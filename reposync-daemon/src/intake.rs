//! "Repository created" events from outside the polling loop.

use std::sync::Arc;

use reposync_core::RepositoryRef;
use reposync_forge::{ForgeError, MirrorDestination};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::shared_ledger::SharedLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeOutcome {
    AlreadyMirrored,
    Created,
}

/// Mirrors single repositories on demand. Does not consult the source rate
/// limiter.
#[derive(Clone)]
pub struct EventIntake {
    destination: Arc<dyn MirrorDestination>,
    ledger: SharedLedger,
    cancel: CancellationToken,
}

impl EventIntake {
    pub fn new(
        destination: Arc<dyn MirrorDestination>,
        ledger: SharedLedger,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            destination,
            ledger,
            cancel,
        }
    }

    /// Create a mirror for `repo` unless the ledger already has it.
    ///
    /// The ledger section is held across the create call, so a concurrent
    /// reconciliation pass for the same name waits and then skips it.
    /// Destination failures are returned to the caller.
    pub async fn repository_created(
        &self,
        repo: &RepositoryRef,
    ) -> Result<IntakeOutcome, ForgeError> {
        let mut ledger = self.ledger.lock().await;
        let name = repo.name.as_str();
        if ledger.contains(name) {
            tracing::info!(repo = %name, "repository already mirrored");
            return Ok(IntakeOutcome::AlreadyMirrored);
        }

        self.destination.create_mirror(&self.cancel, repo).await?;
        ledger.mark_mirrored(name);
        tracing::info!(repo = %name, "mirrored repository from event");
        Ok(IntakeOutcome::Created)
    }

    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }
}
