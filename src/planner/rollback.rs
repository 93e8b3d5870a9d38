//! Rollback coordinator.
//!
//! Unwinds a failed run by deleting everything the run created, in strict
//! reverse creation order. Resources that were adopted rather than created
//! (`SkippedAlreadyExists`) are never touched. The unwind is best-effort:
//! a deletion failure is recorded and the walk continues, so one stubborn
//! resource never strands everything created after it.

use tracing::{info, warn};

use crate::error::{ProviderError, StackliftError};
use crate::provider::ResourceClient;
use crate::state::{RollbackOutcome, RunState};

/// Deletes a failed run's created resources.
pub struct RollbackCoordinator<'a> {
    client: &'a dyn ResourceClient,
}

impl<'a> RollbackCoordinator<'a> {
    /// Creates a coordinator over the given client.
    #[must_use]
    pub const fn new(client: &'a dyn ResourceClient) -> Self {
        Self { client }
    }

    /// Unwinds every `Created` node in reverse creation order.
    ///
    /// Infallible by design: individual failures are captured in the
    /// outcome and in the run state, never returned as errors.
    pub async fn rollback(&self, state: &mut RunState) -> RollbackOutcome {
        let created = state.created_in_order();
        if created.is_empty() {
            info!("Nothing to roll back");
            return RollbackOutcome::NothingToRollBack;
        }

        info!("Rolling back {} created resources", created.len());

        let mut deleted = Vec::new();
        let mut failed = Vec::new();

        for (id, kind, external_id) in created.into_iter().rev() {
            match self.client.delete(kind, &external_id).await {
                Ok(()) => {
                    info!("Rolled back {id} ({external_id})");
                    state.mark_rolled_back(&id);
                    deleted.push(id);
                }
                // Already gone counts as rolled back.
                Err(StackliftError::Provider(ProviderError::NotFound { .. })) => {
                    info!("{id} ({external_id}) already gone");
                    state.mark_rolled_back(&id);
                    deleted.push(id);
                }
                Err(err) => {
                    warn!("Failed to roll back {id}: {err}");
                    state.mark_rollback_failed(&id, err.to_string());
                    failed.push(id);
                }
            }
        }

        if failed.is_empty() {
            RollbackOutcome::FullyRolledBack { deleted }
        } else {
            RollbackOutcome::PartiallyRolledBack { deleted, failed }
        }
    }
}
