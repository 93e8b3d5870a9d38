//! Idempotence guard.
//!
//! Decides, per node, whether to create a resource or adopt an existing
//! one. Only kinds addressable by name (role, function, api) can be looked
//! up; everything else always creates.

use tracing::debug;

use crate::error::Result;
use crate::graph::ResourceNode;
use crate::provider::{ExternalId, ResourceClient};

/// Outcome of the pre-create check for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// No existing resource; create it.
    Create,
    /// A resource with this name already exists; adopt it.
    SkipWithId(ExternalId),
}

/// Pre-create existence check.
#[derive(Debug, Default)]
pub struct IdempotenceGuard;

impl IdempotenceGuard {
    /// Creates a new guard.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decides whether `node` needs to be created.
    ///
    /// # Errors
    ///
    /// Propagates lookup failures from the client.
    pub async fn should_create(
        &self,
        node: &ResourceNode,
        client: &dyn ResourceClient,
    ) -> Result<GuardDecision> {
        let Some(name) = node.lookup_name() else {
            return Ok(GuardDecision::Create);
        };

        match client.exists(node.kind, name).await? {
            Some(id) => {
                debug!("{} '{}' already exists as {}", node.kind, name, id);
                Ok(GuardDecision::SkipWithId(id))
            }
            None => Ok(GuardDecision::Create),
        }
    }
}
