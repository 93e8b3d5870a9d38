//! Run state types.
//!
//! A [`RunState`] records what one provisioning run did to the world: which
//! nodes were created, which were skipped because they already existed, and
//! in what order creations happened. It is the source of truth for rollback
//! and for idempotent re-runs, and is persisted as JSON.

use crate::graph::{LogicalId, ResourceKind};
use crate::provider::ExternalId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Current run-state schema version.
pub const STATE_VERSION: &str = "1";

/// Lifecycle status of one graph node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Not yet attempted.
    Pending,
    /// Created by this run.
    Created,
    /// Already existed; adopted without creating.
    SkippedAlreadyExists,
    /// Creation failed.
    Failed,
    /// Created by this run, then deleted during rollback.
    RolledBack,
    /// Created by this run, but rollback could not delete it.
    RollbackFailed,
}

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run is still executing.
    InProgress,
    /// Every node is created or skipped.
    Succeeded,
    /// A node failed; see the node records for rollback results.
    Failed,
}

/// Per-node record within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Resource kind of the node.
    pub kind: ResourceKind,
    /// Current status.
    pub status: NodeStatus,
    /// External id, present once created or adopted.
    pub external_id: Option<ExternalId>,
    /// Error message, present on failure.
    pub error: Option<String>,
}

/// Persistent record of one provisioning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Schema version.
    pub version: String,
    /// Unique run identifier.
    pub run_id: String,
    /// Hash of the request this run provisioned.
    pub request_hash: String,
    /// Overall run status.
    pub status: RunStatus,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished, if it has.
    pub finished_at: Option<DateTime<Utc>>,
    /// Per-node records, keyed by logical id.
    pub nodes: BTreeMap<LogicalId, NodeRecord>,
    /// Logical ids of created nodes, in creation order.
    pub creation_order: Vec<LogicalId>,
}

impl RunState {
    /// Starts a fresh run for a request.
    #[must_use]
    pub fn new(request_hash: impl Into<String>) -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            run_id: Uuid::new_v4().to_string(),
            request_hash: request_hash.into(),
            status: RunStatus::InProgress,
            started_at: Utc::now(),
            finished_at: None,
            nodes: BTreeMap::new(),
            creation_order: Vec::new(),
        }
    }

    /// Records a node created by this run.
    pub fn mark_created(&mut self, id: &LogicalId, kind: ResourceKind, external_id: ExternalId) {
        self.nodes.insert(
            id.clone(),
            NodeRecord {
                kind,
                status: NodeStatus::Created,
                external_id: Some(external_id),
                error: None,
            },
        );
        self.creation_order.push(id.clone());
    }

    /// Records a node that already existed and was adopted.
    pub fn mark_skipped(&mut self, id: &LogicalId, kind: ResourceKind, external_id: ExternalId) {
        self.nodes.insert(
            id.clone(),
            NodeRecord {
                kind,
                status: NodeStatus::SkippedAlreadyExists,
                external_id: Some(external_id),
                error: None,
            },
        );
    }

    /// Records a node whose creation failed.
    pub fn mark_failed(&mut self, id: &LogicalId, kind: ResourceKind, error: impl Into<String>) {
        self.nodes.insert(
            id.clone(),
            NodeRecord {
                kind,
                status: NodeStatus::Failed,
                external_id: None,
                error: Some(error.into()),
            },
        );
        self.status = RunStatus::Failed;
    }

    /// Records a created node as deleted during rollback.
    pub fn mark_rolled_back(&mut self, id: &LogicalId) {
        if let Some(record) = self.nodes.get_mut(id) {
            record.status = NodeStatus::RolledBack;
        }
    }

    /// Records a created node that rollback could not delete.
    pub fn mark_rollback_failed(&mut self, id: &LogicalId, error: impl Into<String>) {
        if let Some(record) = self.nodes.get_mut(id) {
            record.status = NodeStatus::RollbackFailed;
            record.error = Some(error.into());
        }
    }

    /// Marks the run as finished with the given status.
    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    /// Returns the external id a node resolved to, if any.
    #[must_use]
    pub fn external_id(&self, id: &LogicalId) -> Option<&ExternalId> {
        self.nodes.get(id).and_then(|record| record.external_id.as_ref())
    }

    /// Returns `(id, kind, external_id)` for created nodes, in creation order.
    #[must_use]
    pub fn created_in_order(&self) -> Vec<(LogicalId, ResourceKind, ExternalId)> {
        self.creation_order
            .iter()
            .filter_map(|id| {
                let record = self.nodes.get(id)?;
                if record.status != NodeStatus::Created {
                    return None;
                }
                let external_id = record.external_id.clone()?;
                Some((id.clone(), record.kind, external_id))
            })
            .collect()
    }

    /// Returns the resolved external ids of every created or adopted node.
    #[must_use]
    pub fn resolved_ids(&self) -> BTreeMap<LogicalId, ExternalId> {
        self.nodes
            .iter()
            .filter(|(_, record)| {
                matches!(
                    record.status,
                    NodeStatus::Created | NodeStatus::SkippedAlreadyExists
                )
            })
            .filter_map(|(id, record)| {
                record
                    .external_id
                    .clone()
                    .map(|external| (id.clone(), external))
            })
            .collect()
    }

    /// Returns true if the run completed with every node created or adopted.
    #[must_use]
    pub fn is_successful(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

/// What rollback achieved after a failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum RollbackOutcome {
    /// The run had created nothing yet.
    NothingToRollBack,
    /// Every resource the run created was deleted.
    FullyRolledBack {
        /// Deleted nodes, in deletion order.
        deleted: Vec<LogicalId>,
    },
    /// Some created resources could not be deleted.
    PartiallyRolledBack {
        /// Nodes that were deleted.
        deleted: Vec<LogicalId>,
        /// Nodes left behind; manual reconciliation is required.
        failed: Vec<LogicalId>,
    },
}

impl RollbackOutcome {
    /// Returns true if no created resource was left behind.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        matches!(self, Self::NothingToRollBack | Self::FullyRolledBack { .. })
    }
}

/// Terminal outcome of a provisioning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum RunOutcome {
    /// Every node was created or adopted.
    Provisioned {
        /// Resolved external ids, keyed by logical id.
        resolved: BTreeMap<LogicalId, ExternalId>,
    },
    /// A node failed and the run was rolled back.
    Failed {
        /// The node that failed.
        failed_node: LogicalId,
        /// The error that stopped the run.
        error: String,
        /// What rollback achieved.
        rollback: RollbackOutcome,
    },
}

/// Per-node line in the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceReport {
    /// Logical id of the node.
    pub logical_id: LogicalId,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Final status.
    pub status: NodeStatus,
    /// External id, if resolved.
    pub external_id: Option<ExternalId>,
}

/// Full result of a provisioning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningResult {
    /// The run that produced this result.
    pub run_id: String,
    /// Terminal outcome.
    #[serde(flatten)]
    pub outcome: RunOutcome,
    /// Per-node report, in plan order.
    pub report: Vec<ResourceReport>,
}

impl ProvisioningResult {
    /// Returns true if provisioning succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Provisioned { .. })
    }
}
