//! Provisioning plan construction.
//!
//! A plan is one valid topological order over the resource graph, computed
//! up front so dry runs and real runs walk the same sequence. Ties are
//! broken by declaration order, so the plan is deterministic for a given
//! request.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::graph::{ResourceGraph, ResourceNode, topological_order};

/// An ordered, executable provisioning plan.
#[derive(Debug, Clone)]
pub struct ProvisioningPlan {
    /// When the plan was computed.
    pub created_at: DateTime<Utc>,
    /// Hash of the request this plan provisions.
    pub request_hash: String,
    /// Nodes in execution order.
    pub steps: Vec<ResourceNode>,
}

impl ProvisioningPlan {
    /// Computes a plan from a validated graph.
    ///
    /// # Errors
    ///
    /// Returns a `GraphError` if the graph has no topological order.
    pub fn new(graph: &ResourceGraph, request_hash: impl Into<String>) -> Result<Self> {
        let order = topological_order(graph)?;
        let steps = order
            .into_iter()
            .map(|idx| graph.nodes()[idx].clone())
            .collect();

        Ok(Self {
            created_at: Utc::now(),
            request_hash: request_hash.into(),
            steps,
        })
    }

    /// Number of steps in the plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the plan has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl std::fmt::Display for ProvisioningPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Provisioning plan ({} steps):", self.len())?;
        for (index, step) in self.steps.iter().enumerate() {
            if step.depends_on.is_empty() {
                writeln!(f, "  {}. {} [{}]", index + 1, step.id, step.kind)?;
            } else {
                let deps: Vec<&str> = step.depends_on.iter().map(|d| d.as_str()).collect();
                writeln!(
                    f,
                    "  {}. {} [{}] after {}",
                    index + 1,
                    step.id,
                    step.kind,
                    deps.join(", ")
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphBuilder, LogicalId, builder};
    use crate::request::{ApiSpec, FunctionSpec, ProvisioningRequest};

    fn sample_request() -> ProvisioningRequest {
        ProvisioningRequest {
            function: FunctionSpec {
                name: String::from("fn1"),
                runtime: String::from("py-generic"),
                handler: String::from("handler.lambda_handler"),
                memory_mb: 128,
                artifact: String::from("h.zip"),
                role: None,
            },
            api: ApiSpec {
                name: String::from("api1"),
                stage: String::from("prod"),
                description: None,
            },
        }
    }

    #[test]
    fn test_plan_covers_every_node_in_dependency_order() {
        let graph = GraphBuilder::new().build(&sample_request()).unwrap();
        let plan = ProvisioningPlan::new(&graph, "hash-1").unwrap();
        assert_eq!(plan.len(), graph.len());

        let position: std::collections::HashMap<&LogicalId, usize> = plan
            .steps
            .iter()
            .enumerate()
            .map(|(pos, step)| (&step.id, pos))
            .collect();
        for step in &plan.steps {
            for dep in &step.depends_on {
                assert!(position[dep] < position[&step.id]);
            }
        }
    }

    #[test]
    fn test_plan_is_deterministic() {
        let graph = GraphBuilder::new().build(&sample_request()).unwrap();
        let first = ProvisioningPlan::new(&graph, "hash-1").unwrap();
        let second = ProvisioningPlan::new(&graph, "hash-1").unwrap();

        let first_ids: Vec<&LogicalId> = first.steps.iter().map(|s| &s.id).collect();
        let second_ids: Vec<&LogicalId> = second.steps.iter().map(|s| &s.id).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn test_permission_is_last() {
        let graph = GraphBuilder::new().build(&sample_request()).unwrap();
        let plan = ProvisioningPlan::new(&graph, "hash-1").unwrap();
        assert_eq!(plan.steps.last().unwrap().id, LogicalId::from(builder::PERMISSION));
    }
}
