//! Graph validation and topological ordering.
//!
//! The executor walks nodes in one valid topological order, with ties broken
//! by declaration order so runs are deterministic and testable.

use crate::error::{GraphError, Result, StackliftError};
use std::collections::{HashMap, HashSet};

use super::node::{LogicalId, ResourceGraph};

/// Validates the structural invariants of a graph.
///
/// Checks for duplicate logical ids, dependencies on unknown nodes, and
/// cycles (via the topological sort).
///
/// # Errors
///
/// Returns a [`GraphError`] describing the first violation found.
pub fn validate_graph(graph: &ResourceGraph) -> Result<()> {
    let mut seen: HashSet<&LogicalId> = HashSet::new();
    for node in graph.nodes() {
        if !seen.insert(&node.id) {
            return Err(StackliftError::Graph(GraphError::DuplicateLogicalId {
                logical_id: node.id.to_string(),
            }));
        }
    }

    for node in graph.nodes() {
        for dep in &node.depends_on {
            if !seen.contains(dep) {
                return Err(StackliftError::Graph(GraphError::UnknownDependency {
                    logical_id: node.id.to_string(),
                    dependency: dep.to_string(),
                }));
            }
        }
    }

    topological_order(graph).map(|_| ())
}

/// Computes one valid topological order of the graph.
///
/// Returns indices into `graph.nodes()`. Among nodes whose dependencies are
/// all satisfied, the earliest-declared node is emitted first.
///
/// # Errors
///
/// Returns [`GraphError::CycleDetected`] if the graph contains a cycle.
pub fn topological_order(graph: &ResourceGraph) -> Result<Vec<usize>> {
    let nodes = graph.nodes();
    let index_of: HashMap<&LogicalId, usize> = nodes
        .iter()
        .enumerate()
        .map(|(idx, node)| (&node.id, idx))
        .collect();

    let mut emitted: HashSet<usize> = HashSet::new();
    let mut order = Vec::with_capacity(nodes.len());

    // Repeatedly emit the earliest-declared node whose dependencies are all
    // satisfied. Quadratic in node count, which is tiny and fixed here.
    while order.len() < nodes.len() {
        let next = (0..nodes.len()).find(|idx| {
            !emitted.contains(idx)
                && nodes[*idx].depends_on.iter().all(|dep| {
                    index_of
                        .get(dep)
                        .is_some_and(|dep_idx| emitted.contains(dep_idx))
                })
        });

        let Some(idx) = next else {
            let members = (0..nodes.len())
                .filter(|idx| !emitted.contains(idx))
                .map(|idx| nodes[idx].id.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(StackliftError::Graph(GraphError::CycleDetected { members }));
        };

        emitted.insert(idx);
        order.push(idx);
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::{ResourceKind, ResourceNode};

    fn node(id: &str, deps: &[&str]) -> ResourceNode {
        let mut n = ResourceNode::new(id, ResourceKind::PathResource);
        for dep in deps {
            n = n.requires(*dep);
        }
        n
    }

    #[test]
    fn test_order_respects_dependencies() {
        let mut graph = ResourceGraph::new();
        graph.push(node("c", &["b"]));
        graph.push(node("a", &[]));
        graph.push(node("b", &["a"]));

        let order = topological_order(&graph).unwrap();
        let ids: Vec<&str> = order
            .iter()
            .map(|&idx| graph.nodes()[idx].id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_ties_break_by_declaration_order() {
        let mut graph = ResourceGraph::new();
        graph.push(node("root", &[]));
        graph.push(node("left", &["root"]));
        graph.push(node("right", &["root"]));

        let order = topological_order(&graph).unwrap();
        let ids: Vec<&str> = order
            .iter()
            .map(|&idx| graph.nodes()[idx].id.as_str())
            .collect();
        assert_eq!(ids, vec!["root", "left", "right"]);
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph = ResourceGraph::new();
        graph.push(node("a", &["b"]));
        graph.push(node("b", &["a"]));

        let result = topological_order(&graph);
        assert!(matches!(
            result,
            Err(StackliftError::Graph(GraphError::CycleDetected { .. }))
        ));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut graph = ResourceGraph::new();
        graph.push(node("a", &[]));
        graph.push(node("a", &[]));

        let result = validate_graph(&graph);
        assert!(matches!(
            result,
            Err(StackliftError::Graph(GraphError::DuplicateLogicalId { .. }))
        ));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let mut graph = ResourceGraph::new();
        graph.push(node("a", &["ghost"]));

        let result = validate_graph(&graph);
        assert!(matches!(
            result,
            Err(StackliftError::Graph(GraphError::UnknownDependency { .. }))
        ));
    }
}
