//! Resource dependency graph for provisioning runs.
//!
//! This module defines the graph data model, the builder that produces the
//! fixed node set for a serverless API stack, and the deterministic
//! topological ordering the executor walks.

pub mod builder;
mod node;
mod order;

pub use builder::GraphBuilder;
pub use node::{LogicalId, ResourceGraph, ResourceKind, ResourceNode};
pub use order::{topological_order, validate_graph};
