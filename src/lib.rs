// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![forbid(unsafe_code)]               // Unsafe code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden
#![warn(missing_docs)]                // All public items should be documented
#![warn(unused_must_use)]             // Handle Result and Option explicitly

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Stacklift
//!
//! Declarative, idempotent provisioning for serverless HTTP API stacks.
//!
//! ## Overview
//!
//! Stacklift turns one small request (a function and an API) into the full
//! set of cloud resources a serverless HTTP API needs, safely:
//!
//! - Build a fixed dependency graph over the resources and derive a
//!   deterministic provisioning plan
//! - Skip resources that already exist instead of duplicating them
//! - Roll back everything a failed run created, in reverse creation order
//! - Persist run state so a failed run can always be reconciled later
//!
//! ## Architecture
//!
//! A run flows through four stages:
//!
//! 1. **Request**: parsed and validated before anything is touched
//! 2. **Graph**: the fixed 13-node resource DAG with `${logical-id}` params
//! 3. **Plan + executor**: topological order, idempotence guard, retries,
//!    bounded timeouts, rollback on hard failure
//! 4. **State**: a persisted record of exactly which resources exist
//!
//! ## Modules
//!
//! - [`request`]: Request parsing, validation, and hashing
//! - [`graph`]: Resource graph construction and ordering
//! - [`provider`]: The resource client boundary and the AWS CLI client
//! - [`planner`]: Plan computation, execution, and rollback
//! - [`state`]: Run-state persistence and locking
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! function:
//!   name: hello
//!   runtime: python3.12
//!   handler: handler.lambda_handler
//!   artifact: build/hello.zip
//!
//! api:
//!   name: hello-api
//!   stage: prod
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod error;
pub mod graph;
pub mod planner;
pub mod provider;
pub mod request;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use error::{Result, StackliftError};
pub use graph::{GraphBuilder, LogicalId, ResourceGraph, ResourceKind};
pub use planner::{CancelToken, PlanExecutor, ProvisioningPlan, RollbackCoordinator};
pub use provider::{AwsCliClient, ExternalId, ResourceClient, RetryConfig};
pub use request::{ProvisioningRequest, RequestHasher, RequestParser, RequestValidator};
pub use state::{ProvisioningResult, RollbackOutcome, RunOutcome, RunState, RunStateStore};
