//! Resource client boundary.
//!
//! The orchestrator core never constructs provider-specific request shapes;
//! it hands each node's resolved parameter map to a [`ResourceClient`] and
//! receives an opaque external identifier back. Substituting a fake client
//! makes the ordering, idempotence, and rollback logic testable without a
//! live provider.

use crate::error::Result;
use crate::graph::ResourceKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Resolved creation parameters for one resource.
///
/// All `${logical-id}` placeholders have been substituted with external
/// identifiers by the time a client sees this map.
pub type CreateParams = serde_json::Map<String, serde_json::Value>;

/// The provider-assigned identifier of a created resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalId(String);

impl ExternalId {
    /// Creates a new external id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ExternalId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for ExternalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One create/lookup/delete operation family per resource kind.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Looks up a resource by name.
    ///
    /// Returns the external id if a resource of this kind with this name
    /// already exists. Kinds where [`ResourceKind::supports_lookup`] is false
    /// are never queried.
    async fn exists(&self, kind: ResourceKind, name: &str) -> Result<Option<ExternalId>>;

    /// Creates a resource and returns its external id.
    async fn create(&self, kind: ResourceKind, params: &CreateParams) -> Result<ExternalId>;

    /// Deletes a resource by external id.
    async fn delete(&self, kind: ResourceKind, id: &ExternalId) -> Result<()>;
}

/// Retry and timeout policy for provider operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts per create call.
    pub max_attempts: u32,

    /// Initial delay between retries.
    pub initial_delay: Duration,

    /// Maximum delay between retries.
    pub max_delay: Duration,

    /// Backoff multiplier applied per attempt.
    pub backoff_multiplier: f64,

    /// Bounded timeout applied to every provider call.
    pub call_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Returns the backoff delay before the given retry.
    ///
    /// `attempt` is 1-based; the delay before retrying after the first
    /// failed attempt is `initial_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1).try_into().unwrap_or(i32::MAX));
        let delay = self.initial_delay.mul_f64(factor.max(1.0));
        delay.min(self.max_delay)
    }
}
