//! Error types for the stacklift provisioning system.
//!
//! This module provides a comprehensive error hierarchy for all operations
//! in the provisioning lifecycle: request handling, graph construction,
//! provider calls, state management, and rollback.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the stacklift provisioning system.
#[derive(Debug, Error)]
pub enum StackliftError {
    /// Request-related errors (invalid input, unparseable request file).
    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    /// Resource graph construction errors.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Provider (resource client) errors.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Run-state persistence errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// A re-run would duplicate a resource that cannot be looked up by name.
    #[error("Duplicate resource '{logical_id}': {message}")]
    DuplicateResource {
        /// Logical id of the node that would be duplicated.
        logical_id: String,
        /// Description of the conflict.
        message: String,
    },

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised before any resource is touched.
///
/// A failure in this class guarantees that no partial cloud state exists.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The request file was not found.
    #[error("Request file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The request file could not be parsed.
    #[error("Failed to parse request: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Request validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },
}

/// Errors in resource graph construction or ordering.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Two nodes share the same logical id.
    #[error("Duplicate logical id in graph: {logical_id}")]
    DuplicateLogicalId {
        /// The duplicated logical id.
        logical_id: String,
    },

    /// A node depends on a logical id that is not in the graph.
    #[error("Node '{logical_id}' depends on unknown node '{dependency}'")]
    UnknownDependency {
        /// The dependent node.
        logical_id: String,
        /// The missing dependency.
        dependency: String,
    },

    /// The dependency graph contains a cycle.
    #[error("Dependency cycle detected involving: {members}")]
    CycleDetected {
        /// Nodes participating in the cycle.
        members: String,
    },

    /// A parameter placeholder references a node that has not been resolved.
    #[error("Node '{logical_id}' references unresolved output '{reference}'")]
    UnresolvedReference {
        /// The node whose parameters could not be resolved.
        logical_id: String,
        /// The placeholder that failed to resolve.
        reference: String,
    },
}

/// Errors reported by the resource client boundary.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The resource already exists under this name.
    #[error("{kind} '{name}' already exists")]
    AlreadyExists {
        /// Resource kind.
        kind: String,
        /// Name or identifier that collided.
        name: String,
    },

    /// The resource was not found.
    #[error("{kind} '{id}' not found")]
    NotFound {
        /// Resource kind.
        kind: String,
        /// The identifier that was not found.
        id: String,
    },

    /// The provider throttled the request.
    #[error("Provider throttled the request, retry after {retry_after_secs}s")]
    Throttled {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// A network-level failure talking to the provider.
    #[error("Network error communicating with provider: {message}")]
    Network {
        /// Description of the network error.
        message: String,
    },

    /// A provider call exceeded its bounded timeout.
    #[error("Timed out after {timeout_secs}s waiting for {operation}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout bound that was exceeded.
        timeout_secs: u64,
    },

    /// The provider rejected the request.
    #[error("Provider API error: {message}")]
    Api {
        /// Error message from the provider.
        message: String,
    },

    /// The provider command-line tool failed.
    #[error("Provider command failed: {message}")]
    CommandFailed {
        /// Captured stderr or exit description.
        message: String,
    },

    /// The provider returned output the client could not interpret.
    #[error("Invalid response from provider: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },

    /// The run was cancelled by the user.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Run-state persistence errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// No persisted run state exists.
    #[error("No persisted run state found at {path}")]
    NotFound {
        /// Path to the missing state file.
        path: PathBuf,
    },

    /// Persisted state is corrupted.
    #[error("Run state is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Lock acquisition failed.
    #[error("Failed to acquire run lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// Another process holds the run lock.
    #[error("Project is locked by another run (holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Serialization error.
    #[error("Run state serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("Run state version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Result type alias for stacklift operations.
pub type Result<T> = std::result::Result<T, StackliftError>;

impl StackliftError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provider(ProviderError::Throttled { .. } | ProviderError::Network { .. })
        )
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Provider(ProviderError::Throttled { retry_after_secs }) => {
                Some(*retry_after_secs)
            }
            Self::Provider(ProviderError::Network { .. }) => Some(5),
            _ => None,
        }
    }
}

impl RequestError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl ProviderError {
    /// Creates a provider API error.
    #[must_use]
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Returns true if a call failing with this error is worth retrying.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Throttled { .. } | Self::Network { .. })
    }
}

impl StateError {
    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}
