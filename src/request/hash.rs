//! Request hashing for change and duplicate detection.
//!
//! A deterministic hash of the request stamps each run's state and lets a
//! later invocation recognize that a prior successful run already provisioned
//! the same stack (which would duplicate resources that cannot be looked up
//! by name).

use sha2::{Digest, Sha256};

use super::spec::ProvisioningRequest;

/// Hasher for computing request hashes.
#[derive(Debug, Default)]
pub struct RequestHasher;

impl RequestHasher {
    /// Creates a new request hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a deterministic hash of the entire request.
    ///
    /// The hash changes when any field that affects the provisioned stack
    /// changes, including applied defaults (role name, stage).
    #[must_use]
    pub fn hash_request(&self, request: &ProvisioningRequest) -> String {
        let mut hasher = Sha256::new();

        // Function identity and shape
        hasher.update(request.function.name.as_bytes());
        hasher.update(request.function.runtime.as_bytes());
        hasher.update(request.function.handler.as_bytes());
        hasher.update(request.function.memory_mb.to_be_bytes());
        hasher.update(request.function.artifact.as_bytes());
        hasher.update(request.role_name().as_bytes());

        // API identity
        hasher.update(request.api.name.as_bytes());
        hasher.update(request.api.stage.as_bytes());
        if let Some(description) = &request.api.description {
            hasher.update(description.as_bytes());
        }

        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::spec::{ApiSpec, FunctionSpec};

    fn sample_request() -> ProvisioningRequest {
        ProvisioningRequest {
            function: FunctionSpec {
                name: String::from("fn1"),
                runtime: String::from("python3.12"),
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
    fn test_hash_is_deterministic() {
        let hasher = RequestHasher::new();
        let request = sample_request();
        assert_eq!(hasher.hash_request(&request), hasher.hash_request(&request));
    }

    #[test]
    fn test_hash_changes_with_request() {
        let hasher = RequestHasher::new();
        let request = sample_request();
        let base = hasher.hash_request(&request);

        let mut changed = request.clone();
        changed.function.memory_mb = 256;
        assert_ne!(base, hasher.hash_request(&changed));

        let mut changed = request;
        changed.api.stage = String::from("staging");
        assert_ne!(base, hasher.hash_request(&changed));
    }

    #[test]
    fn test_default_role_affects_hash() {
        let hasher = RequestHasher::new();
        let request = sample_request();
        let base = hasher.hash_request(&request);

        let mut named = request;
        named.function.role = Some(String::from("shared-role"));
        assert_ne!(base, hasher.hash_request(&named));
    }
}
