//! Provisioning request types.
//!
//! This module defines the structs that map to the `stacklift.deploy.yaml`
//! request file. A request fully describes the desired serverless API stack
//! and is never mutated once parsed and validated.

use serde::{Deserialize, Serialize};

/// The root provisioning request for one serverless API stack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvisioningRequest {
    /// Compute function to deploy.
    pub function: FunctionSpec,
    /// REST API fronting the function.
    pub api: ApiSpec,
}

/// Specification of the compute function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionSpec {
    /// Unique function name.
    pub name: String,
    /// Runtime identifier (e.g. "python3.12", "nodejs20.x").
    pub runtime: String,
    /// Handler entry point within the artifact.
    #[serde(default = "default_handler")]
    pub handler: String,
    /// Memory size in megabytes.
    #[serde(default = "default_memory_mb")]
    pub memory_mb: u32,
    /// Path to the deployment artifact (zip archive). Treated as an opaque
    /// reference; building it is out of scope.
    pub artifact: String,
    /// Execution role name. Defaults to `<function-name>-exec-role`.
    #[serde(default)]
    pub role: Option<String>,
}

/// Specification of the REST API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiSpec {
    /// Unique API name.
    pub name: String,
    /// Stage name for the deployment.
    #[serde(default = "default_stage")]
    pub stage: String,
    /// Optional API description.
    #[serde(default)]
    pub description: Option<String>,
}

fn default_handler() -> String {
    String::from("handler.lambda_handler")
}

const fn default_memory_mb() -> u32 {
    128
}

fn default_stage() -> String {
    String::from("prod")
}

impl ProvisioningRequest {
    /// Returns the effective execution role name.
    #[must_use]
    pub fn role_name(&self) -> String {
        self.function
            .role
            .clone()
            .unwrap_or_else(|| format!("{}-exec-role", self.function.name))
    }
}

impl ApiSpec {
    /// Returns the effective API description.
    #[must_use]
    pub fn effective_description(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("Proxy API for function {}", self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let yaml = r"
function:
  name: image-resizer
  runtime: python3.12
  artifact: build/function.zip
api:
  name: image-api
";
        let request: ProvisioningRequest = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(request.function.handler, "handler.lambda_handler");
        assert_eq!(request.function.memory_mb, 128);
        assert_eq!(request.api.stage, "prod");
        assert_eq!(request.role_name(), "image-resizer-exec-role");
    }

    #[test]
    fn test_explicit_role_wins() {
        let yaml = r"
function:
  name: image-resizer
  runtime: python3.12
  artifact: build/function.zip
  role: shared-exec-role
api:
  name: image-api
  stage: staging
";
        let request: ProvisioningRequest = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(request.role_name(), "shared-exec-role");
        assert_eq!(request.api.stage, "staging");
    }
}
