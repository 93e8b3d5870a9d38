//! Request validation for provisioning requests.
//!
//! This module validates a request before any graph is built or any provider
//! call is made, ensuring a validation failure leaves no partial state.

use crate::error::{RequestError, Result, StackliftError};
use std::collections::HashSet;
use tracing::debug;

use super::spec::ProvisioningRequest;

/// Validator for provisioning requests.
#[derive(Debug, Default)]
pub struct RequestValidator {
    /// Known valid runtime identifiers.
    known_runtimes: HashSet<String>,
}

/// Runtime identifiers the validator recognizes. Unknown runtimes produce a
/// warning rather than an error; the provider has the final say.
const KNOWN_RUNTIMES: &[&str] = &[
    "python3.10",
    "python3.11",
    "python3.12",
    "python3.13",
    "nodejs18.x",
    "nodejs20.x",
    "nodejs22.x",
    "java17",
    "java21",
    "dotnet8",
    "ruby3.3",
    "provided.al2023",
    "py-generic",
];

/// Minimum function memory in megabytes.
const MIN_MEMORY_MB: u32 = 128;

/// Maximum function memory in megabytes.
const MAX_MEMORY_MB: u32 = 10_240;

/// Validation result containing all errors and warnings found.
#[derive(Debug, Default, serde::Serialize)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug, serde::Serialize)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl ValidationResult {
    /// Returns true if no errors were found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.to_string(),
            message: message.into(),
        });
    }
}

impl RequestValidator {
    /// Creates a new validator with the default known runtimes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            known_runtimes: KNOWN_RUNTIMES.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Adds a custom runtime to the known list.
    pub fn add_runtime(&mut self, runtime: impl Into<String>) {
        self.known_runtimes.insert(runtime.into());
    }

    /// Runs every check and returns the full result, errors and all.
    #[must_use]
    pub fn check(&self, request: &ProvisioningRequest) -> ValidationResult {
        let mut result = ValidationResult::default();
        self.validate_function(request, &mut result);
        Self::validate_api(request, &mut result);
        result
    }

    /// Validates a provisioning request.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidRequest`-class error if validation fails.
    pub fn validate(&self, request: &ProvisioningRequest) -> Result<ValidationResult> {
        let result = self.check(request);

        if result.errors.is_empty() {
            debug!("Request validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(StackliftError::Request(RequestError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Validates the function section.
    fn validate_function(&self, request: &ProvisioningRequest, result: &mut ValidationResult) {
        let function = &request.function;

        if function.name.is_empty() {
            result.error("function.name", "Function name cannot be empty");
        } else if !is_valid_name(&function.name) {
            result.error(
                "function.name",
                format!(
                    "Function name '{}' is invalid. Must be alphanumeric with hyphens, starting with a letter.",
                    function.name
                ),
            );
        }

        if function.runtime.is_empty() {
            result.error("function.runtime", "Runtime cannot be empty");
        } else if !self.known_runtimes.contains(&function.runtime) {
            result.warnings.push(format!(
                "Runtime '{}' is not in the known runtime list; the provider may reject it",
                function.runtime
            ));
        }

        if function.handler.is_empty() {
            result.error("function.handler", "Handler cannot be empty");
        }

        if function.artifact.is_empty() {
            result.error("function.artifact", "Artifact path cannot be empty");
        } else if !std::path::Path::new(&function.artifact).exists() {
            result.warnings.push(format!(
                "Artifact '{}' does not exist yet; it must be present at provision time",
                function.artifact
            ));
        }

        if !(MIN_MEMORY_MB..=MAX_MEMORY_MB).contains(&function.memory_mb) {
            result.error(
                "function.memory_mb",
                format!(
                    "Memory size {} MB is out of range ({MIN_MEMORY_MB}..={MAX_MEMORY_MB})",
                    function.memory_mb
                ),
            );
        }

        let role = request.role_name();
        if !is_valid_name(&role) {
            result.error(
                "function.role",
                format!(
                    "Role name '{role}' is invalid. Must be alphanumeric with hyphens, starting with a letter."
                ),
            );
        }
    }

    /// Validates the api section.
    fn validate_api(request: &ProvisioningRequest, result: &mut ValidationResult) {
        let api = &request.api;

        if api.name.is_empty() {
            result.error("api.name", "API name cannot be empty");
        } else if !is_valid_name(&api.name) {
            result.error(
                "api.name",
                format!(
                    "API name '{}' is invalid. Must be alphanumeric with hyphens, starting with a letter.",
                    api.name
                ),
            );
        }

        if api.stage.is_empty() {
            result.error("api.stage", "Stage name cannot be empty");
        } else if !is_valid_name(&api.stage) {
            result.error(
                "api.stage",
                format!(
                    "Stage name '{}' is invalid. Must be alphanumeric with hyphens, starting with a letter.",
                    api.stage
                ),
            );
        }
    }
}

/// Checks that a name is ASCII alphanumeric with single hyphens, starting
/// with a letter and not ending with a hyphen. Case is preserved; the
/// provider accepts mixed-case resource names.
fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 64 {
        return false;
    }

    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_alphabetic() {
        return false;
    }

    let mut prev_hyphen = false;
    for c in name.chars() {
        match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' => prev_hyphen = false,
            '-' => {
                if prev_hyphen {
                    return false;
                }
                prev_hyphen = true;
            }
            _ => return false,
        }
    }

    !name.ends_with('-')
}
