//! Request parser for loading provisioning requests.
//!
//! This module handles loading requests from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{RequestError, Result, StackliftError};
use std::path::Path;
use tracing::{debug, info};

use super::spec::ProvisioningRequest;

/// Parser for loading provisioning requests.
#[derive(Debug, Default)]
pub struct RequestParser {
    /// Base path for resolving relative paths.
    base_path: Option<std::path::PathBuf>,
}

impl RequestParser {
    /// Creates a new request parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads a request from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<ProvisioningRequest> {
        let path = path.as_ref();
        info!("Loading request from: {}", path.display());

        if !path.exists() {
            return Err(StackliftError::Request(RequestError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            StackliftError::Request(RequestError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        Self::parse_yaml(&content, Some(path))
    }

    /// Parses a request from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(content: &str, source: Option<&Path>) -> Result<ProvisioningRequest> {
        debug!("Parsing YAML request");

        let request: ProvisioningRequest = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            StackliftError::Request(RequestError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Successfully parsed request for function: {}",
            request.function.name
        );
        Ok(request)
    }

    /// Loads a request with environment variable overrides.
    ///
    /// Environment variables are checked in the format
    /// `STACKLIFT_<SECTION>_<KEY>` (e.g. `STACKLIFT_API_STAGE`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<ProvisioningRequest> {
        let mut request = self.load_file(path)?;
        Self::apply_env_overrides(&mut request);
        Ok(request)
    }

    /// Applies environment variable overrides to the request.
    fn apply_env_overrides(request: &mut ProvisioningRequest) {
        if let Ok(name) = std::env::var("STACKLIFT_FUNCTION_NAME") {
            debug!("Overriding function.name from environment");
            request.function.name = name;
        }

        if let Ok(runtime) = std::env::var("STACKLIFT_FUNCTION_RUNTIME") {
            debug!("Overriding function.runtime from environment");
            request.function.runtime = runtime;
        }

        if let Ok(artifact) = std::env::var("STACKLIFT_FUNCTION_ARTIFACT") {
            debug!("Overriding function.artifact from environment");
            request.function.artifact = artifact;
        }

        if let Ok(name) = std::env::var("STACKLIFT_API_NAME") {
            debug!("Overriding api.name from environment");
            request.api.name = name;
        }

        if let Ok(stage) = std::env::var("STACKLIFT_API_STAGE") {
            debug!("Overriding api.stage from environment");
            request.api.stage = stage;
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| std::path::PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                StackliftError::Request(RequestError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Default request file names to search for.
pub const DEFAULT_REQUEST_FILES: &[&str] = &[
    "stacklift.deploy.yaml",
    "stacklift.deploy.yml",
    "deploy.yaml",
    "deploy.yml",
];

/// Finds the request file in the given directory or its ancestors.
///
/// # Errors
///
/// Returns an error if no request file is found.
pub fn find_request_file(start_dir: impl AsRef<Path>) -> Result<std::path::PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_REQUEST_FILES {
            let request_path = current.join(filename);
            if request_path.exists() {
                info!("Found request file: {}", request_path.display());
                return Ok(request_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(StackliftError::Request(RequestError::FileNotFound {
        path: start.join(DEFAULT_REQUEST_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_request() {
        let yaml = r"
function:
  name: fn1
  runtime: python3.12
  artifact: h.zip
api:
  name: api1
";
        let result = RequestParser::parse_yaml(yaml, None);
        assert!(result.is_ok());

        let request = result.unwrap();
        assert_eq!(request.function.name, "fn1");
        assert_eq!(request.api.name, "api1");
        assert_eq!(request.api.stage, "prod");
    }

    #[test]
    fn test_parse_full_request() {
        let yaml = r#"
function:
  name: image-resizer
  runtime: python3.12
  handler: app.handle
  memory_mb: 512
  artifact: build/function.zip
  role: image-resizer-role

api:
  name: image-api
  stage: staging
  description: "Image resize frontend"
"#;
        let result = RequestParser::parse_yaml(yaml, None);
        assert!(result.is_ok());

        let request = result.unwrap();
        assert_eq!(request.function.memory_mb, 512);
        assert_eq!(request.function.handler, "app.handle");
        assert_eq!(request.api.stage, "staging");
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let result = RequestParser::parse_yaml("function: [unclosed", None);
        assert!(matches!(
            result,
            Err(StackliftError::Request(RequestError::ParseError { .. }))
        ));
    }

    #[test]
    fn test_missing_file() {
        let parser = RequestParser::new();
        let result = parser.load_file("/nonexistent/stacklift.deploy.yaml");
        assert!(matches!(
            result,
            Err(StackliftError::Request(RequestError::FileNotFound { .. }))
        ));
    }
}
