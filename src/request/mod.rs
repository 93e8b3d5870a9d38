//! Request handling for the stacklift provisioning system.
//!
//! This module handles everything about the provisioning request:
//! - Parsing and deserializing `stacklift.deploy.yaml`
//! - Validation of request values before any resource is touched
//! - Computing request hashes for duplicate-run detection

mod hash;
mod parser;
mod spec;
mod validator;

pub use hash::RequestHasher;
pub use parser::{DEFAULT_REQUEST_FILES, RequestParser, find_request_file};
pub use spec::{ApiSpec, FunctionSpec, ProvisioningRequest};
pub use validator::{RequestValidator, ValidationError, ValidationResult};
