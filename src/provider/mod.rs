//! Resource client boundary and provider implementations.

pub mod aws_cli;
mod client;
#[cfg(test)]
pub mod fake;

pub use aws_cli::AwsCliClient;
pub use client::{CreateParams, ExternalId, ResourceClient, RetryConfig};

#[cfg(test)]
pub use client::MockResourceClient;
