//! Resource graph construction.
//!
//! Builds the fixed provisioning graph for one serverless API stack from a
//! validated request. Pure function: no I/O happens here, so a failure
//! guarantees no partial cloud state exists.

use crate::error::Result;
use crate::request::{ProvisioningRequest, RequestValidator};
use tracing::debug;

use super::node::{ResourceGraph, ResourceKind, ResourceNode};
use super::order::validate_graph;

/// Builder for the fixed provisioning graph.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    validator: RequestValidator,
}

/// Logical id of the execution role node.
pub const ROLE: &str = "role";
/// Logical id of the function node.
pub const FUNCTION: &str = "function";
/// Logical id of the REST API node.
pub const API: &str = "api";
/// Logical id of the API root path resource node.
pub const ROOT_RESOURCE: &str = "root-resource";
/// Logical id of the greedy proxy path resource node.
pub const PROXY_RESOURCE: &str = "proxy-resource";
/// Logical id of the ANY method on the root resource.
pub const ROOT_METHOD: &str = "root-method";
/// Logical id of the ANY method on the proxy resource.
pub const PROXY_METHOD: &str = "proxy-method";
/// Logical id of the root method's integration.
pub const ROOT_INTEGRATION: &str = "root-integration";
/// Logical id of the proxy method's integration.
pub const PROXY_INTEGRATION: &str = "proxy-integration";
/// Logical id of the root method's response.
pub const ROOT_METHOD_RESPONSE: &str = "root-method-response";
/// Logical id of the proxy method's response.
pub const PROXY_METHOD_RESPONSE: &str = "proxy-method-response";
/// Logical id of the stage deployment node.
pub const DEPLOYMENT: &str = "deployment";
/// Logical id of the invoke permission node.
pub const PERMISSION: &str = "permission";

impl GraphBuilder {
    /// Creates a new graph builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            validator: RequestValidator::new(),
        }
    }

    /// Builds the provisioning graph for a request.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidRequest`-class error if the request is structurally
    /// invalid. The graph itself is fixed and always a DAG.
    pub fn build(&self, request: &ProvisioningRequest) -> Result<ResourceGraph> {
        self.validator.validate(request)?;

        let mut graph = ResourceGraph::new();

        graph.push(
            ResourceNode::new(ROLE, ResourceKind::Role)
                .param("name", request.role_name())
                .param("assume_service", "lambda"),
        );

        graph.push(
            ResourceNode::new(FUNCTION, ResourceKind::Function)
                .requires(ROLE)
                .param("name", &request.function.name)
                .param("runtime", &request.function.runtime)
                .param("handler", &request.function.handler)
                .param_u64("memory_mb", u64::from(request.function.memory_mb))
                .param("artifact", &request.function.artifact)
                .param("role_id", placeholder(ROLE)),
        );

        graph.push(
            ResourceNode::new(API, ResourceKind::Api)
                .param("name", &request.api.name)
                .param("description", request.api.effective_description()),
        );

        graph.push(
            ResourceNode::new(ROOT_RESOURCE, ResourceKind::PathResource)
                .requires(API)
                .param("api_id", placeholder(API))
                .param("path", "/"),
        );

        graph.push(
            ResourceNode::new(PROXY_RESOURCE, ResourceKind::PathResource)
                .requires(API)
                .requires(ROOT_RESOURCE)
                .param("api_id", placeholder(API))
                .param("parent_id", placeholder(ROOT_RESOURCE))
                .param("path_part", "{proxy+}"),
        );

        graph.push(method_node(ROOT_METHOD, ROOT_RESOURCE));
        graph.push(method_node(PROXY_METHOD, PROXY_RESOURCE));

        graph.push(integration_node(ROOT_INTEGRATION, ROOT_METHOD, ROOT_RESOURCE));
        graph.push(integration_node(PROXY_INTEGRATION, PROXY_METHOD, PROXY_RESOURCE));

        graph.push(method_response_node(ROOT_METHOD_RESPONSE, ROOT_METHOD, ROOT_RESOURCE));
        graph.push(method_response_node(
            PROXY_METHOD_RESPONSE,
            PROXY_METHOD,
            PROXY_RESOURCE,
        ));

        graph.push(
            ResourceNode::new(DEPLOYMENT, ResourceKind::Deployment)
                .requires(ROOT_METHOD)
                .requires(PROXY_METHOD)
                .requires(ROOT_INTEGRATION)
                .requires(PROXY_INTEGRATION)
                .param("api_id", placeholder(API))
                .param("stage", &request.api.stage),
        );

        graph.push(
            ResourceNode::new(PERMISSION, ResourceKind::Permission)
                .requires(DEPLOYMENT)
                .requires(FUNCTION)
                .param("function_id", placeholder(FUNCTION))
                .param("api_id", placeholder(API))
                .param("statement_id", format!("{}-invoke", request.api.name))
                .param("action", "lambda:InvokeFunction")
                .param("principal", "apigateway"),
        );

        validate_graph(&graph)?;
        debug!("Built provisioning graph with {} nodes", graph.len());
        Ok(graph)
    }
}

/// Formats a `${logical-id}` placeholder.
fn placeholder(id: &str) -> String {
    format!("${{{id}}}")
}

fn method_node(id: &str, resource: &str) -> ResourceNode {
    ResourceNode::new(id, ResourceKind::Method)
        .requires(API)
        .requires(resource)
        .param("api_id", placeholder(API))
        .param("resource_id", placeholder(resource))
        .param("http_method", "ANY")
        .param("authorization", "NONE")
}

fn integration_node(id: &str, method: &str, resource: &str) -> ResourceNode {
    ResourceNode::new(id, ResourceKind::Integration)
        .requires(method)
        .requires(FUNCTION)
        .param("api_id", placeholder(API))
        .param("resource_id", placeholder(resource))
        .param("http_method", "ANY")
        .param("integration_type", "AWS_PROXY")
        .param("function_id", placeholder(FUNCTION))
}

fn method_response_node(id: &str, method: &str, resource: &str) -> ResourceNode {
    ResourceNode::new(id, ResourceKind::MethodResponse)
        .requires(method)
        .param("api_id", placeholder(API))
        .param("resource_id", placeholder(resource))
        .param("http_method", "ANY")
        .param("status_code", "200")
}
