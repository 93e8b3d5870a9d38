//! Resource graph node types.
//!
//! A provisioning run is described as a small DAG of resource nodes. Each
//! node carries a stable logical id (graph-assigned), the kind of cloud
//! resource it creates, the logical ids it depends on, and the parameters
//! needed to create it. Parameters may reference the outputs of dependencies
//! with `${logical-id}` placeholders, resolved at execution time.

use serde::{Deserialize, Serialize};

/// A stable, graph-assigned name for a resource node.
///
/// Distinct from the provider-assigned external identifier, which only
/// exists once the resource has been created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalId(String);

impl LogicalId {
    /// Creates a new logical id.
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

impl From<&str> for LogicalId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for LogicalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of cloud resource a node provisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Execution role the function assumes.
    Role,
    /// Compute function.
    Function,
    /// REST API container.
    Api,
    /// Path resource within an API.
    PathResource,
    /// HTTP method on a path resource.
    Method,
    /// Proxy integration wiring a method to the function.
    Integration,
    /// Method response definition.
    MethodResponse,
    /// Stage deployment of the API.
    Deployment,
    /// Invoke permission granted to the API.
    Permission,
}

impl ResourceKind {
    /// Returns true if the provider supports looking this kind up by name.
    ///
    /// Kinds without lookup are idempotent-by-construction only: creating
    /// them twice for the same logical id duplicates them, so a reported
    /// conflict is fatal rather than skippable.
    #[must_use]
    pub const fn supports_lookup(self) -> bool {
        matches!(self, Self::Role | Self::Function | Self::Api)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Role => "role",
            Self::Function => "function",
            Self::Api => "api",
            Self::PathResource => "path-resource",
            Self::Method => "method",
            Self::Integration => "integration",
            Self::MethodResponse => "method-response",
            Self::Deployment => "deployment",
            Self::Permission => "permission",
        };
        write!(f, "{s}")
    }
}

/// One cloud resource to create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Stable logical id, unique within the graph.
    pub id: LogicalId,
    /// Kind of resource.
    pub kind: ResourceKind,
    /// Logical ids this node depends on. A node may only run once every
    /// dependency has been created or found pre-existing.
    pub depends_on: Vec<LogicalId>,
    /// Creation parameters. String values may contain `${logical-id}`
    /// placeholders referencing resolved external ids.
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl ResourceNode {
    /// Creates a new node.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            id: LogicalId::new(id),
            kind,
            depends_on: Vec::new(),
            params: serde_json::Map::new(),
        }
    }

    /// Adds a dependency edge.
    #[must_use]
    pub fn requires(mut self, id: impl Into<String>) -> Self {
        self.depends_on.push(LogicalId::new(id));
        self
    }

    /// Adds a string parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params
            .insert(key.into(), serde_json::Value::String(value.into()));
        self
    }

    /// Adds a numeric parameter.
    #[must_use]
    pub fn param_u64(mut self, key: impl Into<String>, value: u64) -> Self {
        self.params
            .insert(key.into(), serde_json::Value::Number(value.into()));
        self
    }

    /// Returns a string parameter value, if present.
    #[must_use]
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(serde_json::Value::as_str)
    }

    /// Returns the name the idempotence guard should look this node up by.
    ///
    /// Only meaningful for kinds that support lookup, which all carry a
    /// `name` parameter.
    #[must_use]
    pub fn lookup_name(&self) -> Option<&str> {
        self.kind.supports_lookup().then(|| self.param_str("name")).flatten()
    }
}

/// Declaration-ordered collection of resource nodes forming a DAG.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceGraph {
    nodes: Vec<ResourceNode>,
}

impl ResourceGraph {
    /// Creates an empty graph.
    #[must_use]
    pub const fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Appends a node. Declaration order is preserved and used for
    /// deterministic tie-breaking in the topological order.
    pub fn push(&mut self, node: ResourceNode) {
        self.nodes.push(node);
    }

    /// Returns the nodes in declaration order.
    #[must_use]
    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    /// Looks up a node by logical id.
    #[must_use]
    pub fn get(&self, id: &LogicalId) -> Option<&ResourceNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_name_only_for_lookup_kinds() {
        let role = ResourceNode::new("role", ResourceKind::Role).param("name", "fn1-exec-role");
        assert_eq!(role.lookup_name(), Some("fn1-exec-role"));

        let method = ResourceNode::new("root-method", ResourceKind::Method)
            .param("name", "should-not-matter");
        assert_eq!(method.lookup_name(), None);
    }

    #[test]
    fn test_graph_get() {
        let mut graph = ResourceGraph::new();
        graph.push(ResourceNode::new("api", ResourceKind::Api).param("name", "api1"));

        assert_eq!(graph.len(), 1);
        assert!(graph.get(&LogicalId::from("api")).is_some());
        assert!(graph.get(&LogicalId::from("missing")).is_none());
    }
}
