//! AWS CLI resource client.
//!
//! Implements [`ResourceClient`] by shelling out to the `aws` command-line
//! tool with `--output json`. Each resource kind maps to one or two CLI
//! calls; stderr from failed calls is classified into the provider error
//! taxonomy so the executor can tell transient throttling apart from
//! permanent rejections.

use crate::error::{ProviderError, Result, StackliftError};
use crate::graph::ResourceKind;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::client::{CreateParams, ExternalId, ResourceClient};

/// Managed policy attached to every execution role.
const BASIC_EXECUTION_POLICY: &str =
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";

/// Separator for composite external ids.
///
/// Sub-resources of a REST API (path resources, methods, integrations,
/// deployments) need their parent identifiers to be deletable later, so
/// their external ids carry that context joined with `|`, a character that
/// never occurs in AWS identifiers.
const ID_SEP: char = '|';

/// AWS CLI wrapper.
pub struct AwsCliClient {
    region: Option<String>,
}

impl AwsCliClient {
    /// Creates a client using the CLI's default region.
    #[must_use]
    pub fn new() -> Self {
        Self { region: None }
    }

    /// Creates a client pinned to a region.
    #[must_use]
    pub fn with_region(region: impl Into<String>) -> Self {
        Self {
            region: Some(region.into()),
        }
    }

    /// Runs an `aws` command and returns stdout.
    async fn run(&self, kind: ResourceKind, subject: &str, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("aws");
        if let Some(ref region) = self.region {
            cmd.arg("--region").arg(region);
        }
        cmd.args(args);
        cmd.arg("--output").arg("json");
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        debug!("Running: aws {}", args.join(" "));

        let output = cmd.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_stderr(kind, subject, &stderr).into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn lookup_role(&self, name: &str) -> Result<Option<ExternalId>> {
        let result = self
            .run(ResourceKind::Role, name, &["iam", "get-role", "--role-name", name])
            .await;
        match result {
            Ok(output) => {
                let arn = json_str(&parse_json(&output)?, "/Role/Arn")?;
                Ok(Some(ExternalId::new(arn)))
            }
            Err(StackliftError::Provider(ProviderError::NotFound { .. })) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn lookup_function(&self, name: &str) -> Result<Option<ExternalId>> {
        let result = self
            .run(
                ResourceKind::Function,
                name,
                &["lambda", "get-function", "--function-name", name],
            )
            .await;
        match result {
            Ok(output) => {
                let arn = json_str(&parse_json(&output)?, "/Configuration/FunctionArn")?;
                Ok(Some(ExternalId::new(arn)))
            }
            Err(StackliftError::Provider(ProviderError::NotFound { .. })) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn lookup_api(&self, name: &str) -> Result<Option<ExternalId>> {
        let output = self
            .run(ResourceKind::Api, name, &["apigateway", "get-rest-apis"])
            .await?;
        let apis = parse_json(&output)?;
        let found = apis
            .pointer("/items")
            .and_then(|items| items.as_array())
            .and_then(|items| {
                items.iter().find(|api| {
                    api.pointer("/name").and_then(serde_json::Value::as_str) == Some(name)
                })
            });
        match found {
            Some(api) => Ok(Some(ExternalId::new(json_str(api, "/id")?))),
            None => Ok(None),
        }
    }

    async fn create_role(&self, params: &CreateParams) -> Result<ExternalId> {
        let name = str_param(params, "name")?;
        let service = str_param(params, "assume_service")?;
        let trust_policy = serde_json::json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": { "Service": format!("{service}.amazonaws.com") },
                "Action": "sts:AssumeRole",
            }],
        })
        .to_string();

        let output = self
            .run(
                ResourceKind::Role,
                name,
                &[
                    "iam",
                    "create-role",
                    "--role-name",
                    name,
                    "--assume-role-policy-document",
                    &trust_policy,
                ],
            )
            .await?;
        let arn = json_str(&parse_json(&output)?, "/Role/Arn")?;

        self.run(
            ResourceKind::Role,
            name,
            &[
                "iam",
                "attach-role-policy",
                "--role-name",
                name,
                "--policy-arn",
                BASIC_EXECUTION_POLICY,
            ],
        )
        .await?;

        Ok(ExternalId::new(arn))
    }

    async fn create_function(&self, params: &CreateParams) -> Result<ExternalId> {
        let name = str_param(params, "name")?;
        let runtime = str_param(params, "runtime")?;
        let handler = str_param(params, "handler")?;
        let role_arn = str_param(params, "role_id")?;
        let artifact = str_param(params, "artifact")?;
        let memory = params
            .get("memory_mb")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(128)
            .to_string();
        let zip_file = format!("fileb://{artifact}");

        let output = self
            .run(
                ResourceKind::Function,
                name,
                &[
                    "lambda",
                    "create-function",
                    "--function-name",
                    name,
                    "--runtime",
                    runtime,
                    "--handler",
                    handler,
                    "--memory-size",
                    &memory,
                    "--role",
                    role_arn,
                    "--zip-file",
                    &zip_file,
                ],
            )
            .await?;
        let arn = json_str(&parse_json(&output)?, "/FunctionArn")?;
        Ok(ExternalId::new(arn))
    }

    async fn create_api(&self, params: &CreateParams) -> Result<ExternalId> {
        let name = str_param(params, "name")?;
        let description = str_param(params, "description").unwrap_or("");

        let output = self
            .run(
                ResourceKind::Api,
                name,
                &[
                    "apigateway",
                    "create-rest-api",
                    "--name",
                    name,
                    "--description",
                    description,
                ],
            )
            .await?;
        let id = json_str(&parse_json(&output)?, "/id")?;
        Ok(ExternalId::new(id))
    }

    async fn create_path_resource(&self, params: &CreateParams) -> Result<ExternalId> {
        let api_id = str_param(params, "api_id")?;

        // The root path resource is implicit in every REST API; creating it
        // means looking up its id rather than calling create-resource.
        if params.get("path").and_then(serde_json::Value::as_str) == Some("/") {
            let output = self
                .run(
                    ResourceKind::PathResource,
                    "/",
                    &["apigateway", "get-resources", "--rest-api-id", api_id],
                )
                .await?;
            let resources = parse_json(&output)?;
            let root = resources
                .pointer("/items")
                .and_then(|items| items.as_array())
                .and_then(|items| {
                    items.iter().find(|item| {
                        item.pointer("/path").and_then(serde_json::Value::as_str) == Some("/")
                    })
                })
                .ok_or_else(|| ProviderError::InvalidResponse {
                    message: format!("REST API {api_id} has no root resource"),
                })?;
            let id = json_str(root, "/id")?;
            return Ok(composite_id(&[api_id, &id]));
        }

        let parent_id = leaf(str_param(params, "parent_id")?);
        let path_part = str_param(params, "path_part")?;
        let output = self
            .run(
                ResourceKind::PathResource,
                path_part,
                &[
                    "apigateway",
                    "create-resource",
                    "--rest-api-id",
                    api_id,
                    "--parent-id",
                    parent_id,
                    "--path-part",
                    path_part,
                ],
            )
            .await?;
        let id = json_str(&parse_json(&output)?, "/id")?;
        Ok(composite_id(&[api_id, &id]))
    }

    async fn create_method(&self, params: &CreateParams) -> Result<ExternalId> {
        let api_id = str_param(params, "api_id")?;
        let resource_id = leaf(str_param(params, "resource_id")?);
        let http_method = str_param(params, "http_method")?;
        let authorization = str_param(params, "authorization")?;

        self.run(
            ResourceKind::Method,
            http_method,
            &[
                "apigateway",
                "put-method",
                "--rest-api-id",
                api_id,
                "--resource-id",
                resource_id,
                "--http-method",
                http_method,
                "--authorization-type",
                authorization,
            ],
        )
        .await?;
        Ok(composite_id(&[api_id, resource_id, http_method]))
    }

    async fn create_integration(&self, params: &CreateParams) -> Result<ExternalId> {
        let api_id = str_param(params, "api_id")?;
        let resource_id = leaf(str_param(params, "resource_id")?);
        let http_method = str_param(params, "http_method")?;
        let integration_type = str_param(params, "integration_type")?;
        let function_arn = str_param(params, "function_id")?;

        let (region, _) = parse_arn(function_arn).ok_or_else(|| ProviderError::InvalidResponse {
            message: format!("malformed function ARN: {function_arn}"),
        })?;
        let uri = format!(
            "arn:aws:apigateway:{region}:lambda:path/2015-03-31/functions/{function_arn}/invocations"
        );

        self.run(
            ResourceKind::Integration,
            http_method,
            &[
                "apigateway",
                "put-integration",
                "--rest-api-id",
                api_id,
                "--resource-id",
                resource_id,
                "--http-method",
                http_method,
                "--type",
                integration_type,
                "--integration-http-method",
                "POST",
                "--uri",
                &uri,
            ],
        )
        .await?;
        Ok(composite_id(&[api_id, resource_id, http_method]))
    }

    async fn create_method_response(&self, params: &CreateParams) -> Result<ExternalId> {
        let api_id = str_param(params, "api_id")?;
        let resource_id = leaf(str_param(params, "resource_id")?);
        let http_method = str_param(params, "http_method")?;
        let status_code = str_param(params, "status_code")?;

        self.run(
            ResourceKind::MethodResponse,
            http_method,
            &[
                "apigateway",
                "put-method-response",
                "--rest-api-id",
                api_id,
                "--resource-id",
                resource_id,
                "--http-method",
                http_method,
                "--status-code",
                status_code,
            ],
        )
        .await?;
        Ok(composite_id(&[api_id, resource_id, http_method, status_code]))
    }

    async fn create_deployment(&self, params: &CreateParams) -> Result<ExternalId> {
        let api_id = str_param(params, "api_id")?;
        let stage = str_param(params, "stage")?;

        let output = self
            .run(
                ResourceKind::Deployment,
                stage,
                &[
                    "apigateway",
                    "create-deployment",
                    "--rest-api-id",
                    api_id,
                    "--stage-name",
                    stage,
                ],
            )
            .await?;
        let id = json_str(&parse_json(&output)?, "/id")?;
        Ok(composite_id(&[api_id, &id, stage]))
    }

    async fn create_permission(&self, params: &CreateParams) -> Result<ExternalId> {
        let function_arn = str_param(params, "function_id")?;
        let api_id = str_param(params, "api_id")?;
        let statement_id = str_param(params, "statement_id")?;
        let action = str_param(params, "action")?;
        let principal = str_param(params, "principal")?;

        let (region, account) =
            parse_arn(function_arn).ok_or_else(|| ProviderError::InvalidResponse {
                message: format!("malformed function ARN: {function_arn}"),
            })?;
        let source_arn = format!("arn:aws:execute-api:{region}:{account}:{api_id}/*");
        let principal_host = format!("{principal}.amazonaws.com");

        self.run(
            ResourceKind::Permission,
            statement_id,
            &[
                "lambda",
                "add-permission",
                "--function-name",
                function_arn,
                "--statement-id",
                statement_id,
                "--action",
                action,
                "--principal",
                &principal_host,
                "--source-arn",
                &source_arn,
            ],
        )
        .await?;
        Ok(composite_id(&[function_arn, statement_id]))
    }

    async fn delete_role(&self, id: &ExternalId) -> Result<()> {
        let name = role_name_from_arn(id.as_str());

        self.run(
            ResourceKind::Role,
            name,
            &[
                "iam",
                "detach-role-policy",
                "--role-name",
                name,
                "--policy-arn",
                BASIC_EXECUTION_POLICY,
            ],
        )
        .await?;
        self.run(
            ResourceKind::Role,
            name,
            &["iam", "delete-role", "--role-name", name],
        )
        .await?;
        Ok(())
    }

    async fn delete_deployment(&self, id: &ExternalId) -> Result<()> {
        let [api_id, deployment_id, stage] = split_id(id)?;

        // The stage references the deployment and must go first.
        self.run(
            ResourceKind::Deployment,
            &stage,
            &[
                "apigateway",
                "delete-stage",
                "--rest-api-id",
                &api_id,
                "--stage-name",
                &stage,
            ],
        )
        .await?;
        self.run(
            ResourceKind::Deployment,
            &deployment_id,
            &[
                "apigateway",
                "delete-deployment",
                "--rest-api-id",
                &api_id,
                "--deployment-id",
                &deployment_id,
            ],
        )
        .await?;
        Ok(())
    }
}

impl Default for AwsCliClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceClient for AwsCliClient {
    async fn exists(&self, kind: ResourceKind, name: &str) -> Result<Option<ExternalId>> {
        match kind {
            ResourceKind::Role => self.lookup_role(name).await,
            ResourceKind::Function => self.lookup_function(name).await,
            ResourceKind::Api => self.lookup_api(name).await,
            _ => Ok(None),
        }
    }

    async fn create(&self, kind: ResourceKind, params: &CreateParams) -> Result<ExternalId> {
        match kind {
            ResourceKind::Role => self.create_role(params).await,
            ResourceKind::Function => self.create_function(params).await,
            ResourceKind::Api => self.create_api(params).await,
            ResourceKind::PathResource => self.create_path_resource(params).await,
            ResourceKind::Method => self.create_method(params).await,
            ResourceKind::Integration => self.create_integration(params).await,
            ResourceKind::MethodResponse => self.create_method_response(params).await,
            ResourceKind::Deployment => self.create_deployment(params).await,
            ResourceKind::Permission => self.create_permission(params).await,
        }
    }

    async fn delete(&self, kind: ResourceKind, id: &ExternalId) -> Result<()> {
        match kind {
            ResourceKind::Role => self.delete_role(id).await,
            ResourceKind::Function => {
                self.run(
                    kind,
                    id.as_str(),
                    &["lambda", "delete-function", "--function-name", id.as_str()],
                )
                .await?;
                Ok(())
            }
            ResourceKind::Api => {
                self.run(
                    kind,
                    id.as_str(),
                    &["apigateway", "delete-rest-api", "--rest-api-id", id.as_str()],
                )
                .await?;
                Ok(())
            }
            ResourceKind::PathResource => {
                let [api_id, resource_id] = split_id(id)?;
                let result = self
                    .run(
                        kind,
                        &resource_id,
                        &[
                            "apigateway",
                            "delete-resource",
                            "--rest-api-id",
                            &api_id,
                            "--resource-id",
                            &resource_id,
                        ],
                    )
                    .await;
                match result {
                    // The implicit root resource cannot be deleted on its
                    // own; it disappears with the REST API.
                    Err(StackliftError::Provider(ProviderError::CommandFailed { message }))
                        if message.contains("BadRequestException") =>
                    {
                        Ok(())
                    }
                    other => other.map(|_| ()),
                }
            }
            ResourceKind::Method => {
                let [api_id, resource_id, http_method] = split_id(id)?;
                self.run(
                    kind,
                    &http_method,
                    &[
                        "apigateway",
                        "delete-method",
                        "--rest-api-id",
                        &api_id,
                        "--resource-id",
                        &resource_id,
                        "--http-method",
                        &http_method,
                    ],
                )
                .await?;
                Ok(())
            }
            ResourceKind::Integration => {
                let [api_id, resource_id, http_method] = split_id(id)?;
                self.run(
                    kind,
                    &http_method,
                    &[
                        "apigateway",
                        "delete-integration",
                        "--rest-api-id",
                        &api_id,
                        "--resource-id",
                        &resource_id,
                        "--http-method",
                        &http_method,
                    ],
                )
                .await?;
                Ok(())
            }
            ResourceKind::MethodResponse => {
                let [api_id, resource_id, http_method, status_code] = split_id(id)?;
                self.run(
                    kind,
                    &http_method,
                    &[
                        "apigateway",
                        "delete-method-response",
                        "--rest-api-id",
                        &api_id,
                        "--resource-id",
                        &resource_id,
                        "--http-method",
                        &http_method,
                        "--status-code",
                        &status_code,
                    ],
                )
                .await?;
                Ok(())
            }
            ResourceKind::Deployment => self.delete_deployment(id).await,
            ResourceKind::Permission => {
                let [function_arn, statement_id] = split_id(id)?;
                self.run(
                    kind,
                    &statement_id,
                    &[
                        "lambda",
                        "remove-permission",
                        "--function-name",
                        &function_arn,
                        "--statement-id",
                        &statement_id,
                    ],
                )
                .await?;
                Ok(())
            }
        }
    }
}

/// Classifies a failed CLI call's stderr into a provider error.
fn classify_stderr(kind: ResourceKind, subject: &str, stderr: &str) -> ProviderError {
    if stderr.contains("Throttling")
        || stderr.contains("TooManyRequestsException")
        || stderr.contains("Rate exceeded")
    {
        return ProviderError::Throttled { retry_after_secs: 2 };
    }
    if stderr.contains("EntityAlreadyExists")
        || stderr.contains("ResourceConflictException")
        || stderr.contains("ConflictException")
        || stderr.contains("already exists")
    {
        return ProviderError::AlreadyExists {
            kind: kind.to_string(),
            name: subject.to_string(),
        };
    }
    if stderr.contains("NoSuchEntity")
        || stderr.contains("ResourceNotFoundException")
        || stderr.contains("NotFoundException")
    {
        return ProviderError::NotFound {
            kind: kind.to_string(),
            id: subject.to_string(),
        };
    }
    // A freshly created role takes a few seconds to propagate; the assume
    // failure clears on retry.
    if stderr.contains("cannot be assumed") {
        return ProviderError::network(stderr.trim());
    }
    if stderr.contains("Could not connect") || stderr.contains("Connection was closed") {
        return ProviderError::network(stderr.trim());
    }
    ProviderError::CommandFailed {
        message: stderr.trim().to_string(),
    }
}

/// Joins id segments into a composite external id.
fn composite_id(segments: &[&str]) -> ExternalId {
    ExternalId::new(segments.join(&ID_SEP.to_string()))
}

/// Splits a composite external id into exactly `N` segments.
fn split_id<const N: usize>(id: &ExternalId) -> Result<[String; N]> {
    let segments: Vec<String> = id.as_str().split(ID_SEP).map(String::from).collect();
    segments.try_into().map_err(|_| {
        StackliftError::internal(format!("malformed external id '{id}': expected {N} segments"))
    })
}

/// Returns the last segment of a composite id, or the whole id if plain.
fn leaf(id: &str) -> &str {
    id.rsplit(ID_SEP).next().unwrap_or(id)
}

/// Extracts `(region, account)` from an ARN.
fn parse_arn(arn: &str) -> Option<(&str, &str)> {
    let mut parts = arn.splitn(6, ':');
    let prefix = parts.next()?;
    if prefix != "arn" {
        return None;
    }
    let _partition = parts.next()?;
    let _service = parts.next()?;
    let region = parts.next()?;
    let account = parts.next()?;
    if region.is_empty() || account.is_empty() {
        return None;
    }
    Some((region, account))
}

/// Extracts the role name from a role ARN.
fn role_name_from_arn(arn: &str) -> &str {
    arn.rsplit('/').next().unwrap_or(arn)
}

fn parse_json(output: &str) -> Result<serde_json::Value> {
    serde_json::from_str(output).map_err(|err| {
        ProviderError::InvalidResponse {
            message: format!("unparseable CLI output: {err}"),
        }
        .into()
    })
}

fn json_str(value: &serde_json::Value, pointer: &str) -> Result<String> {
    value
        .pointer(pointer)
        .and_then(serde_json::Value::as_str)
        .map(String::from)
        .ok_or_else(|| {
            ProviderError::InvalidResponse {
                message: format!("missing field {pointer} in CLI output"),
            }
            .into()
        })
}

fn str_param<'a>(params: &'a CreateParams, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| StackliftError::internal(format!("node parameter '{key}' missing")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arn() {
        let arn = "arn:aws:lambda:us-east-1:123456789012:function:hello";
        assert_eq!(parse_arn(arn), Some(("us-east-1", "123456789012")));

        assert_eq!(parse_arn("not-an-arn"), None);
        // IAM ARNs have no region.
        assert_eq!(parse_arn("arn:aws:iam::123456789012:role/hello"), None);
    }

    #[test]
    fn test_role_name_from_arn() {
        assert_eq!(
            role_name_from_arn("arn:aws:iam::123456789012:role/hello-exec-role"),
            "hello-exec-role"
        );
        assert_eq!(role_name_from_arn("plain-name"), "plain-name");
    }

    #[test]
    fn test_classify_throttling() {
        let err = classify_stderr(
            ResourceKind::Function,
            "fn1",
            "An error occurred (TooManyRequestsException): Rate exceeded",
        );
        assert!(err.is_transient());
    }

    #[test]
    fn test_classify_conflict() {
        let err = classify_stderr(
            ResourceKind::Role,
            "fn1-exec-role",
            "An error occurred (EntityAlreadyExists): Role with name fn1-exec-role already exists.",
        );
        assert!(matches!(err, ProviderError::AlreadyExists { .. }));
    }

    #[test]
    fn test_classify_not_found() {
        let err = classify_stderr(
            ResourceKind::Function,
            "fn1",
            "An error occurred (ResourceNotFoundException): Function not found",
        );
        assert!(matches!(err, ProviderError::NotFound { .. }));
    }

    #[test]
    fn test_classify_role_propagation_is_transient() {
        let err = classify_stderr(
            ResourceKind::Function,
            "fn1",
            "An error occurred (InvalidParameterValueException): The role defined for the function cannot be assumed by Lambda.",
        );
        assert!(err.is_transient());
    }

    #[test]
    fn test_classify_unknown_is_command_failure() {
        let err = classify_stderr(ResourceKind::Api, "api1", "AccessDeniedException: nope");
        assert!(matches!(err, ProviderError::CommandFailed { .. }));
    }

    #[test]
    fn test_composite_id_round_trip() {
        let id = composite_id(&["abc123", "def456", "ANY"]);
        let [api, resource, method] = split_id::<3>(&id).unwrap();
        assert_eq!(api, "abc123");
        assert_eq!(resource, "def456");
        assert_eq!(method, "ANY");

        assert_eq!(leaf(id.as_str()), "ANY");
        assert_eq!(leaf("plain"), "plain");
    }
}
