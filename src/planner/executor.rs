//! Plan executor.
//!
//! Walks a provisioning plan in order, resolving parameter placeholders
//! from the run state, consulting the idempotence guard, and creating each
//! resource through the client with retry, timeout, and cancellation
//! handling. A hard failure stops the walk, hands the run state to the
//! rollback coordinator, and surfaces as a `Failed` outcome rather than an
//! error: the caller always learns exactly which resources exist afterwards.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::{GraphError, ProviderError, Result, StackliftError};
use crate::graph::{LogicalId, ResourceNode};
use crate::provider::{CreateParams, ExternalId, ResourceClient, RetryConfig};
use crate::state::{
    NodeStatus, ProvisioningResult, ResourceReport, RunOutcome, RunState, RunStatus,
};

use super::cancel::CancelToken;
use super::guard::{GuardDecision, IdempotenceGuard};
use super::plan::ProvisioningPlan;
use super::rollback::RollbackCoordinator;

/// Executes provisioning plans sequentially.
pub struct PlanExecutor<'a> {
    client: &'a dyn ResourceClient,
    guard: IdempotenceGuard,
    retry: RetryConfig,
}

impl<'a> PlanExecutor<'a> {
    /// Creates an executor over the given client with default retry policy.
    #[must_use]
    pub fn new(client: &'a dyn ResourceClient) -> Self {
        Self {
            client,
            guard: IdempotenceGuard::new(),
            retry: RetryConfig::default(),
        }
    }

    /// Overrides the retry policy.
    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Executes the plan against the run state.
    ///
    /// Node failures never surface as `Err`: a hard failure rolls back the
    /// run and is reported through the returned outcome.
    ///
    /// # Errors
    ///
    /// Currently infallible beyond the failure channel; the signature leaves
    /// room for state-persistence errors between nodes.
    pub async fn execute(
        &self,
        plan: &ProvisioningPlan,
        state: &mut RunState,
        cancel: &CancelToken,
    ) -> Result<ProvisioningResult> {
        info!("Executing provisioning plan with {} steps", plan.len());

        for step in &plan.steps {
            if cancel.is_cancelled() {
                return Ok(self
                    .fail_run(plan, state, step, ProviderError::Cancelled.into())
                    .await);
            }

            if let Err(err) = check_dependencies(step, state) {
                return Ok(self.fail_run(plan, state, step, err).await);
            }

            let params = match resolve_params(step, state) {
                Ok(params) => params,
                Err(err) => return Ok(self.fail_run(plan, state, step, err).await),
            };

            match self.guard.should_create(step, self.client).await {
                Ok(GuardDecision::SkipWithId(id)) => {
                    info!("Skipping {} ({}): already exists as {id}", step.id, step.kind);
                    state.mark_skipped(&step.id, step.kind, id);
                    continue;
                }
                Ok(GuardDecision::Create) => {}
                Err(err) => return Ok(self.fail_run(plan, state, step, err).await),
            }

            match self.create_with_retry(step, &params, cancel).await {
                Ok(id) => {
                    info!("Created {} ({}) as {id}", step.id, step.kind);
                    state.mark_created(&step.id, step.kind, id);
                }
                Err(StackliftError::Provider(ProviderError::AlreadyExists { .. }))
                    if step.kind.supports_lookup() =>
                {
                    // Lost a race with someone creating the same named
                    // resource; adopt theirs.
                    match self.adopt_existing(step).await {
                        Ok(Some(id)) => {
                            info!("Adopted {} ({}) as {id} after create conflict", step.id, step.kind);
                            state.mark_skipped(&step.id, step.kind, id);
                        }
                        Ok(None) => {
                            let err = StackliftError::DuplicateResource {
                                logical_id: step.id.to_string(),
                                message: String::from(
                                    "provider reported a conflict but the resource is not visible by name",
                                ),
                            };
                            return Ok(self.fail_run(plan, state, step, err).await);
                        }
                        Err(err) => return Ok(self.fail_run(plan, state, step, err).await),
                    }
                }
                Err(StackliftError::Provider(ProviderError::AlreadyExists { kind, name })) => {
                    // No lookup means no safe way to adopt; this run would
                    // silently share a resource with an earlier one.
                    let err = StackliftError::DuplicateResource {
                        logical_id: step.id.to_string(),
                        message: format!("{kind} '{name}' already exists"),
                    };
                    return Ok(self.fail_run(plan, state, step, err).await);
                }
                Err(err) => return Ok(self.fail_run(plan, state, step, err).await),
            }
        }

        state.finish(RunStatus::Succeeded);
        info!("Provisioning complete: {} resources", plan.len());

        Ok(ProvisioningResult {
            run_id: state.run_id.clone(),
            outcome: RunOutcome::Provisioned {
                resolved: state.resolved_ids(),
            },
            report: build_report(plan, state),
        })
    }

    /// Creates one resource, retrying transient failures with backoff.
    async fn create_with_retry(
        &self,
        step: &ResourceNode,
        params: &CreateParams,
        cancel: &CancelToken,
    ) -> Result<ExternalId> {
        let mut attempt = 1;
        loop {
            let outcome = tokio::select! {
                () = cancel.cancelled() => Err(ProviderError::Cancelled.into()),
                result = tokio::time::timeout(
                    self.retry.call_timeout,
                    self.client.create(step.kind, params),
                ) => {
                    result.unwrap_or_else(|_| {
                        Err(ProviderError::Timeout {
                            operation: format!("create {}", step.id),
                            timeout_secs: self.retry.call_timeout.as_secs(),
                        }
                        .into())
                    })
                }
            };

            match outcome {
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = retry_delay(&self.retry, attempt, &err);
                    warn!(
                        "Transient failure creating {} (attempt {attempt}/{}): {err}; retrying in {delay:?}",
                        step.id, self.retry.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Re-queries a named resource after a create conflict.
    async fn adopt_existing(&self, step: &ResourceNode) -> Result<Option<ExternalId>> {
        let Some(name) = step.lookup_name() else {
            return Ok(None);
        };
        self.client.exists(step.kind, name).await
    }

    /// Marks the failure, rolls back, and assembles the failed result.
    async fn fail_run(
        &self,
        plan: &ProvisioningPlan,
        state: &mut RunState,
        step: &ResourceNode,
        err: StackliftError,
    ) -> ProvisioningResult {
        error!("Provisioning failed at {}: {err}", step.id);
        state.mark_failed(&step.id, step.kind, err.to_string());

        let rollback = RollbackCoordinator::new(self.client).rollback(state).await;
        state.finish(RunStatus::Failed);

        ProvisioningResult {
            run_id: state.run_id.clone(),
            outcome: RunOutcome::Failed {
                failed_node: step.id.clone(),
                error: err.to_string(),
                rollback,
            },
            report: build_report(plan, state),
        }
    }
}

/// Verifies every declared dependency resolved before the node runs.
/// Backoff delay before the next attempt. Throttle responses carry a
/// provider-suggested wait; treat it as a floor on the computed backoff.
fn retry_delay(retry: &RetryConfig, attempt: u32, err: &StackliftError) -> Duration {
    let base = retry.delay_for_attempt(attempt);
    match err.retry_delay_secs() {
        Some(floor) => base.max(Duration::from_secs(floor)),
        None => base,
    }
}

fn check_dependencies(step: &ResourceNode, state: &RunState) -> Result<()> {
    for dep in &step.depends_on {
        let satisfied = state.nodes.get(dep).is_some_and(|record| {
            matches!(
                record.status,
                NodeStatus::Created | NodeStatus::SkippedAlreadyExists
            )
        });
        if !satisfied {
            return Err(StackliftError::internal(format!(
                "dependency '{dep}' of '{}' is not satisfied",
                step.id
            )));
        }
    }
    Ok(())
}

/// Resolves `${logical-id}` placeholders in a node's parameters.
fn resolve_params(step: &ResourceNode, state: &RunState) -> Result<CreateParams> {
    let mut resolved = CreateParams::new();
    for (key, value) in &step.params {
        let value = match value.as_str() {
            Some(raw) if raw.contains("${") => {
                serde_json::Value::String(substitute(raw, &step.id, state)?)
            }
            _ => value.clone(),
        };
        resolved.insert(key.clone(), value);
    }
    Ok(resolved)
}

/// Substitutes every `${logical-id}` in `raw` with its external id.
fn substitute(raw: &str, node_id: &LogicalId, state: &RunState) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(GraphError::UnresolvedReference {
                logical_id: node_id.to_string(),
                reference: rest[start..].to_string(),
            }
            .into());
        };

        let reference = &after[..end];
        match state.external_id(&LogicalId::from(reference)) {
            Some(id) => out.push_str(id.as_str()),
            None => {
                return Err(GraphError::UnresolvedReference {
                    logical_id: node_id.to_string(),
                    reference: reference.to_string(),
                }
                .into());
            }
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Builds the per-node report in plan order.
fn build_report(plan: &ProvisioningPlan, state: &RunState) -> Vec<ResourceReport> {
    plan.steps
        .iter()
        .map(|step| {
            let record = state.nodes.get(&step.id);
            ResourceReport {
                logical_id: step.id.clone(),
                kind: step.kind,
                status: record.map_or(NodeStatus::Pending, |r| r.status),
                external_id: record.and_then(|r| r.external_id.clone()),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphBuilder, ResourceKind, builder};
    use crate::provider::MockResourceClient;
    use crate::provider::fake::FakeClient;
    use crate::request::{ApiSpec, FunctionSpec, ProvisioningRequest};
    use crate::state::RollbackOutcome;
    use mockall::Sequence;
    use mockall::predicate::eq;
    use std::time::Duration;

    fn sample_request() -> ProvisioningRequest {
        ProvisioningRequest {
            function: FunctionSpec {
                name: String::from("fn1"),
                runtime: String::from("py-generic"),
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

    fn sample_plan() -> ProvisioningPlan {
        let graph = GraphBuilder::new().build(&sample_request()).unwrap();
        ProvisioningPlan::new(&graph, "hash-1").unwrap()
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..RetryConfig::default()
        }
    }

    fn seed_foundations(client: &FakeClient) {
        client.seed_existing(ResourceKind::Role, "fn1-exec-role", "arn:aws:iam::1:role/fn1-exec-role");
        client.seed_existing(
            ResourceKind::Function,
            "fn1",
            "arn:aws:lambda:us-east-1:1:function:fn1",
        );
        client.seed_existing(ResourceKind::Api, "api1", "api-ext-1");
    }

    #[tokio::test]
    async fn test_fresh_run_creates_all_thirteen_nodes() {
        let client = FakeClient::new();
        let mut state = RunState::new("hash-1");
        let result = PlanExecutor::new(&client)
            .execute(&sample_plan(), &mut state, &CancelToken::new())
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(client.create_count(), 13);
        assert!(
            result
                .report
                .iter()
                .all(|line| line.status == NodeStatus::Created)
        );
        assert!(client.deleted_ids().is_empty());
        assert!(state.is_successful());
    }

    #[tokio::test]
    async fn test_rerun_skips_preexisting_foundations() {
        let client = FakeClient::new();
        seed_foundations(&client);

        let mut state = RunState::new("hash-1");
        let result = PlanExecutor::new(&client)
            .execute(&sample_plan(), &mut state, &CancelToken::new())
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(client.create_count(), 10);

        for id in [builder::ROLE, builder::FUNCTION, builder::API] {
            assert_eq!(
                state.nodes[&LogicalId::from(id)].status,
                NodeStatus::SkippedAlreadyExists
            );
        }
        assert_eq!(
            state.nodes[&LogicalId::from(builder::PERMISSION)].status,
            NodeStatus::Created
        );
    }

    #[tokio::test]
    async fn test_deployment_failure_rolls_back_created_only() {
        let client = FakeClient::new();
        seed_foundations(&client);
        client.fail_next_create(
            ResourceKind::Deployment,
            ProviderError::api("stage limit exceeded"),
        );

        let mut state = RunState::new("hash-1");
        let result = PlanExecutor::new(&client)
            .execute(&sample_plan(), &mut state, &CancelToken::new())
            .await
            .unwrap();

        let RunOutcome::Failed {
            failed_node,
            rollback,
            ..
        } = &result.outcome
        else {
            panic!("expected failed outcome");
        };
        assert_eq!(*failed_node, LogicalId::from(builder::DEPLOYMENT));

        // Everything this run created is gone, in exact reverse creation
        // order; the pre-existing foundations are untouched.
        let expected_reverse: Vec<ExternalId> = state
            .creation_order
            .iter()
            .rev()
            .filter_map(|id| state.nodes[id].external_id.clone())
            .collect();
        assert_eq!(expected_reverse.len(), 8);
        assert_eq!(client.deleted_ids(), expected_reverse);
        assert!(matches!(rollback, RollbackOutcome::FullyRolledBack { deleted } if deleted.len() == 8));
        for id in [builder::ROLE, builder::FUNCTION, builder::API] {
            assert_eq!(
                state.nodes[&LogicalId::from(id)].status,
                NodeStatus::SkippedAlreadyExists
            );
        }
        assert_eq!(
            state.nodes[&LogicalId::from(builder::PROXY_METHOD_RESPONSE)].status,
            NodeStatus::RolledBack
        );
        // Permission was never attempted.
        assert!(!state.nodes.contains_key(&LogicalId::from(builder::PERMISSION)));
    }

    #[tokio::test]
    async fn test_deployment_failure_on_fresh_provider_rolls_back_foundations_too() {
        let client = FakeClient::new();
        client.fail_next_create(
            ResourceKind::Deployment,
            ProviderError::api("stage limit exceeded"),
        );

        let mut state = RunState::new("hash-1");
        let result = PlanExecutor::new(&client)
            .execute(&sample_plan(), &mut state, &CancelToken::new())
            .await
            .unwrap();

        assert!(!result.is_success());
        // 11 nodes were created before the deployment failed; all of them
        // are deleted, foundations included.
        assert_eq!(client.deleted_ids().len(), 11);
        assert_eq!(
            state.nodes[&LogicalId::from(builder::ROLE)].status,
            NodeStatus::RolledBack
        );
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let client = FakeClient::new();
        client.fail_next_create(
            ResourceKind::Api,
            ProviderError::Throttled { retry_after_secs: 0 },
        );

        let mut state = RunState::new("hash-1");
        let result = PlanExecutor::new(&client)
            .with_retry_config(fast_retry())
            .execute(&sample_plan(), &mut state, &CancelToken::new())
            .await
            .unwrap();

        assert!(result.is_success());
        // One extra create for the retried api node.
        assert_eq!(client.create_count(), 14);
    }

    #[tokio::test]
    async fn test_conflict_on_unlookupable_kind_is_duplicate_resource() {
        let client = FakeClient::new();
        client.fail_next_create(
            ResourceKind::Deployment,
            ProviderError::AlreadyExists {
                kind: String::from("deployment"),
                name: String::from("prod"),
            },
        );

        let mut state = RunState::new("hash-1");
        let result = PlanExecutor::new(&client)
            .execute(&sample_plan(), &mut state, &CancelToken::new())
            .await
            .unwrap();

        let RunOutcome::Failed { error, .. } = &result.outcome else {
            panic!("expected failed outcome");
        };
        assert!(error.contains("already exists"));
        assert_eq!(
            state.nodes[&LogicalId::from(builder::DEPLOYMENT)].status,
            NodeStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_cancelled_token_fails_at_first_node() {
        let client = FakeClient::new();
        let cancel = CancelToken::new();
        cancel.cancel();

        let mut state = RunState::new("hash-1");
        let result = PlanExecutor::new(&client)
            .execute(&sample_plan(), &mut state, &cancel)
            .await
            .unwrap();

        let RunOutcome::Failed { rollback, .. } = &result.outcome else {
            panic!("expected failed outcome");
        };
        assert_eq!(*rollback, RollbackOutcome::NothingToRollBack);
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_conflict_on_named_kind_adopts_existing() {
        let mut client = MockResourceClient::new();
        let mut seq = Sequence::new();

        // Guard sees nothing, create conflicts, re-query finds the winner.
        client
            .expect_exists()
            .with(eq(ResourceKind::Role), eq("fn1-exec-role"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(None));
        client
            .expect_create()
            .with(eq(ResourceKind::Role), mockall::predicate::always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Err(ProviderError::AlreadyExists {
                    kind: String::from("role"),
                    name: String::from("fn1-exec-role"),
                }
                .into())
            });
        client
            .expect_exists()
            .with(eq(ResourceKind::Role), eq("fn1-exec-role"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(Some(ExternalId::new("arn:stolen"))));
        // The remaining twelve nodes proceed normally.
        client.expect_exists().returning(|_, _| Ok(None));
        client
            .expect_create()
            .returning(|_, _| Ok(ExternalId::new("ext")));

        let mut state = RunState::new("hash-1");
        let result = PlanExecutor::new(&client)
            .execute(&sample_plan(), &mut state, &CancelToken::new())
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(
            state.nodes[&LogicalId::from(builder::ROLE)].status,
            NodeStatus::SkippedAlreadyExists
        );
        assert_eq!(
            state.external_id(&LogicalId::from(builder::ROLE)),
            Some(&ExternalId::new("arn:stolen"))
        );
    }

    #[tokio::test]
    async fn test_params_are_resolved_from_run_state() {
        let client = FakeClient::new();
        let mut state = RunState::new("hash-1");
        PlanExecutor::new(&client)
            .execute(&sample_plan(), &mut state, &CancelToken::new())
            .await
            .unwrap();

        // The function node's role_id placeholder resolved to the role's
        // synthetic external id before create was called.
        let role_ext = state
            .external_id(&LogicalId::from(builder::ROLE))
            .unwrap()
            .clone();
        assert!(role_ext.as_str().starts_with("ext-role-"));
    }

    #[test]
    fn test_retry_delay_honors_throttle_hint() {
        let retry = fast_retry();
        let throttled = StackliftError::from(ProviderError::Throttled { retry_after_secs: 5 });
        assert_eq!(retry_delay(&retry, 1, &throttled), Duration::from_secs(5));

        // A zero hint falls back to exponential backoff.
        let unhinted = StackliftError::from(ProviderError::Throttled { retry_after_secs: 0 });
        assert_eq!(retry_delay(&retry, 1, &unhinted), Duration::from_millis(1));

        // Non-retryable errors carry no hint at all.
        let fatal = StackliftError::from(ProviderError::Api {
            message: String::from("boom"),
        });
        assert_eq!(retry_delay(&retry, 2, &fatal), Duration::from_millis(2));
    }

    #[test]
    fn test_substitute_rejects_unknown_reference() {
        let state = RunState::new("hash-1");
        let err = substitute("${ghost}", &LogicalId::from("function"), &state).unwrap_err();
        assert!(matches!(
            err,
            StackliftError::Graph(GraphError::UnresolvedReference { .. })
        ));
    }

    #[test]
    fn test_substitute_handles_embedded_placeholders() {
        let mut state = RunState::new("hash-1");
        state.mark_created(
            &LogicalId::from("api"),
            ResourceKind::Api,
            ExternalId::new("abc123"),
        );
        let out = substitute("arn:${api}/prod", &LogicalId::from("permission"), &state).unwrap();
        assert_eq!(out, "arn:abc123/prod");
    }
}
