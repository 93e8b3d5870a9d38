//! In-memory scripted client for executor and rollback tests.

use crate::error::{ProviderError, Result};
use crate::graph::ResourceKind;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::client::{CreateParams, ExternalId, ResourceClient};

/// One call observed by the fake, in invocation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Exists(ResourceKind, String),
    Create(ResourceKind, String),
    Delete(ResourceKind, ExternalId),
}

#[derive(Default)]
struct Inner {
    existing: HashMap<(ResourceKind, String), ExternalId>,
    create_failures: HashMap<ResourceKind, VecDeque<ProviderError>>,
    delete_failures: HashMap<ExternalId, ProviderError>,
    next_id: u64,
    log: Vec<Call>,
}

/// A scripted [`ResourceClient`] that records every call.
///
/// Creates succeed with synthetic ids unless a failure has been queued for
/// the kind; queued failures are consumed one per attempt, so a transient
/// error followed by success models a retryable blip.
#[derive(Default)]
pub struct FakeClient {
    inner: Mutex<Inner>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a resource so lookups report it as pre-existing.
    pub fn seed_existing(&self, kind: ResourceKind, name: &str, id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .existing
            .insert((kind, name.to_string()), ExternalId::new(id));
    }

    /// Queues an error for the next create of the given kind.
    pub fn fail_next_create(&self, kind: ResourceKind, error: ProviderError) {
        let mut inner = self.inner.lock().unwrap();
        inner.create_failures.entry(kind).or_default().push_back(error);
    }

    /// Makes deletion of the given external id fail.
    pub fn fail_delete(&self, id: &str, error: ProviderError) {
        let mut inner = self.inner.lock().unwrap();
        inner.delete_failures.insert(ExternalId::new(id), error);
    }

    /// Returns every call made so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().log.clone()
    }

    /// Returns the external ids deleted so far, in order.
    pub fn deleted_ids(&self) -> Vec<ExternalId> {
        self.inner
            .lock()
            .unwrap()
            .log
            .iter()
            .filter_map(|call| match call {
                Call::Delete(_, id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns how many creates have been issued.
    pub fn create_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|call| matches!(call, Call::Create(..)))
            .count()
    }
}

#[async_trait]
impl ResourceClient for FakeClient {
    async fn exists(&self, kind: ResourceKind, name: &str) -> Result<Option<ExternalId>> {
        let mut inner = self.inner.lock().unwrap();
        inner.log.push(Call::Exists(kind, name.to_string()));
        Ok(inner.existing.get(&(kind, name.to_string())).cloned())
    }

    async fn create(&self, kind: ResourceKind, params: &CreateParams) -> Result<ExternalId> {
        let label = params
            .get("name")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("-")
            .to_string();

        let mut inner = self.inner.lock().unwrap();
        inner.log.push(Call::Create(kind, label));

        if let Some(queue) = inner.create_failures.get_mut(&kind) {
            if let Some(error) = queue.pop_front() {
                return Err(error.into());
            }
        }

        inner.next_id += 1;
        Ok(ExternalId::new(format!("ext-{kind}-{}", inner.next_id)))
    }

    async fn delete(&self, kind: ResourceKind, id: &ExternalId) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.log.push(Call::Delete(kind, id.clone()));

        if let Some(error) = inner.delete_failures.remove(id) {
            return Err(error.into());
        }
        Ok(())
    }
}
