//! Storage contracts.
//!
//! Pipelines, policies, and audit reports are persisted by injected
//! repositories; the core only defines the seams it consumes and ships
//! in-memory implementations for wiring and tests. Audit reports are
//! recorded atomically: one call per completed request.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::context::AuditReport;
use crate::pipeline::Pipeline;
use crate::policy::Policy;

/// Persistence seam for policies, addressed by id.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn get(&self, id: &str) -> Option<Policy>;
    async fn list(&self) -> Vec<Policy>;
    async fn upsert(&self, policy: Policy);
    async fn delete(&self, id: &str) -> bool;
}

/// Persistence seam for pipeline definitions.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    async fn get(&self, id: &str) -> Option<Pipeline>;
    async fn list(&self) -> Vec<Pipeline>;
    async fn upsert(&self, pipeline: Pipeline);
    async fn delete(&self, id: &str) -> bool;
}

/// Sink for completed audit reports. Each report must land atomically;
/// partial stage lists are never visible to readers.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, report: AuditReport);
}

/// In-memory policy store.
#[derive(Default)]
pub struct InMemoryPolicyStore {
    policies: RwLock<HashMap<String, Policy>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policies(policies: impl IntoIterator<Item = Policy>) -> Self {
        let store = Self::new();
        {
            let mut map = store.policies.write().unwrap();
            for policy in policies {
                map.insert(policy.id.clone(), policy);
            }
        }
        store
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn get(&self, id: &str) -> Option<Policy> {
        self.policies.read().unwrap().get(id).cloned()
    }

    async fn list(&self) -> Vec<Policy> {
        let mut policies: Vec<Policy> =
            self.policies.read().unwrap().values().cloned().collect();
        // Evaluation order: descending priority.
        policies.sort_by_key(|p| std::cmp::Reverse(p.priority));
        policies
    }

    async fn upsert(&self, policy: Policy) {
        self.policies
            .write()
            .unwrap()
            .insert(policy.id.clone(), policy);
    }

    async fn delete(&self, id: &str) -> bool {
        self.policies.write().unwrap().remove(id).is_some()
    }
}

/// In-memory pipeline store.
#[derive(Default)]
pub struct InMemoryPipelineStore {
    pipelines: RwLock<HashMap<String, Pipeline>>,
}

impl InMemoryPipelineStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PipelineStore for InMemoryPipelineStore {
    async fn get(&self, id: &str) -> Option<Pipeline> {
        self.pipelines.read().unwrap().get(id).cloned()
    }

    async fn list(&self) -> Vec<Pipeline> {
        let mut pipelines: Vec<Pipeline> =
            self.pipelines.read().unwrap().values().cloned().collect();
        pipelines.sort_by(|a, b| a.id.cmp(&b.id));
        pipelines
    }

    async fn upsert(&self, pipeline: Pipeline) {
        self.pipelines
            .write()
            .unwrap()
            .insert(pipeline.id.clone(), pipeline);
    }

    async fn delete(&self, id: &str) -> bool {
        self.pipelines.write().unwrap().remove(id).is_some()
    }
}

/// Audit sink collecting reports in memory; test support and a default
/// for deployments without a durable store.
#[derive(Default)]
pub struct MemoryAuditSink {
    reports: RwLock<Vec<AuditReport>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<AuditReport> {
        self.reports.read().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, report: AuditReport) {
        self.reports.write().unwrap().push(report);
    }
}
