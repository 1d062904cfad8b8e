//! In-memory cluster for tests and dry runs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job, JobCondition, JobStatus};
use kperf_api::{Benchmark, BenchmarkStatus, Outcome};
use kperf_reconcile::CreateOutcome;
use kube::ResourceExt;
use serde_json::Value;
use tracing::debug;

use super::{BenchmarkEvent, ClusterClient, ClusterError};
use crate::builder::{ChildKind, ChildObject};

type ObjectKey = (ChildKind, String, String);

#[derive(Default)]
struct MockState {
    objects: BTreeMap<ObjectKey, ChildObject>,
    create_calls: Vec<(ChildKind, String)>,
    statuses: Vec<BenchmarkStatus>,
    stored_statuses: BTreeMap<(String, String), Value>,
    events: Vec<BenchmarkEvent>,
    failing_creates: BTreeSet<ChildKind>,
    failing_events: bool,
    unavailable: bool,
    stale_reads: bool,
}

/// Cluster held in memory, recording every call made against it.
#[derive(Default)]
pub struct MockCluster {
    state: Mutex<MockState>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every create of `kind` fail until [`MockCluster::heal`].
    pub fn fail_creates_of(&self, kind: ChildKind) {
        self.state().failing_creates.insert(kind);
    }

    /// Make every event publish fail.
    pub fn fail_events(&self) {
        self.state().failing_events = true;
    }

    /// Make every call fail as if the API server were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Report every object as missing, as a lagging cache would.
    pub fn set_stale_reads(&self, stale: bool) {
        self.state().stale_reads = stale;
    }

    /// Clear injected failures.
    pub fn heal(&self) {
        let mut state = self.state();
        state.failing_creates.clear();
        state.failing_events = false;
        state.unavailable = false;
    }

    /// Store an object as if someone else had created it.
    pub fn insert(&self, namespace: &str, child: ChildObject) {
        let key = (child.kind(), namespace.to_string(), child.name().to_string());
        self.state().objects.insert(key, child);
    }

    /// Mark a stored Job finished. Returns false if there is no such Job.
    pub fn set_job_finished(
        &self,
        namespace: &str,
        name: &str,
        outcome: Outcome,
        message: Option<&str>,
    ) -> bool {
        let key = (ChildKind::Job, namespace.to_string(), name.to_string());
        let mut state = self.state();
        let Some(ChildObject::Job(job)) = state.objects.get_mut(&key) else {
            return false;
        };

        let type_ = match outcome {
            Outcome::Pass => "Complete",
            Outcome::Fail => "Failed",
        };
        job.status = Some(JobStatus {
            conditions: Some(vec![JobCondition {
                type_: type_.to_string(),
                status: "True".to_string(),
                message: message.map(str::to_string),
                ..Default::default()
            }]),
            ..Default::default()
        });
        true
    }

    /// Every create call, successful or not, in call order.
    pub fn create_calls(&self) -> Vec<(ChildKind, String)> {
        self.state().create_calls.clone()
    }

    pub fn get(&self, namespace: &str, kind: ChildKind, name: &str) -> Option<ChildObject> {
        let key = (kind, namespace.to_string(), name.to_string());
        self.state().objects.get(&key).cloned()
    }

    /// Stored objects of one kind.
    pub fn objects_of(&self, kind: ChildKind) -> Vec<ChildObject> {
        self.state()
            .objects
            .iter()
            .filter(|((k, _, _), _)| *k == kind)
            .map(|(_, object)| object.clone())
            .collect()
    }

    pub fn object_count(&self) -> usize {
        self.state().objects.len()
    }

    /// Every status as stored after each write, in order.
    pub fn statuses(&self) -> Vec<BenchmarkStatus> {
        self.state().statuses.clone()
    }

    pub fn last_status(&self) -> Option<BenchmarkStatus> {
        self.state().statuses.last().cloned()
    }

    pub fn events(&self) -> Vec<BenchmarkEvent> {
        self.state().events.clone()
    }

    fn check_available(state: &MockState) -> Result<(), ClusterError> {
        if state.unavailable {
            return Err(ClusterError::Unavailable("mock cluster is down".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterClient for MockCluster {
    async fn child_exists(
        &self,
        namespace: &str,
        kind: ChildKind,
        name: &str,
    ) -> Result<bool, ClusterError> {
        let state = self.state();
        Self::check_available(&state)?;
        if state.stale_reads {
            return Ok(false);
        }
        let key = (kind, namespace.to_string(), name.to_string());
        Ok(state.objects.contains_key(&key))
    }

    async fn create_child(
        &self,
        namespace: &str,
        child: &ChildObject,
    ) -> Result<CreateOutcome, ClusterError> {
        let mut state = self.state();
        state
            .create_calls
            .push((child.kind(), child.name().to_string()));
        Self::check_available(&state)?;

        if state.failing_creates.contains(&child.kind()) {
            return Err(ClusterError::Unavailable(format!(
                "injected failure creating {} {}",
                child.kind(),
                child.name()
            )));
        }

        let key = (child.kind(), namespace.to_string(), child.name().to_string());
        if state.objects.contains_key(&key) {
            return Ok(CreateOutcome::AlreadyExisted);
        }

        debug!(kind = %child.kind(), object = child.name(), "[MOCK] Creating object");
        state.objects.insert(key, child.clone());
        Ok(CreateOutcome::Created)
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>, ClusterError> {
        let state = self.state();
        Self::check_available(&state)?;
        let key = (ChildKind::Job, namespace.to_string(), name.to_string());
        match state.objects.get(&key) {
            Some(ChildObject::Job(job)) => Ok(Some(job.clone())),
            _ => Ok(None),
        }
    }

    async fn update_status(
        &self,
        benchmark: &Benchmark,
        status: &BenchmarkStatus,
    ) -> Result<(), ClusterError> {
        let mut state = self.state();
        Self::check_available(&state)?;
        debug!(benchmark = %benchmark.name_any(), ?status, "[MOCK] Updating status");

        let patch = serde_json::to_value(status)
            .map_err(|e| ClusterError::Unavailable(format!("unencodable status: {e}")))?;
        let key = (
            benchmark.namespace().unwrap_or_default(),
            benchmark.name_any(),
        );
        let stored = state.stored_statuses.entry(key).or_insert(Value::Null);
        merge_patch(stored, &patch);
        let merged: BenchmarkStatus = serde_json::from_value(stored.clone())
            .map_err(|e| ClusterError::Unavailable(format!("stored status is invalid: {e}")))?;

        state.statuses.push(merged);
        Ok(())
    }

    async fn record_event(
        &self,
        benchmark: &Benchmark,
        event: &BenchmarkEvent,
    ) -> Result<(), ClusterError> {
        let mut state = self.state();
        Self::check_available(&state)?;
        if state.failing_events {
            return Err(ClusterError::Unavailable("injected event failure".to_string()));
        }
        debug!(
            benchmark = %benchmark.name_any(),
            reason = %event.reason,
            "[MOCK] Recording event"
        );
        state.events.push(event.clone());
        Ok(())
    }
}

/// JSON merge patch (RFC 7386), as the API server applies it to the status
/// subresource.
fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(fields) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Default::default());
    }
    if let Value::Object(existing) = target {
        for (key, value) in fields {
            if value.is_null() {
                existing.remove(key);
            } else {
                merge_patch(existing.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}
