//! [`ClusterClient`] over the Kubernetes API.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::NamespaceResourceScope;
use kperf_api::{Benchmark, BenchmarkStatus};
use kperf_reconcile::CreateOutcome;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use super::{BenchmarkEvent, ClusterClient, ClusterError, EventSeverity};
use crate::builder::{ChildKind, ChildObject};

/// HTTP status of a create that lost to an existing object.
const CONFLICT: u16 = 409;

/// Cluster client backed by a `kube::Client`.
pub struct KubeCluster {
    client: Client,
    recorder: Recorder,
    field_manager: String,
}

impl KubeCluster {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        let field_manager = field_manager.into();
        let reporter = Reporter {
            controller: field_manager.clone(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client.clone(), reporter),
            client,
            field_manager,
        }
    }

    async fn exists<K>(&self, namespace: &str, name: &str) -> Result<bool, ClusterError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + Debug
            + DeserializeOwned,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?.is_some())
    }

    async fn create<K>(&self, namespace: &str, object: &K) -> Result<CreateOutcome, ClusterError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + Debug
            + Serialize
            + DeserializeOwned,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let params = PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };

        match api.create(&params, object).await {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(kube::Error::Api(response)) if response.code == CONFLICT => {
                debug!(
                    kind = %K::kind(&()),
                    object = %object.name_any(),
                    "Object already exists"
                );
                Ok(CreateOutcome::AlreadyExisted)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn child_exists(
        &self,
        namespace: &str,
        kind: ChildKind,
        name: &str,
    ) -> Result<bool, ClusterError> {
        match kind {
            ChildKind::ConfigMap => self.exists::<ConfigMap>(namespace, name).await,
            ChildKind::Service => self.exists::<Service>(namespace, name).await,
            ChildKind::Deployment => self.exists::<Deployment>(namespace, name).await,
            ChildKind::Job => self.exists::<Job>(namespace, name).await,
        }
    }

    async fn create_child(
        &self,
        namespace: &str,
        child: &ChildObject,
    ) -> Result<CreateOutcome, ClusterError> {
        match child {
            ChildObject::ConfigMap(object) => self.create(namespace, object).await,
            ChildObject::Service(object) => self.create(namespace, object).await,
            ChildObject::Deployment(object) => self.create(namespace, object).await,
            ChildObject::Job(object) => self.create(namespace, object).await,
        }
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>, ClusterError> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn update_status(
        &self,
        benchmark: &Benchmark,
        status: &BenchmarkStatus,
    ) -> Result<(), ClusterError> {
        let namespace = benchmark
            .namespace()
            .ok_or_else(|| ClusterError::Unavailable("benchmark has no namespace".to_string()))?;
        let api: Api<Benchmark> = Api::namespaced(self.client.clone(), &namespace);
        let patch = json!({ "status": status });

        api.patch_status(
            &benchmark.name_any(),
            &PatchParams::apply(&self.field_manager),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn record_event(
        &self,
        benchmark: &Benchmark,
        event: &BenchmarkEvent,
    ) -> Result<(), ClusterError> {
        let type_ = match event.severity {
            EventSeverity::Normal => EventType::Normal,
            EventSeverity::Warning => EventType::Warning,
        };

        self.recorder
            .publish(
                &Event {
                    type_,
                    reason: event.reason.clone(),
                    note: Some(event.note.clone()),
                    action: "Reconcile".to_string(),
                    secondary: None,
                },
                &benchmark.object_ref(&()),
            )
            .await?;
        Ok(())
    }
}
