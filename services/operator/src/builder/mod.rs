//! Workload builder.
//!
//! Maps an [`WorkloadPlan`] onto concrete Kubernetes objects. The mapping is
//! a field-for-field copy; nothing here consults the cluster. Before
//! building, the plan's internal consistency is checked and an inconsistent
//! plan is refused with [`BuildError::ContractViolation`] instead of being
//! patched up.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kperf_api::Benchmark;
use kperf_reconcile::SpecHash;
use kube::{Resource, ResourceExt};
use thiserror::Error;

use crate::labels::PLAN_HASH_ANNOTATION;
use crate::plan::{ExecutionPlan, VolumeSource, WorkloadPlan};
use crate::topology::Transport;

mod config_map;
mod job;
mod pod;
pub mod probe;
mod server;

pub use job::BACKOFF_LIMIT;
pub use server::HEADLESS;

/// Errors building workload objects.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The plan is internally inconsistent.
    #[error("contract violation in {role} plan: {detail}")]
    ContractViolation { role: &'static str, detail: String },

    /// The owner has no name or uid to reference.
    #[error("benchmark has no uid to reference as owner")]
    MissingOwnerIdentity,

    /// The plan cannot be fingerprinted.
    #[error("plan serialization failed: {0}")]
    Fingerprint(#[from] serde_json::Error),
}

impl BuildError {
    /// Get the standardized reason code for this error.
    pub fn reason_code(&self) -> &'static str {
        match self {
            BuildError::ContractViolation { .. } => "contract_violation",
            BuildError::MissingOwnerIdentity => "missing_owner_identity",
            BuildError::Fingerprint(_) => "plan_fingerprint_failed",
        }
    }
}

/// Kind of a child object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChildKind {
    ConfigMap,
    Service,
    Deployment,
    Job,
}

impl ChildKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChildKind::ConfigMap => "ConfigMap",
            ChildKind::Service => "Service",
            ChildKind::Deployment => "Deployment",
            ChildKind::Job => "Job",
        }
    }
}

impl std::fmt::Display for ChildKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A child object ready to be created.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildObject {
    ConfigMap(ConfigMap),
    Service(Service),
    Deployment(Deployment),
    Job(Job),
}

impl ChildObject {
    pub fn kind(&self) -> ChildKind {
        match self {
            ChildObject::ConfigMap(_) => ChildKind::ConfigMap,
            ChildObject::Service(_) => ChildKind::Service,
            ChildObject::Deployment(_) => ChildKind::Deployment,
            ChildObject::Job(_) => ChildKind::Job,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            ChildObject::ConfigMap(o) => &o.metadata,
            ChildObject::Service(o) => &o.metadata,
            ChildObject::Deployment(o) => &o.metadata,
            ChildObject::Job(o) => &o.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }
}

/// Every object of one benchmark.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadObjects {
    pub config_map: Option<ConfigMap>,
    pub service: Option<Service>,
    pub deployment: Option<Deployment>,
    pub job: Job,
}

impl WorkloadObjects {
    /// Objects in the order they must be created.
    ///
    /// Mounted files come first, then the server's Service and Deployment,
    /// and the Job last so the server is addressable when the client starts.
    pub fn in_creation_order(&self) -> Vec<ChildObject> {
        let mut children = Vec::with_capacity(4);
        children.extend(self.config_map.clone().map(ChildObject::ConfigMap));
        children.extend(self.service.clone().map(ChildObject::Service));
        children.extend(self.deployment.clone().map(ChildObject::Deployment));
        children.push(ChildObject::Job(self.job.clone()));
        children
    }
}

/// Metadata shared by every child of one pass.
pub struct ObjectStamp<'a> {
    namespace: Option<String>,
    owner: OwnerReference,
    plan_hash: &'a SpecHash,
}

impl ObjectStamp<'_> {
    fn metadata(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
        annotations: &BTreeMap<String, String>,
    ) -> ObjectMeta {
        let mut annotations = annotations.clone();
        annotations.insert(
            PLAN_HASH_ANNOTATION.to_string(),
            self.plan_hash.to_string(),
        );

        ObjectMeta {
            name: Some(name.to_string()),
            namespace: self.namespace.clone(),
            labels: pod::non_empty_map(labels),
            annotations: Some(annotations),
            owner_references: Some(vec![self.owner.clone()]),
            ..Default::default()
        }
    }
}

/// Build the objects of a plan, owned by `owner`.
pub fn build(plan: &WorkloadPlan, owner: &Benchmark) -> Result<WorkloadObjects, BuildError> {
    let owner_ref = owner
        .controller_owner_ref(&())
        .ok_or(BuildError::MissingOwnerIdentity)?;
    let plan_hash = SpecHash::from_json(&serde_json::to_value(plan)?);
    let stamp = ObjectStamp {
        namespace: owner.namespace(),
        owner: owner_ref,
        plan_hash: &plan_hash,
    };

    match plan {
        WorkloadPlan::Job(job_plan) => {
            check_contract(job_plan, None)?;
            Ok(WorkloadObjects {
                config_map: job_plan
                    .config_files
                    .as_ref()
                    .map(|files| config_map::config_map(files, job_plan, &stamp)),
                service: None,
                deployment: None,
                job: job::job(job_plan, &stamp),
            })
        }
        WorkloadPlan::ClientServer {
            topology,
            server,
            client,
        } => {
            check_contract(server, Some(topology.transport))?;
            check_contract(client, Some(topology.transport))?;
            if server.container.ports != topology.ports {
                return Err(BuildError::ContractViolation {
                    role: server.role.as_str(),
                    detail: "container ports differ from the service ports".to_string(),
                });
            }
            if client.config_files.is_some() || server.config_files.is_some() {
                return Err(BuildError::ContractViolation {
                    role: client.role.as_str(),
                    detail: "client/server plans carry no inline files".to_string(),
                });
            }

            Ok(WorkloadObjects {
                config_map: None,
                service: Some(server::service(topology, server, &stamp)),
                deployment: Some(server::deployment(server, &stamp)),
                job: job::job(client, &stamp),
            })
        }
    }
}

/// Check the invariants the builder relies on.
fn check_contract(plan: &ExecutionPlan, transport: Option<Transport>) -> Result<(), BuildError> {
    let violation = |detail: String| {
        Err(BuildError::ContractViolation {
            role: plan.role.as_str(),
            detail,
        })
    };

    let mut volumes = BTreeSet::new();
    for volume in &plan.volumes {
        if !volumes.insert(volume.name.as_str()) {
            return violation(format!("volume {:?} is declared twice", volume.name));
        }

        let mounts = plan
            .container
            .mounts
            .iter()
            .filter(|mount| mount.volume == volume.name)
            .count();
        if mounts != 1 {
            return violation(format!(
                "volume {:?} has {mounts} mounts, expected exactly one",
                volume.name
            ));
        }

        if let VolumeSource::ConfigMap { name } = &volume.source {
            let planned = plan.config_files.as_ref().map(|files| &files.name);
            if planned != Some(name) {
                return violation(format!(
                    "volume {:?} references ConfigMap {name:?} outside the plan",
                    volume.name
                ));
            }
        }
    }

    let init_mounts = plan
        .init_container
        .iter()
        .flat_map(|init| init.mounts.iter());
    for mount in plan.container.mounts.iter().chain(init_mounts) {
        if !volumes.contains(mount.volume.as_str()) {
            return violation(format!(
                "mount {:?} references undeclared volume {:?}",
                mount.path, mount.volume
            ));
        }
    }

    if let Some(transport) = transport {
        if let Some(port) = plan
            .container
            .ports
            .iter()
            .find(|port| port.transport != transport)
        {
            return violation(format!(
                "port {:?} uses {} but the benchmark runs over {transport}",
                port.name, port.transport
            ));
        }
    }

    if let Some(probe) = &plan.container.readiness {
        if !plan.container.ports.iter().any(|port| port.port == probe.port) {
            return violation(format!("probed port {} is not declared", probe.port));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use kperf_api::{BenchmarkSpec, ClientServerSpec, DrillSpec, ImageSpec, Workload};

    use super::*;
    use crate::plan::{normalize, MountPlan};

    fn benchmark(workload: Workload) -> Benchmark {
        let mut benchmark = Benchmark::new(
            "bench-1",
            BenchmarkSpec {
                image: ImageSpec {
                    name: "example/tool:1.0".to_string(),
                    ..Default::default()
                },
                workload,
            },
        );
        benchmark.metadata.namespace = Some("perf".to_string());
        benchmark.metadata.uid = Some("4f0c1a52-0000-4000-8000-000000000001".to_string());
        benchmark
    }

    fn drill() -> Workload {
        Workload::Drill(DrillSpec {
            benchmarks_volume: [("a.yml".to_string(), "base: 'http://a'".to_string())].into(),
            benchmark_file: "a.yml".to_string(),
            completions: 2,
            ..Default::default()
        })
    }

    fn plan_of(benchmark: &Benchmark) -> WorkloadPlan {
        normalize(benchmark, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()).unwrap()
    }

    #[test]
    fn test_job_shape() {
        let definition = benchmark(drill());
        let objects = build(&plan_of(&definition), &definition).unwrap();

        let spec = objects.job.spec.as_ref().unwrap();
        assert_eq!(spec.backoff_limit, Some(BACKOFF_LIMIT));
        assert_eq!(spec.completions, Some(2));
        let pod = spec.template.spec.as_ref().unwrap();
        assert_eq!(pod.restart_policy.as_deref(), Some("Never"));
        assert_eq!(pod.containers.len(), 1);

        assert!(objects.service.is_none());
        assert!(objects.deployment.is_none());

        let config_map = objects.config_map.as_ref().unwrap();
        assert_eq!(config_map.metadata.name.as_deref(), Some("bench-1-files"));
        assert!(config_map.data.as_ref().unwrap().contains_key("a.yml"));
    }

    #[test]
    fn test_children_are_owned_and_fingerprinted() {
        let definition = benchmark(Workload::Iperf3(ClientServerSpec::default()));
        let objects = build(&plan_of(&definition), &definition).unwrap();
        let children = objects.in_creation_order();

        let kinds: Vec<ChildKind> = children.iter().map(ChildObject::kind).collect();
        assert_eq!(
            kinds,
            vec![ChildKind::Service, ChildKind::Deployment, ChildKind::Job]
        );

        let hashes: BTreeSet<&str> = children
            .iter()
            .map(|child| {
                let meta = child.metadata();
                let owner = &meta.owner_references.as_ref().unwrap()[0];
                assert_eq!(owner.kind, "Benchmark");
                assert_eq!(owner.controller, Some(true));
                assert_eq!(meta.namespace.as_deref(), Some("perf"));
                meta.annotations.as_ref().unwrap()[PLAN_HASH_ANNOTATION].as_str()
            })
            .collect();
        assert_eq!(hashes.len(), 1);
    }

    #[test]
    fn test_service_is_headless() {
        let definition = benchmark(Workload::Iperf2(ClientServerSpec::default()));
        let objects = build(&plan_of(&definition), &definition).unwrap();

        let service = objects.service.unwrap();
        let spec = service.spec.unwrap();
        assert_eq!(spec.cluster_ip.as_deref(), Some(HEADLESS));
        assert_eq!(spec.ports.unwrap()[0].port, 5201);

        let deployment = objects.deployment.unwrap();
        let deployment_spec = deployment.spec.unwrap();
        assert_eq!(deployment_spec.replicas, Some(1));
        assert_eq!(deployment_spec.selector.match_labels, spec.selector);
    }

    #[test]
    fn test_missing_owner_uid() {
        let mut definition = benchmark(drill());
        let plan = plan_of(&definition);
        definition.metadata.uid = None;

        let err = build(&plan, &definition).unwrap_err();
        assert_eq!(err.reason_code(), "missing_owner_identity");
    }

    #[test]
    fn test_unmounted_volume_is_a_violation() {
        let definition = benchmark(drill());
        let mut plan = plan_of(&definition);
        let WorkloadPlan::Job(job) = &mut plan else {
            panic!("expected a job plan");
        };
        job.container.mounts.clear();

        let err = build(&plan, &definition).unwrap_err();
        assert!(matches!(err, BuildError::ContractViolation { role: "job", .. }));
    }

    #[test]
    fn test_doubly_mounted_volume_is_a_violation() {
        let definition = benchmark(drill());
        let mut plan = plan_of(&definition);
        let WorkloadPlan::Job(job) = &mut plan else {
            panic!("expected a job plan");
        };
        job.container.mounts.push(MountPlan {
            volume: "benchmarks".to_string(),
            path: "/again".to_string(),
            read_only: true,
        });

        assert!(build(&plan, &definition).is_err());
    }

    #[test]
    fn test_divergent_port_transport_is_a_violation() {
        let definition = benchmark(Workload::Iperf2(ClientServerSpec::default()));
        let mut plan = plan_of(&definition);
        let WorkloadPlan::ClientServer { server, .. } = &mut plan else {
            panic!("expected a client/server plan");
        };
        server.container.ports[0].transport = Transport::Udp;

        let err = build(&plan, &definition).unwrap_err();
        assert_eq!(err.reason_code(), "contract_violation");
    }

    #[test]
    fn test_undeclared_probe_port_is_a_violation() {
        let definition = benchmark(Workload::Iperf2(ClientServerSpec::default()));
        let mut plan = plan_of(&definition);
        let WorkloadPlan::ClientServer { server, .. } = &mut plan else {
            panic!("expected a client/server plan");
        };
        if let Some(probe) = server.container.readiness.as_mut() {
            probe.port = 6000;
        }

        assert!(build(&plan, &definition).is_err());
    }
}
