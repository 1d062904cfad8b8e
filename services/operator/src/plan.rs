//! Execution plans.
//!
//! A plan is the fully resolved description of what the cluster should run
//! for one benchmark: command lines, environment, volumes, ports, probes and
//! placement. It is recomputed on every pass and never stored.
//!
//! [`normalize`] is deterministic given the benchmark and the instant of the
//! pass. It never mutates the benchmark; shared pod configuration is cloned
//! into the plan and merged with the kind's recipe.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{
    Affinity, EmptyDirVolumeSource, HostPathVolumeSource, PersistentVolumeClaimVolumeSource,
    ResourceRequirements, Toleration,
};
use kperf_api::{
    Benchmark, EndpointConfiguration, ImageSpec, PodConfigurationSpec, PullPolicy, SecretKeyRef,
    VolumeSpec,
};
use kube::ResourceExt;
use serde::Serialize;
use thiserror::Error;

use crate::kinds::{self, BenchmarkKind, ClientServerKind, JobKind, JobRecipe, RecipeContext};
use crate::labels;
use crate::topology::{self, ServerTopology, Transport};

/// Readiness probe timings of server pods, in seconds.
const PROBE_INITIAL_DELAY_SECS: i32 = 5;
const PROBE_TIMEOUT_SECS: i32 = 2;
const PROBE_PERIOD_SECS: i32 = 2;

/// Errors deriving a plan from a validated benchmark.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    /// A raw command-line fragment cannot be split into arguments.
    #[error("{field} is not a valid command line: unbalanced quote in {value:?}")]
    CommandLine { field: &'static str, value: String },
}

impl NormalizeError {
    /// Get the standardized reason code for this error.
    pub fn reason_code(&self) -> &'static str {
        match self {
            NormalizeError::CommandLine { .. } => "invalid_command_line",
        }
    }
}

/// Split a command-line fragment with POSIX shell rules.
pub fn split_args(field: &'static str, value: &str) -> Result<Vec<String>, NormalizeError> {
    shlex::split(value).ok_or_else(|| NormalizeError::CommandLine {
        field,
        value: value.to_string(),
    })
}

/// Role of a pod within a benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The single Job of a job-only benchmark.
    Job,
    Server,
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Job => "job",
            Role::Server => "server",
            Role::Client => "client",
        }
    }
}

/// Plan of one workload object (a Job or the server Deployment).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    /// Name of the Job or Deployment.
    pub name: String,
    pub role: Role,

    /// Pod template labels: user labels overlaid with the reserved ones.
    pub labels: BTreeMap<String, String>,

    /// Reserved labels only.
    pub selector: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,

    pub container: ContainerPlan,
    pub init_container: Option<ContainerPlan>,
    pub volumes: Vec<VolumePlan>,
    pub placement: Placement,
    pub pull_secret: Option<String>,

    /// Inline files the pod mounts from a ConfigMap.
    pub config_files: Option<ConfigFiles>,

    /// Successful runs a Job waits for.
    pub completions: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPlan {
    pub name: String,
    pub image: String,
    pub pull_policy: Option<PullPolicy>,
    pub command: Vec<String>,
    pub args: Vec<String>,
    pub env: Vec<EnvPlan>,
    pub ports: Vec<PortPlan>,
    pub mounts: Vec<MountPlan>,
    pub resources: Option<ResourceRequirements>,
    pub readiness: Option<ProbePlan>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvPlan {
    pub name: String,
    pub source: EnvSource,
}

/// Where an environment variable takes its value from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EnvSource {
    Value(String),
    Secret { name: String, key: String },
}

impl EnvPlan {
    pub fn new(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            source: EnvSource::Value(value.into()),
        }
    }

    pub fn from_secret(name: &str, secret: &SecretKeyRef) -> Self {
        Self {
            name: name.to_string(),
            source: EnvSource::Secret {
                name: secret.name.clone(),
                key: secret.key.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortPlan {
    pub name: String,
    pub port: i32,
    pub transport: Transport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MountPlan {
    /// Name of the mounted volume.
    pub volume: String,
    pub path: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumePlan {
    pub name: String,
    pub source: VolumeSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum VolumeSource {
    /// The benchmark's own ConfigMap.
    ConfigMap { name: String },
    HostPath(HostPathVolumeSource),
    EmptyDir(EmptyDirVolumeSource),
    PersistentVolumeClaim(PersistentVolumeClaimVolumeSource),
}

impl VolumeSource {
    /// Source of a user-provided volume. Defaults to an `emptyDir`.
    pub fn from_spec(spec: &VolumeSpec) -> Self {
        if let Some(claim) = &spec.persistent_volume_claim {
            VolumeSource::PersistentVolumeClaim(claim.clone())
        } else if let Some(host_path) = &spec.host_path {
            VolumeSource::HostPath(host_path.clone())
        } else {
            VolumeSource::EmptyDir(spec.empty_dir.clone().unwrap_or_default())
        }
    }
}

/// Scheduling constraints of a pod.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub affinity: Option<Affinity>,
    pub tolerations: Vec<Toleration>,
    pub node_selector: BTreeMap<String, String>,
    pub node_name: Option<String>,
    pub host_network: bool,
}

impl Placement {
    fn from_pod_config(pod_config: &PodConfigurationSpec, host_network: bool) -> Self {
        let scheduling = &pod_config.pod_scheduling;
        Self {
            affinity: scheduling.affinity.clone(),
            tolerations: scheduling.tolerations.clone(),
            node_selector: scheduling.node_selector.clone(),
            node_name: scheduling.node_name.clone(),
            host_network,
        }
    }
}

/// Readiness check of a server: a bound socket on `port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbePlan {
    pub port: i32,

    /// Selects the socket tables scanned.
    pub transport: Transport,
    pub initial_delay_seconds: i32,
    pub timeout_seconds: i32,
    pub period_seconds: i32,
}

/// Inline files of a benchmark, keyed by file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigFiles {
    /// Name of the ConfigMap.
    pub name: String,
    pub data: BTreeMap<String, String>,
}

/// Plan of every workload object of one benchmark.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkloadPlan {
    /// A single Job.
    Job(ExecutionPlan),

    /// A server Deployment and Service plus a client Job.
    ClientServer {
        topology: ServerTopology,
        server: ExecutionPlan,
        client: ExecutionPlan,
    },
}

impl WorkloadPlan {
    /// Plan of the benchmark's Job.
    pub fn job(&self) -> &ExecutionPlan {
        match self {
            WorkloadPlan::Job(plan) => plan,
            WorkloadPlan::ClientServer { client, .. } => client,
        }
    }

    pub fn has_server(&self) -> bool {
        matches!(self, WorkloadPlan::ClientServer { .. })
    }
}

/// Derive the plan of a benchmark at instant `now`.
///
/// Expects a benchmark that passed validation.
pub fn normalize(
    benchmark: &Benchmark,
    now: DateTime<Utc>,
) -> Result<WorkloadPlan, NormalizeError> {
    let name = benchmark.name_any();
    let kind_name = benchmark.spec.workload.kind_name();
    let image = &benchmark.spec.image;

    match kinds::dispatch(&benchmark.spec.workload) {
        BenchmarkKind::Job(kind) => {
            let ctx = RecipeContext { name: &name, now };
            let recipe = kind.recipe(&ctx)?;
            Ok(WorkloadPlan::Job(job_plan(&ctx, kind_name, image, kind, recipe)))
        }
        BenchmarkKind::ClientServer(kind) => {
            client_server_plan(&name, kind_name, image, kind.as_ref())
        }
    }
}

fn job_plan(
    ctx: &RecipeContext<'_>,
    kind_name: &str,
    image: &ImageSpec,
    kind: &dyn JobKind,
    recipe: JobRecipe,
) -> ExecutionPlan {
    let pod_config = kind.pod_config();
    let JobRecipe {
        command,
        args,
        env,
        volumes,
        config_files,
        init,
        completions,
    } = recipe;

    let (volumes, mounts): (Vec<_>, Vec<_>) =
        volumes.into_iter().map(|v| (v.volume, v.mount)).unzip();

    let init_container = init.map(|init| ContainerPlan {
        name: format!("{kind_name}-init"),
        image: image.name.clone(),
        pull_policy: image.pull_policy,
        command: init.command,
        args: init.args,
        env: env.clone(),
        ports: Vec::new(),
        mounts: Vec::new(),
        resources: pod_config.resources.clone(),
        readiness: None,
    });

    let config_files = (!config_files.is_empty()).then(|| ConfigFiles {
        name: ctx.config_map_name(),
        data: config_files,
    });

    ExecutionPlan {
        name: ctx.name.to_string(),
        role: Role::Job,
        labels: labels::pod_labels(&pod_config.pod_labels, kind_name, ctx.name, Role::Job),
        selector: labels::selector(kind_name, ctx.name, Role::Job),
        annotations: pod_config.annotations.clone(),
        container: ContainerPlan {
            name: kind_name.to_string(),
            image: image.name.clone(),
            pull_policy: image.pull_policy,
            command,
            args,
            env,
            ports: Vec::new(),
            mounts,
            resources: pod_config.resources.clone(),
            readiness: None,
        },
        init_container,
        volumes,
        placement: Placement::from_pod_config(pod_config, false),
        pull_secret: image.pull_secret.clone(),
        config_files,
        completions,
    }
}

fn client_server_plan(
    name: &str,
    kind_name: &str,
    image: &ImageSpec,
    kind: &dyn ClientServerKind,
) -> Result<WorkloadPlan, NormalizeError> {
    let endpoints = kind.endpoints();
    let transport = Transport::from_udp(endpoints.udp);
    let topology = topology::resolve(
        name,
        transport,
        kind.ports(),
        labels::selector(kind_name, name, Role::Server),
    );

    let mut server_args = kind.server_args(transport);
    server_args.extend(split_args(
        "serverConfiguration.cmdLineArgs",
        &endpoints.server_configuration.cmd_line_args,
    )?);

    let mut client_args = kind.client_args(topology.address(), transport);
    client_args.extend(split_args(
        "clientConfiguration.cmdLineArgs",
        &endpoints.client_configuration.cmd_line_args,
    )?);

    let readiness = topology.ports.first().map(|port| ProbePlan {
        port: port.port,
        transport: kind.listen_transport(transport),
        initial_delay_seconds: PROBE_INITIAL_DELAY_SECS,
        timeout_seconds: PROBE_TIMEOUT_SECS,
        period_seconds: PROBE_PERIOD_SECS,
    });

    let server = endpoint_plan(
        &topology.service_name,
        Role::Server,
        kind_name,
        name,
        image,
        &endpoints.server_configuration,
        ContainerPlan {
            name: Role::Server.as_str().to_string(),
            image: image.name.clone(),
            pull_policy: image.pull_policy,
            command: kind.server_command(),
            args: server_args,
            env: Vec::new(),
            ports: topology.ports.clone(),
            mounts: Vec::new(),
            resources: endpoints.server_configuration.pod_configuration_spec.resources.clone(),
            readiness,
        },
    );

    let client = endpoint_plan(
        name,
        Role::Client,
        kind_name,
        name,
        image,
        &endpoints.client_configuration,
        ContainerPlan {
            name: Role::Client.as_str().to_string(),
            image: image.name.clone(),
            pull_policy: image.pull_policy,
            command: kind.client_command(),
            args: client_args,
            env: Vec::new(),
            ports: Vec::new(),
            mounts: Vec::new(),
            resources: endpoints.client_configuration.pod_configuration_spec.resources.clone(),
            readiness: None,
        },
    );

    Ok(WorkloadPlan::ClientServer {
        topology,
        server,
        client,
    })
}

fn endpoint_plan(
    object_name: &str,
    role: Role,
    kind_name: &str,
    benchmark_name: &str,
    image: &ImageSpec,
    endpoint: &EndpointConfiguration,
    container: ContainerPlan,
) -> ExecutionPlan {
    let pod_config = &endpoint.pod_configuration_spec;
    ExecutionPlan {
        name: object_name.to_string(),
        role,
        labels: labels::pod_labels(&pod_config.pod_labels, kind_name, benchmark_name, role),
        selector: labels::selector(kind_name, benchmark_name, role),
        annotations: pod_config.annotations.clone(),
        container,
        init_container: None,
        volumes: Vec::new(),
        placement: Placement::from_pod_config(pod_config, endpoint.host_network),
        pull_secret: image.pull_secret.clone(),
        config_files: None,
        completions: None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use kperf_api::{BenchmarkSpec, ClientServerSpec, SysbenchSpec, Workload};

    use super::*;

    fn benchmark(workload: Workload) -> Benchmark {
        let mut benchmark = Benchmark::new(
            "bench-1",
            BenchmarkSpec {
                image: ImageSpec {
                    name: "example/tool:1.0".to_string(),
                    pull_policy: Some(PullPolicy::IfNotPresent),
                    pull_secret: Some("registry".to_string()),
                },
                workload,
            },
        );
        benchmark.metadata.namespace = Some("perf".to_string());
        benchmark
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap()
    }

    #[test]
    fn test_split_args() {
        assert_eq!(
            split_args("args", r#"--time 10 --name "a b""#).unwrap(),
            vec!["--time", "10", "--name", "a b"]
        );
        assert_eq!(split_args("args", "").unwrap(), Vec::<String>::new());

        let err = split_args("args", r#"--name "open"#).unwrap_err();
        assert_eq!(err.reason_code(), "invalid_command_line");
    }

    #[test]
    fn test_job_plan_merges_pod_config() {
        let mut spec = SysbenchSpec {
            test_name: "cpu".to_string(),
            options: "--threads=2".to_string(),
            ..Default::default()
        };
        spec.pod_config
            .pod_labels
            .insert("team".to_string(), "perf".to_string());
        spec.pod_config.pod_scheduling.node_name = Some("node-a".to_string());

        let plan = normalize(&benchmark(Workload::Sysbench(spec)), now()).unwrap();
        let WorkloadPlan::Job(job) = &plan else {
            panic!("expected a job plan");
        };

        assert_eq!(job.name, "bench-1");
        assert_eq!(job.labels["team"], "perf");
        assert_eq!(job.labels[labels::ROLE_LABEL], "job");
        assert_eq!(job.container.name, "sysbench");
        assert_eq!(job.container.image, "example/tool:1.0");
        assert_eq!(job.pull_secret.as_deref(), Some("registry"));
        assert_eq!(job.placement.node_name.as_deref(), Some("node-a"));
        assert!(job.config_files.is_none());
    }

    #[test]
    fn test_client_server_plan() {
        let spec = ClientServerSpec {
            udp: true,
            ..Default::default()
        };
        let plan = normalize(&benchmark(Workload::Iperf2(spec)), now()).unwrap();
        let WorkloadPlan::ClientServer {
            topology,
            server,
            client,
        } = &plan
        else {
            panic!("expected a client/server plan");
        };

        assert_eq!(topology.service_name, "bench-1");
        assert_eq!(topology.transport, Transport::Udp);
        assert_eq!(server.name, "bench-1");
        assert_eq!(server.selector, topology.selector);
        assert_eq!(server.container.ports, topology.ports);
        assert!(client.container.args.contains(&"bench-1".to_string()));
        assert_eq!(plan.job().role, Role::Client);

        let probe = server.container.readiness.as_ref().unwrap();
        assert_eq!(probe.port, 5201);
        assert_eq!(probe.initial_delay_seconds, 5);
    }

    #[test]
    fn test_unbalanced_fragment_is_an_error() {
        let mut spec = ClientServerSpec::default();
        spec.client_configuration.cmd_line_args = "--title 'unterminated".to_string();

        let err = normalize(&benchmark(Workload::Iperf3(spec)), now()).unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::CommandLine {
                field: "clientConfiguration.cmdLineArgs",
                ..
            }
        ));
    }

    #[test]
    fn test_normalize_does_not_mutate_definition() {
        let definition = benchmark(Workload::Iperf3(ClientServerSpec::default()));
        let before = definition.clone();
        let _ = normalize(&definition, now()).unwrap();
        assert_eq!(definition.spec, before.spec);
    }
}
