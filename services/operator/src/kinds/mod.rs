//! Benchmark kinds.
//!
//! Every supported tool is one variant of [`Workload`]. A kind supplies its
//! validation predicate and the tool-specific part of its execution plan;
//! the shared parts (image, labels, placement, resources) are merged in by
//! the normalizer. Kinds come in two shapes:
//!
//! - [`JobKind`]: one one-shot Job
//! - [`ClientServerKind`]: a server Deployment behind a headless Service,
//!   plus a client Job

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kperf_api::{ClientServerSpec, PodConfigurationSpec, Workload};

use crate::plan::{EnvPlan, MountPlan, NormalizeError, VolumePlan};
use crate::topology::Transport;
use crate::validation::ValidationError;

mod database;
mod http;
mod logging;
mod network;
mod storage;

pub use network::{Ethr, Iperf2, Iperf3, Qperf};

/// Inputs a kind may use while deriving its plan.
#[derive(Debug, Clone, Copy)]
pub struct RecipeContext<'a> {
    /// Name of the benchmark resource.
    pub name: &'a str,

    /// Instant read once for the whole pass.
    pub now: DateTime<Utc>,
}

impl RecipeContext<'_> {
    /// Name of the ConfigMap holding the benchmark's inline files.
    pub fn config_map_name(&self) -> String {
        config_map_name(self.name)
    }
}

/// Name of the ConfigMap holding a benchmark's inline files.
pub fn config_map_name(benchmark_name: &str) -> String {
    format!("{benchmark_name}-files")
}

/// A volume together with its single mount in the benchmark container.
#[derive(Debug, Clone, PartialEq)]
pub struct MountedVolume {
    pub volume: VolumePlan,
    pub mount: MountPlan,
}

/// A preparation step run before the benchmark container.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InitRecipe {
    pub command: Vec<String>,
    pub args: Vec<String>,
}

/// Tool-specific part of a job-only benchmark.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JobRecipe {
    /// Container entrypoint. Empty keeps the image default.
    pub command: Vec<String>,
    pub args: Vec<String>,
    pub env: Vec<EnvPlan>,
    pub volumes: Vec<MountedVolume>,

    /// Inline files materialised as the benchmark's ConfigMap.
    pub config_files: BTreeMap<String, String>,

    /// Runs with the same image and environment as the benchmark container.
    pub init: Option<InitRecipe>,
    pub completions: Option<i32>,
}

/// A benchmark that runs as a single Job.
pub trait JobKind {
    /// Pod configuration of the Job.
    fn pod_config(&self) -> &PodConfigurationSpec;

    /// Semantic checks beyond what the schema enforces.
    fn validate(&self) -> Result<(), ValidationError>;

    /// Derive the tool-specific part of the plan.
    fn recipe(&self, ctx: &RecipeContext<'_>) -> Result<JobRecipe, NormalizeError>;
}

/// A benchmark with a server Deployment and a client Job.
///
/// Protocol flags are derived from the shared [`Transport`] only; kinds
/// never look at `udp` directly when building command lines.
pub trait ClientServerKind {
    fn endpoints(&self) -> &ClientServerSpec;

    /// Semantic checks beyond what the schema enforces.
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Named server ports. The first one is probed for readiness.
    fn ports(&self) -> &'static [(&'static str, i32)];

    /// Transport of the socket the server binds for the first port.
    fn listen_transport(&self, transport: Transport) -> Transport {
        transport
    }

    fn server_command(&self) -> Vec<String>;

    /// Server arguments placed before the user's fragment.
    fn server_args(&self, transport: Transport) -> Vec<String>;

    fn client_command(&self) -> Vec<String>;

    /// Client arguments placed before the user's fragment.
    fn client_args(&self, server: &str, transport: Transport) -> Vec<String>;
}

/// A benchmark kind resolved from its workload block.
pub enum BenchmarkKind<'a> {
    Job(&'a dyn JobKind),
    ClientServer(Box<dyn ClientServerKind + 'a>),
}

impl BenchmarkKind<'_> {
    /// Returns true if the kind runs a server next to its Job.
    pub fn has_server(&self) -> bool {
        matches!(self, BenchmarkKind::ClientServer(_))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            BenchmarkKind::Job(kind) => kind.validate(),
            BenchmarkKind::ClientServer(kind) => kind.validate(),
        }
    }
}

/// Resolve the kind of a workload.
pub fn dispatch(workload: &Workload) -> BenchmarkKind<'_> {
    match workload {
        Workload::Drill(spec) => BenchmarkKind::Job(spec),
        Workload::Fio(spec) => BenchmarkKind::Job(spec),
        Workload::Ioping(spec) => BenchmarkKind::Job(spec),
        Workload::Sysbench(spec) => BenchmarkKind::Job(spec),
        Workload::Pgbench(spec) => BenchmarkKind::Job(spec),
        Workload::OcpLogtest(spec) => BenchmarkKind::Job(spec),
        Workload::Ycsb(spec) => BenchmarkKind::Job(spec),
        Workload::Iperf2(spec) => BenchmarkKind::ClientServer(Box::new(Iperf2(spec))),
        Workload::Iperf3(spec) => BenchmarkKind::ClientServer(Box::new(Iperf3(spec))),
        Workload::Qperf(spec) => BenchmarkKind::ClientServer(Box::new(Qperf(spec))),
        Workload::Ethr(spec) => BenchmarkKind::ClientServer(Box::new(Ethr(spec))),
    }
}

/// Check that a required string field is set.
fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::invalid(field, "must not be empty"));
    }
    Ok(())
}

/// Check that a numeric field is strictly positive.
fn require_positive(field: &'static str, value: i64) -> Result<(), ValidationError> {
    if value <= 0 {
        return Err(ValidationError::invalid(
            field,
            format!("must be positive, got {value}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use kperf_api::{DrillSpec, EthrSpec, IopingSpec};

    use super::*;

    #[test]
    fn test_dispatch_shapes() {
        let drill = Workload::Drill(DrillSpec::default());
        let ioping = Workload::Ioping(IopingSpec::default());
        let iperf3 = Workload::Iperf3(ClientServerSpec::default());
        let ethr = Workload::Ethr(EthrSpec::default());

        assert!(!dispatch(&drill).has_server());
        assert!(!dispatch(&ioping).has_server());
        assert!(dispatch(&iperf3).has_server());
        assert!(dispatch(&ethr).has_server());
    }

    #[test]
    fn test_config_map_name() {
        assert_eq!(config_map_name("http-1"), "http-1-files");
    }
}
