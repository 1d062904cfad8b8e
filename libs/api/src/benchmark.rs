//! The `Benchmark` custom resource.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::kinds::{
    ClientServerSpec, DrillSpec, EthrSpec, FioSpec, IopingSpec, OcpLogtestSpec, PgbenchSpec,
    QperfSpec, SysbenchSpec, YcsbSpec,
};
use crate::pod::ImageSpec;
use crate::status::BenchmarkStatus;

/// Desired benchmark run.
///
/// Every child object the operator creates for a `Benchmark` carries an
/// owner reference back to it, so deleting the resource removes the whole
/// workload graph.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "perf.kperf.dev",
    version = "v1alpha1",
    kind = "Benchmark",
    doc = "A declarative benchmark run",
    status = "BenchmarkStatus",
    shortname = "bench",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Outcome","type":"string","jsonPath":".status.outcome"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkSpec {
    /// Container image shared by every container of the run.
    pub image: ImageSpec,

    /// Tool-specific configuration. Exactly one block is set.
    pub workload: Workload,
}

/// The closed set of supported benchmark tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Workload {
    Drill(DrillSpec),
    Fio(FioSpec),
    Ioping(IopingSpec),
    Sysbench(SysbenchSpec),
    Pgbench(PgbenchSpec),
    OcpLogtest(OcpLogtestSpec),
    Ycsb(YcsbSpec),
    Iperf2(ClientServerSpec),
    Iperf3(ClientServerSpec),
    Qperf(QperfSpec),
    Ethr(EthrSpec),
}

impl Workload {
    /// Short tool name, used for labels and container names.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Workload::Drill(_) => "drill",
            Workload::Fio(_) => "fio",
            Workload::Ioping(_) => "ioping",
            Workload::Sysbench(_) => "sysbench",
            Workload::Pgbench(_) => "pgbench",
            Workload::OcpLogtest(_) => "ocplogtest",
            Workload::Ycsb(_) => "ycsb",
            Workload::Iperf2(_) => "iperf2",
            Workload::Iperf3(_) => "iperf3",
            Workload::Qperf(_) => "qperf",
            Workload::Ethr(_) => "ethr",
        }
    }
}

impl std::fmt::Display for Workload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workload_is_externally_tagged() {
        let spec: BenchmarkSpec = serde_json::from_value(serde_json::json!({
            "image": {"name": "xridge/drill:0.5.0"},
            "workload": {
                "drill": {
                    "benchmarksVolume": {"a.yml": "base: 'http://example'"},
                    "benchmarkFile": "a.yml"
                }
            }
        }))
        .unwrap();

        assert_eq!(spec.workload.kind_name(), "drill");
        let Workload::Drill(drill) = &spec.workload else {
            panic!("expected drill workload");
        };
        assert_eq!(drill.completions, 1);
        assert!(drill.log.is_none());
    }

    #[test]
    fn test_client_server_defaults_to_tcp() {
        let spec: BenchmarkSpec = serde_json::from_value(serde_json::json!({
            "image": {"name": "xridge/iperf3:3.7.0"},
            "workload": {"iperf3": {}}
        }))
        .unwrap();

        let Workload::Iperf3(iperf3) = &spec.workload else {
            panic!("expected iperf3 workload");
        };
        assert!(!iperf3.udp);
        assert!(iperf3.server_configuration.cmd_line_args.is_empty());
    }

    #[test]
    fn test_crd_metadata() {
        use kube::CustomResourceExt;

        let crd = Benchmark::crd();
        assert_eq!(crd.spec.group, crate::API_GROUP);
        assert_eq!(crd.spec.names.kind, "Benchmark");
        assert_eq!(crd.spec.versions[0].name, crate::API_VERSION);
    }
}
