//! Per-tool benchmark configuration.
//!
//! Field names follow the flags of the wrapped tools where possible, so a
//! spec reads close to the command line it produces.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::pod::{PodConfigurationSpec, VolumeSpec};

fn default_completions() -> i32 {
    1
}

fn default_log_extension() -> String {
    ".log".to_string()
}

fn default_log_volume_name() -> String {
    "logs".to_string()
}

fn default_ethr_test() -> String {
    "b".to_string()
}

// =============================================================================
// Job-only kinds
// =============================================================================

/// HTTP load test driven by a drill benchmark file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DrillSpec {
    /// Benchmark files, keyed by file name. Mounted under `/benchmarks`.
    #[serde(default)]
    pub benchmarks_volume: BTreeMap<String, String>,

    /// The key of `benchmarks_volume` to run.
    pub benchmark_file: String,

    /// Override of the container entrypoint.
    #[serde(default)]
    pub command: Vec<String>,

    /// Override of the container arguments.
    #[serde(default)]
    pub args: Vec<String>,

    /// Number of successful runs the Job waits for.
    #[serde(default = "default_completions")]
    pub completions: i32,

    #[serde(default)]
    pub log: Option<LogSpec>,

    #[serde(default)]
    pub pod_config: PodConfigurationSpec,
}

/// Report capture onto a host directory.
///
/// When enabled, the tool writes its report to
/// `<mount_path>/<file_name><timestamp><extension>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogSpec {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_log_volume_name")]
    pub volume_name: String,

    /// Directory on the node receiving the reports.
    pub host_path: String,

    /// Directory inside the container where `host_path` is mounted.
    pub mount_path: String,

    /// File name prefix.
    pub file_name: String,

    #[serde(default = "default_log_extension")]
    pub extension: String,
}

/// Flexible I/O tester.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FioSpec {
    /// Job files shipped inside the image, by path.
    #[serde(default)]
    pub builtin_job_files: Vec<String>,

    /// Inline job file contents.
    #[serde(default)]
    pub custom_job_files: Vec<String>,

    /// Extra fio arguments, shell-quoted.
    #[serde(default)]
    pub cmd_line_args: String,

    /// Volume fio works on. Mounted under `/data`.
    #[serde(default)]
    pub volume: VolumeSpec,

    #[serde(default)]
    pub pod_config: PodConfigurationSpec,
}

/// Disk latency probe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IopingSpec {
    /// Extra ioping arguments, shell-quoted.
    #[serde(default)]
    pub args: String,

    #[serde(default)]
    pub volume: VolumeSpec,

    #[serde(default)]
    pub pod_config: PodConfigurationSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SysbenchSpec {
    /// Sysbench test, e.g. `cpu` or `memory`.
    pub test_name: String,

    /// Options placed before the test name, shell-quoted.
    #[serde(default)]
    pub options: String,

    #[serde(default)]
    pub pod_config: PodConfigurationSpec,
}

/// PostgreSQL benchmark against an existing server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PgbenchSpec {
    pub postgres: PostgresSpec,

    /// Arguments of the initialisation run (`pgbench -i`). Skipped when empty.
    #[serde(default)]
    pub init_args: String,

    /// Arguments of the benchmark run.
    #[serde(default)]
    pub args: String,

    #[serde(default)]
    pub pod_config: PodConfigurationSpec,
}

/// Connection settings of the benchmarked PostgreSQL server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostgresSpec {
    pub host: String,
    pub port: i32,
    pub user: String,

    /// Inline password. Prefer `passwordSecret`; at most one may be set.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_secret: Option<SecretKeyRef>,

    pub database: String,
}

/// One key of a Secret in the benchmark's namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SecretKeyRef {
    pub name: String,
    pub key: String,
}

/// Log-throughput generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OcpLogtestSpec {
    pub line_length: i32,
    pub num_lines: i32,

    /// Lines per minute.
    pub rate: i32,

    /// Repeat one fixed line instead of random content.
    #[serde(default)]
    pub fixed_line: bool,

    #[serde(default)]
    pub pod_config: PodConfigurationSpec,
}

/// Yahoo! Cloud Serving Benchmark.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct YcsbSpec {
    /// Database binding, e.g. `redis` or `mongodb`.
    pub database: String,

    /// Workload file under the image's `workloads/` directory.
    pub workload: String,

    #[serde(default)]
    pub options: YcsbOptions,

    /// Binding properties, passed as `-p key=value`.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    #[serde(default)]
    pub pod_config: PodConfigurationSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct YcsbOptions {
    #[serde(default)]
    pub record_count: Option<i64>,
    #[serde(default)]
    pub operation_count: Option<i64>,
    #[serde(default)]
    pub thread_count: Option<i32>,
    /// Target operations per second.
    #[serde(default)]
    pub target: Option<i32>,
}

// =============================================================================
// Client/server kinds
// =============================================================================

/// Server and client halves of a network benchmark.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientServerSpec {
    #[serde(default)]
    pub server_configuration: EndpointConfiguration,

    #[serde(default)]
    pub client_configuration: EndpointConfiguration,

    /// Measure over UDP instead of TCP.
    #[serde(default)]
    pub udp: bool,
}

/// Configuration of one side of a client/server benchmark.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfiguration {
    #[serde(default)]
    pub pod_configuration_spec: PodConfigurationSpec,

    #[serde(default)]
    pub host_network: bool,

    /// Extra arguments appended to the tool's command line, shell-quoted.
    #[serde(default)]
    pub cmd_line_args: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QperfSpec {
    #[serde(flatten)]
    pub endpoints: ClientServerSpec,

    /// qperf tests to run, e.g. `tcp_bw`, `udp_lat`.
    #[serde(default)]
    pub tests: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EthrSpec {
    #[serde(flatten)]
    pub endpoints: ClientServerSpec,

    /// ethr test type (`-t`).
    #[serde(default = "default_ethr_test")]
    pub test: String,
}

impl Default for EthrSpec {
    fn default() -> Self {
        Self {
            endpoints: ClientServerSpec::default(),
            test: default_ethr_test(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_spec_defaults() {
        let log: LogSpec = serde_json::from_value(serde_json::json!({
            "enabled": true,
            "hostPath": "/var/log/drill",
            "mountPath": "/logs/",
            "fileName": "run"
        }))
        .unwrap();

        assert_eq!(log.volume_name, "logs");
        assert_eq!(log.extension, ".log");
    }

    #[test]
    fn test_flattened_endpoints() {
        let qperf: QperfSpec = serde_json::from_value(serde_json::json!({
            "udp": false,
            "serverConfiguration": {"hostNetwork": true},
            "tests": ["tcp_bw", "tcp_lat"]
        }))
        .unwrap();

        assert!(qperf.endpoints.server_configuration.host_network);
        assert!(!qperf.endpoints.client_configuration.host_network);
        assert_eq!(qperf.tests, vec!["tcp_bw", "tcp_lat"]);

        let ethr: EthrSpec = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(ethr.test, "b");
    }
}
