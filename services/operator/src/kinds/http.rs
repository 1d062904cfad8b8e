//! HTTP load testing with drill.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::HostPathVolumeSource;
use kperf_api::{DrillSpec, LogSpec, PodConfigurationSpec};

use super::{require, require_positive, JobKind, JobRecipe, MountedVolume, RecipeContext};
use crate::plan::{MountPlan, NormalizeError, VolumePlan, VolumeSource};
use crate::validation::{validate_config_key, ValidationError};

/// Mount point of the benchmark files.
pub const BENCHMARKS_DIR: &str = "/benchmarks";

/// Volume holding the benchmark files.
pub const BENCHMARKS_VOLUME: &str = "benchmarks";

/// Timestamp embedded in report file names.
const REPORT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Path of the report written by a run started at `now`.
///
/// The parts are concatenated as given: `/logs/` + `run` + timestamp +
/// `.log` yields `/logs/run2024-03-01_12-30-45.log`.
pub fn report_path(log: &LogSpec, now: DateTime<Utc>) -> String {
    format!(
        "{}{}{}{}",
        log.mount_path,
        log.file_name,
        now.format(REPORT_TIMESTAMP_FORMAT),
        log.extension
    )
}

fn enabled_log(spec: &DrillSpec) -> Option<&LogSpec> {
    spec.log.as_ref().filter(|log| log.enabled)
}

impl JobKind for DrillSpec {
    fn pod_config(&self) -> &PodConfigurationSpec {
        &self.pod_config
    }

    fn validate(&self) -> Result<(), ValidationError> {
        for key in self.benchmarks_volume.keys() {
            validate_config_key("benchmarksVolume", key)?;
        }

        if !self.benchmarks_volume.contains_key(&self.benchmark_file) {
            let available: Vec<&str> = self.benchmarks_volume.keys().map(String::as_str).collect();
            return Err(ValidationError::MissingKey {
                field: "benchmarkFile",
                key: self.benchmark_file.clone(),
                source_field: "benchmarksVolume",
                available: available.join(", "),
            });
        }

        require_positive("completions", self.completions.into())?;

        if let Some(log) = enabled_log(self) {
            require("log.volumeName", &log.volume_name)?;
            if log.volume_name == BENCHMARKS_VOLUME {
                return Err(ValidationError::invalid(
                    "log.volumeName",
                    format!("must differ from the {BENCHMARKS_VOLUME:?} volume"),
                ));
            }
            require("log.hostPath", &log.host_path)?;
            require("log.mountPath", &log.mount_path)?;
            require("log.fileName", &log.file_name)?;
            if log.mount_path.trim_end_matches('/') == BENCHMARKS_DIR {
                return Err(ValidationError::invalid(
                    "log.mountPath",
                    format!("must differ from {BENCHMARKS_DIR}"),
                ));
            }
        }

        Ok(())
    }

    fn recipe(&self, ctx: &RecipeContext<'_>) -> Result<JobRecipe, NormalizeError> {
        let command = if self.command.is_empty() {
            vec!["drill".to_string()]
        } else {
            self.command.clone()
        };

        let mut args = if self.args.is_empty() {
            vec![
                "--benchmark".to_string(),
                format!("{BENCHMARKS_DIR}/{}", self.benchmark_file),
                "--stats".to_string(),
            ]
        } else {
            self.args.clone()
        };

        let mut volumes = vec![MountedVolume {
            volume: VolumePlan {
                name: BENCHMARKS_VOLUME.to_string(),
                source: VolumeSource::ConfigMap {
                    name: ctx.config_map_name(),
                },
            },
            mount: MountPlan {
                volume: BENCHMARKS_VOLUME.to_string(),
                path: BENCHMARKS_DIR.to_string(),
                read_only: true,
            },
        }];

        if let Some(log) = enabled_log(self) {
            args.push("--report".to_string());
            args.push(report_path(log, ctx.now));

            volumes.push(MountedVolume {
                volume: VolumePlan {
                    name: log.volume_name.clone(),
                    source: VolumeSource::HostPath(HostPathVolumeSource {
                        path: log.host_path.clone(),
                        ..Default::default()
                    }),
                },
                mount: MountPlan {
                    volume: log.volume_name.clone(),
                    path: log.mount_path.clone(),
                    read_only: false,
                },
            });
        }

        Ok(JobRecipe {
            command,
            args,
            volumes,
            config_files: self.benchmarks_volume.clone(),
            completions: Some(self.completions),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::TimeZone;

    use super::*;

    fn drill(file: &str) -> DrillSpec {
        DrillSpec {
            benchmarks_volume: BTreeMap::from([
                ("a.conf".to_string(), "base: 'http://a'".to_string()),
                ("b.conf".to_string(), "base: 'http://b'".to_string()),
            ]),
            benchmark_file: file.to_string(),
            completions: 1,
            ..Default::default()
        }
    }

    fn log() -> LogSpec {
        LogSpec {
            enabled: true,
            volume_name: "logs".to_string(),
            host_path: "/var/log/drill".to_string(),
            mount_path: "/logs/".to_string(),
            file_name: "run".to_string(),
            extension: ".log".to_string(),
        }
    }

    fn ctx() -> RecipeContext<'static> {
        RecipeContext {
            name: "http-1",
            now: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap(),
        }
    }

    #[test]
    fn test_benchmark_file_must_exist() {
        assert!(drill("a.conf").validate().is_ok());

        let err = drill("c.conf").validate().unwrap_err();
        let reason = err.to_string();
        assert!(reason.contains("\"c.conf\""), "{reason}");
        assert!(reason.contains("a.conf, b.conf"), "{reason}");
        assert_eq!(err.reason_code(), "missing_key");
    }

    #[test]
    fn test_benchmark_keys_must_be_config_map_keys() {
        let mut spec = drill("a.conf");
        spec.benchmarks_volume.insert(
            "dir/a conf".to_string(),
            "base: 'http://c'".to_string(),
        );

        let err = spec.validate().unwrap_err();
        assert_eq!(err.reason_code(), "invalid_field");
        assert!(err.to_string().contains("\"dir/a conf\""), "{err}");
    }

    #[test]
    fn test_log_volume_must_not_shadow_benchmarks() {
        let mut spec = drill("a.conf");
        spec.log = Some(LogSpec {
            volume_name: BENCHMARKS_VOLUME.to_string(),
            ..log()
        });
        assert!(spec.validate().is_err());

        // Disabled log settings are not checked
        spec.log = Some(LogSpec {
            enabled: false,
            volume_name: String::new(),
            ..log()
        });
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_report_path() {
        assert_eq!(
            report_path(&log(), ctx().now),
            "/logs/run2024-03-01_12-30-45.log"
        );
    }

    #[test]
    fn test_recipe_defaults() {
        let recipe = drill("b.conf").recipe(&ctx()).unwrap();
        assert_eq!(recipe.command, vec!["drill"]);
        assert_eq!(recipe.args, vec!["--benchmark", "/benchmarks/b.conf", "--stats"]);
        assert_eq!(recipe.volumes.len(), 1);
        assert_eq!(
            recipe.volumes[0].volume.source,
            VolumeSource::ConfigMap {
                name: "http-1-files".to_string()
            }
        );
        assert_eq!(recipe.config_files.len(), 2);
        assert_eq!(recipe.completions, Some(1));
    }

    #[test]
    fn test_log_capture_is_additive() {
        let mut spec = drill("a.conf");
        spec.args = vec!["--benchmark".to_string(), "/benchmarks/a.conf".to_string()];
        spec.log = Some(log());

        let recipe = spec.recipe(&ctx()).unwrap();
        assert_eq!(
            recipe.args,
            vec![
                "--benchmark",
                "/benchmarks/a.conf",
                "--report",
                "/logs/run2024-03-01_12-30-45.log"
            ]
        );

        let log_volume = &recipe.volumes[1];
        assert_eq!(log_volume.volume.name, "logs");
        assert_eq!(log_volume.mount.volume, "logs");
        assert_eq!(log_volume.mount.path, "/logs/");
        assert!(matches!(
            &log_volume.volume.source,
            VolumeSource::HostPath(source) if source.path == "/var/log/drill"
        ));
    }
}
