//! Storage benchmarks: fio and ioping.

use std::collections::BTreeMap;

use kperf_api::{FioSpec, IopingSpec, PodConfigurationSpec, VolumeSpec};

use super::{JobKind, JobRecipe, MountedVolume, RecipeContext};
use crate::plan::{split_args, MountPlan, NormalizeError, VolumePlan, VolumeSource};
use crate::validation::ValidationError;

/// Mount point of the volume under test.
pub const DATA_DIR: &str = "/data";
const DATA_VOLUME: &str = "data";

/// Mount point of inline fio job files.
pub const JOBS_DIR: &str = "/jobs";
const JOBS_VOLUME: &str = "jobs";

fn validate_volume(volume: &VolumeSpec) -> Result<(), ValidationError> {
    if volume.source_count() > 1 {
        return Err(ValidationError::invalid(
            "volume",
            "must set at most one of emptyDir, hostPath, persistentVolumeClaim",
        ));
    }
    Ok(())
}

fn data_volume(volume: &VolumeSpec) -> MountedVolume {
    MountedVolume {
        volume: VolumePlan {
            name: DATA_VOLUME.to_string(),
            source: VolumeSource::from_spec(volume),
        },
        mount: MountPlan {
            volume: DATA_VOLUME.to_string(),
            path: DATA_DIR.to_string(),
            read_only: false,
        },
    }
}

/// Key of the `index`th inline job file.
fn custom_job_key(index: usize) -> String {
    format!("job-{index}.fio")
}

impl JobKind for FioSpec {
    fn pod_config(&self) -> &PodConfigurationSpec {
        &self.pod_config
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.builtin_job_files.is_empty() && self.custom_job_files.is_empty() {
            return Err(ValidationError::invalid(
                "builtinJobFiles",
                "or customJobFiles must name at least one job file",
            ));
        }
        validate_volume(&self.volume)
    }

    fn recipe(&self, ctx: &RecipeContext<'_>) -> Result<JobRecipe, NormalizeError> {
        let mut args = split_args("fio.cmdLineArgs", &self.cmd_line_args)?;
        args.push(format!("--directory={DATA_DIR}"));
        args.extend(self.builtin_job_files.iter().cloned());

        let config_files: BTreeMap<String, String> = self
            .custom_job_files
            .iter()
            .enumerate()
            .map(|(index, content)| (custom_job_key(index), content.clone()))
            .collect();
        // Declaration order, not key order
        args.extend(
            (0..self.custom_job_files.len()).map(|index| format!("{JOBS_DIR}/{}", custom_job_key(index))),
        );

        let mut volumes = vec![data_volume(&self.volume)];
        if !config_files.is_empty() {
            volumes.push(MountedVolume {
                volume: VolumePlan {
                    name: JOBS_VOLUME.to_string(),
                    source: VolumeSource::ConfigMap {
                        name: ctx.config_map_name(),
                    },
                },
                mount: MountPlan {
                    volume: JOBS_VOLUME.to_string(),
                    path: JOBS_DIR.to_string(),
                    read_only: true,
                },
            });
        }

        Ok(JobRecipe {
            command: vec!["fio".to_string()],
            args,
            volumes,
            config_files,
            ..Default::default()
        })
    }
}

impl JobKind for IopingSpec {
    fn pod_config(&self) -> &PodConfigurationSpec {
        &self.pod_config
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_volume(&self.volume)
    }

    fn recipe(&self, _ctx: &RecipeContext<'_>) -> Result<JobRecipe, NormalizeError> {
        let mut args = split_args("ioping.args", &self.args)?;
        args.push(DATA_DIR.to_string());

        Ok(JobRecipe {
            command: vec!["ioping".to_string()],
            args,
            volumes: vec![data_volume(&self.volume)],
            ..Default::default()
        })
    }
}
