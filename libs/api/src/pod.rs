//! Pod-level configuration shared by every benchmark kind.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Affinity, EmptyDirVolumeSource, HostPathVolumeSource, PersistentVolumeClaimVolumeSource,
    ResourceRequirements, Toleration,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Container image reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    /// Image name, including registry and tag.
    pub name: String,

    /// Pull policy. The cluster default applies when unset.
    #[serde(default)]
    pub pull_policy: Option<PullPolicy>,

    /// Name of a secret used to pull the image.
    #[serde(default)]
    pub pull_secret: Option<String>,
}

/// Image pull policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum PullPolicy {
    Always,
    IfNotPresent,
    Never,
}

impl PullPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PullPolicy::Always => "Always",
            PullPolicy::IfNotPresent => "IfNotPresent",
            PullPolicy::Never => "Never",
        }
    }
}

impl std::fmt::Display for PullPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Labels, annotations, resources and scheduling applied to a benchmark pod.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodConfigurationSpec {
    /// Extra labels added to the pod template.
    #[serde(default)]
    pub pod_labels: BTreeMap<String, String>,

    /// Annotations added to the created object and its pod template.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    #[serde(default)]
    pub pod_scheduling: PodSchedulingSpec,

    /// Resource requests and limits of the benchmark container.
    #[serde(default)]
    pub resources: Option<ResourceRequirements>,
}

/// Scheduling constraints, copied verbatim into the pod spec.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodSchedulingSpec {
    #[serde(default)]
    pub affinity: Option<Affinity>,

    #[serde(default)]
    pub tolerations: Vec<Toleration>,

    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,

    /// Pin the pod to a node, bypassing the scheduler.
    #[serde(default)]
    pub node_name: Option<String>,
}

/// Volume backing a benchmark's data directory.
///
/// At most one source may be set. An empty spec means an `emptyDir`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSpec {
    #[serde(default)]
    pub empty_dir: Option<EmptyDirVolumeSource>,

    #[serde(default)]
    pub host_path: Option<HostPathVolumeSource>,

    #[serde(default)]
    pub persistent_volume_claim: Option<PersistentVolumeClaimVolumeSource>,
}

impl VolumeSpec {
    /// Number of volume sources set on this spec.
    pub fn source_count(&self) -> usize {
        [
            self.empty_dir.is_some(),
            self.host_path.is_some(),
            self.persistent_volume_claim.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_source_count() {
        assert_eq!(VolumeSpec::default().source_count(), 0);

        let both = VolumeSpec {
            empty_dir: Some(EmptyDirVolumeSource::default()),
            host_path: Some(HostPathVolumeSource {
                path: "/mnt/data".to_string(),
                ..Default::default()
            }),
            persistent_volume_claim: None,
        };
        assert_eq!(both.source_count(), 2);
    }

    #[test]
    fn test_pull_policy_serde() {
        let image: ImageSpec = serde_json::from_value(serde_json::json!({
            "name": "xridge/fio:3.13",
            "pullPolicy": "IfNotPresent"
        }))
        .unwrap();
        assert_eq!(image.pull_policy, Some(PullPolicy::IfNotPresent));
        assert_eq!(image.pull_policy.unwrap().to_string(), "IfNotPresent");
    }
}
