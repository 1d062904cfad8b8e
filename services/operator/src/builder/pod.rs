//! Pod templates shared by Jobs and Deployments.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EnvVar, EnvVarSource, LocalObjectReference,
    PodSpec, PodTemplateSpec, SecretKeySelector, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::probe;
use crate::plan::{ContainerPlan, EnvPlan, EnvSource, ExecutionPlan, VolumePlan, VolumeSource};

/// `None` for an empty list, so unset fields stay unset.
pub(crate) fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}

/// `None` for an empty map.
pub(crate) fn non_empty_map(map: &BTreeMap<String, String>) -> Option<BTreeMap<String, String>> {
    (!map.is_empty()).then(|| map.clone())
}

fn env_var(env: &EnvPlan) -> EnvVar {
    match &env.source {
        EnvSource::Value(value) => EnvVar {
            name: env.name.clone(),
            value: Some(value.clone()),
            ..Default::default()
        },
        EnvSource::Secret { name, key } => EnvVar {
            name: env.name.clone(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: name.clone(),
                    key: key.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
    }
}

fn container(plan: &ContainerPlan) -> Container {
    Container {
        name: plan.name.clone(),
        image: Some(plan.image.clone()),
        image_pull_policy: plan.pull_policy.map(|policy| policy.as_str().to_string()),
        command: non_empty(plan.command.clone()),
        args: non_empty(plan.args.clone()),
        env: non_empty(plan.env.iter().map(env_var).collect()),
        ports: non_empty(
            plan.ports
                .iter()
                .map(|port| ContainerPort {
                    name: Some(port.name.clone()),
                    container_port: port.port,
                    protocol: Some(port.transport.protocol().to_string()),
                    ..Default::default()
                })
                .collect::<Vec<_>>(),
        ),
        volume_mounts: non_empty(
            plan.mounts
                .iter()
                .map(|mount| VolumeMount {
                    name: mount.volume.clone(),
                    mount_path: mount.path.clone(),
                    read_only: mount.read_only.then_some(true),
                    ..Default::default()
                })
                .collect::<Vec<_>>(),
        ),
        resources: plan.resources.clone(),
        readiness_probe: plan.readiness.as_ref().map(probe::readiness_probe),
        ..Default::default()
    }
}

fn volume(plan: &VolumePlan) -> Volume {
    let mut volume = Volume {
        name: plan.name.clone(),
        ..Default::default()
    };
    match &plan.source {
        VolumeSource::ConfigMap { name } => {
            volume.config_map = Some(ConfigMapVolumeSource {
                name: name.clone(),
                ..Default::default()
            });
        }
        VolumeSource::HostPath(source) => volume.host_path = Some(source.clone()),
        VolumeSource::EmptyDir(source) => volume.empty_dir = Some(source.clone()),
        VolumeSource::PersistentVolumeClaim(source) => {
            volume.persistent_volume_claim = Some(source.clone())
        }
    }
    volume
}

/// Pod template of a plan.
pub fn template(plan: &ExecutionPlan, restart_policy: Option<&str>) -> PodTemplateSpec {
    let placement = &plan.placement;
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(plan.labels.clone()),
            annotations: non_empty_map(&plan.annotations),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers: vec![container(&plan.container)],
            init_containers: plan.init_container.as_ref().map(|init| vec![container(init)]),
            volumes: non_empty(plan.volumes.iter().map(volume).collect::<Vec<_>>()),
            image_pull_secrets: plan
                .pull_secret
                .as_ref()
                .map(|name| vec![LocalObjectReference { name: name.clone() }]),
            restart_policy: restart_policy.map(str::to_string),
            affinity: placement.affinity.clone(),
            tolerations: non_empty(placement.tolerations.clone()),
            node_selector: non_empty_map(&placement.node_selector),
            node_name: placement.node_name.clone(),
            host_network: placement.host_network.then_some(true),
            ..Default::default()
        }),
    }
}
