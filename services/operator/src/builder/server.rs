//! Server Deployment and headless Service of client/server benchmarks.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

use super::{pod, ObjectStamp};
use crate::plan::ExecutionPlan;
use crate::topology::ServerTopology;

/// `clusterIP` of a headless Service.
pub const HEADLESS: &str = "None";

/// Single-replica Deployment running the server.
pub fn deployment(plan: &ExecutionPlan, stamp: &ObjectStamp<'_>) -> Deployment {
    Deployment {
        metadata: stamp.metadata(&plan.name, &plan.labels, &plan.annotations),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(plan.selector.clone()),
                ..Default::default()
            },
            template: pod::template(plan, None),
            ..Default::default()
        }),
        status: None,
    }
}

/// Headless Service resolving the server name to the server pod.
///
/// Carries the server's annotations.
pub fn service(
    topology: &ServerTopology,
    server: &ExecutionPlan,
    stamp: &ObjectStamp<'_>,
) -> Service {
    Service {
        metadata: stamp.metadata(
            &topology.service_name,
            &topology.selector,
            &server.annotations,
        ),
        spec: Some(ServiceSpec {
            cluster_ip: Some(HEADLESS.to_string()),
            selector: Some(topology.selector.clone()),
            ports: Some(
                topology
                    .ports
                    .iter()
                    .map(|port| ServicePort {
                        name: Some(port.name.clone()),
                        port: port.port,
                        protocol: Some(port.transport.protocol().to_string()),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        status: None,
    }
}
