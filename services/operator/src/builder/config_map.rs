//! ConfigMap carrying a benchmark's inline files.

use k8s_openapi::api::core::v1::ConfigMap;

use super::ObjectStamp;
use crate::plan::{ConfigFiles, ExecutionPlan};

/// ConfigMap mounted by the pods of `plan`.
pub fn config_map(
    files: &ConfigFiles,
    plan: &ExecutionPlan,
    stamp: &ObjectStamp<'_>,
) -> ConfigMap {
    ConfigMap {
        metadata: stamp.metadata(&files.name, &plan.selector, &Default::default()),
        data: Some(files.data.clone()),
        ..Default::default()
    }
}
