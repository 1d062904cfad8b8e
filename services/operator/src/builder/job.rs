//! Benchmark Jobs.

use k8s_openapi::api::batch::v1::{Job, JobSpec};

use super::{pod, ObjectStamp};
use crate::plan::ExecutionPlan;

/// Pod retries before a Job is marked failed.
pub const BACKOFF_LIMIT: i32 = 6;

/// Job running a job-only benchmark or the client of a client/server one.
pub fn job(plan: &ExecutionPlan, stamp: &ObjectStamp<'_>) -> Job {
    Job {
        metadata: stamp.metadata(&plan.name, &plan.labels, &plan.annotations),
        spec: Some(JobSpec {
            backoff_limit: Some(BACKOFF_LIMIT),
            completions: plan.completions,
            template: pod::template(plan, Some("Never")),
            ..Default::default()
        }),
        status: None,
    }
}
