//! Cluster access.
//!
//! The controller only ever creates children, reads its Job and writes the
//! benchmark's status. [`ClusterClient`] is that surface; [`KubeCluster`]
//! implements it over the Kubernetes API and [`MockCluster`] in memory.

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use kperf_api::{Benchmark, BenchmarkStatus, Outcome};
use kperf_reconcile::CreateOutcome;
use thiserror::Error;

use crate::builder::{ChildKind, ChildObject};

mod kube_cluster;
mod mock;

pub use kube_cluster::KubeCluster;
pub use mock::MockCluster;

/// Errors talking to the cluster. Always transient from the controller's
/// point of view.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    #[error("cluster unavailable: {0}")]
    Unavailable(String),
}

impl ClusterError {
    /// Get the standardized reason code for this error.
    pub fn reason_code(&self) -> &'static str {
        match self {
            ClusterError::Api(_) => "api_error",
            ClusterError::Unavailable(_) => "cluster_unavailable",
        }
    }
}

/// Terminal state of a benchmark Job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCompletion {
    pub outcome: Outcome,

    /// Message of the terminal condition.
    pub message: Option<String>,
}

/// Read the terminal state of a Job from its `Complete`/`Failed` conditions.
///
/// Returns `None` while the Job is still running.
pub fn job_completion(job: &Job) -> Option<JobCompletion> {
    let conditions = job.status.as_ref()?.conditions.as_ref()?;
    conditions
        .iter()
        .filter(|condition| condition.status == "True")
        .find_map(|condition| {
            let outcome = match condition.type_.as_str() {
                "Complete" => Outcome::Pass,
                "Failed" => Outcome::Fail,
                _ => return None,
            };
            Some(JobCompletion {
                outcome,
                message: condition.message.clone(),
            })
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSeverity {
    Normal,
    Warning,
}

/// Event recorded on a benchmark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkEvent {
    pub severity: EventSeverity,

    /// CamelCase reason, e.g. `CreatedJob`.
    pub reason: String,
    pub note: String,
}

impl BenchmarkEvent {
    pub fn normal(reason: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            severity: EventSeverity::Normal,
            reason: reason.into(),
            note: note.into(),
        }
    }

    pub fn warning(reason: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            severity: EventSeverity::Warning,
            reason: reason.into(),
            note: note.into(),
        }
    }
}

/// Cluster operations used by the controller.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Check whether a child object exists.
    async fn child_exists(
        &self,
        namespace: &str,
        kind: ChildKind,
        name: &str,
    ) -> Result<bool, ClusterError>;

    /// Create a child object. An already existing object is not an error.
    async fn create_child(
        &self,
        namespace: &str,
        child: &ChildObject,
    ) -> Result<CreateOutcome, ClusterError>;

    /// Fetch a Job.
    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>, ClusterError>;

    /// Replace the status of a benchmark.
    async fn update_status(
        &self,
        benchmark: &Benchmark,
        status: &BenchmarkStatus,
    ) -> Result<(), ClusterError>;

    /// Record an event on a benchmark.
    async fn record_event(
        &self,
        benchmark: &Benchmark,
        event: &BenchmarkEvent,
    ) -> Result<(), ClusterError>;
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::batch::v1::{JobCondition, JobStatus};

    use super::*;

    fn job_with(conditions: Vec<(&str, &str, Option<&str>)>) -> Job {
        Job {
            status: Some(JobStatus {
                conditions: Some(
                    conditions
                        .into_iter()
                        .map(|(type_, status, message)| JobCondition {
                            type_: type_.to_string(),
                            status: status.to_string(),
                            message: message.map(str::to_string),
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_running_job_has_no_completion() {
        assert_eq!(job_completion(&Job::default()), None);
        assert_eq!(
            job_completion(&job_with(vec![("Suspended", "True", None)])),
            None
        );
        assert_eq!(
            job_completion(&job_with(vec![("Complete", "False", None)])),
            None
        );
    }

    #[test]
    fn test_complete_condition() {
        let completion = job_completion(&job_with(vec![("Complete", "True", None)])).unwrap();
        assert_eq!(completion.outcome, Outcome::Pass);
        assert_eq!(completion.message, None);
    }

    #[test]
    fn test_failed_condition_carries_message() {
        let job = job_with(vec![
            ("FailureTarget", "True", None),
            ("Failed", "True", Some("Job has reached the specified backoff limit")),
        ]);
        let completion = job_completion(&job).unwrap();
        assert_eq!(completion.outcome, Outcome::Fail);
        assert_eq!(
            completion.message.as_deref(),
            Some("Job has reached the specified backoff limit")
        );
    }

    #[test]
    fn test_reason_codes() {
        let err = ClusterError::Unavailable("connection refused".to_string());
        assert_eq!(err.reason_code(), "cluster_unavailable");
    }
}
