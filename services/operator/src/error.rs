//! Errors of a reconciliation pass.

use thiserror::Error;

use crate::builder::BuildError;
use crate::cluster::ClusterError;

/// A pass that did not converge and must be retried.
///
/// Rejected benchmarks are not errors: the rejection is the pass's result.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("benchmark {0} has no namespace")]
    MissingNamespace(String),
}

impl ReconcileError {
    /// Get the standardized reason code for this error.
    pub fn reason_code(&self) -> &'static str {
        match self {
            ReconcileError::Cluster(e) => e.reason_code(),
            ReconcileError::Build(e) => e.reason_code(),
            ReconcileError::MissingNamespace(_) => "missing_namespace",
        }
    }
}
