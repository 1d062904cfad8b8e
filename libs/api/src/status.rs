//! Status written back onto a `Benchmark`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Observed state of a benchmark run.
///
/// `outcome` and `message` are copied from the terminal condition of the
/// benchmark Job; nothing else flows back from the children.
///
/// Unset fields serialize as `null` so a merge patch clears them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkStatus {
    #[serde(default)]
    pub phase: Option<BenchmarkPhase>,

    #[serde(default)]
    pub outcome: Option<Outcome>,

    /// Job condition message, or the rejection reason.
    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub observed_generation: Option<i64>,
}

impl BenchmarkStatus {
    pub fn rejected(reason: impl Into<String>, generation: Option<i64>) -> Self {
        Self {
            phase: Some(BenchmarkPhase::Rejected),
            outcome: None,
            message: Some(reason.into()),
            observed_generation: generation,
        }
    }

    pub fn running(generation: Option<i64>) -> Self {
        Self {
            phase: Some(BenchmarkPhase::Running),
            outcome: None,
            message: None,
            observed_generation: generation,
        }
    }

    pub fn finished(outcome: Outcome, message: Option<String>, generation: Option<i64>) -> Self {
        Self {
            phase: Some(BenchmarkPhase::Completed),
            outcome: Some(outcome),
            message,
            observed_generation: generation,
        }
    }

    /// Returns true once the run can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.phase,
            Some(BenchmarkPhase::Completed) | Some(BenchmarkPhase::Rejected)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum BenchmarkPhase {
    Running,
    Completed,
    Rejected,
}

/// Terminal result of the benchmark Job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Outcome {
    Pass,
    Fail,
}
