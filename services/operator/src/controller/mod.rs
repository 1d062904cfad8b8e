//! Reconciliation of `Benchmark` resources.
//!
//! A pass walks one benchmark through
//! `Unvalidated -> Validated -> [ServerMaterializing ->] ClientMaterialized -> Observed`,
//! stopping at `Rejected` when the definition is invalid. Children are only
//! ever created, never updated or deleted: a pass that fails halfway leaves
//! what it created in place and the next pass picks up from there.

use std::sync::Arc;

use kperf_api::{Benchmark, BenchmarkPhase, BenchmarkStatus, Outcome};
use kperf_reconcile::create_once;
use kube::ResourceExt;
use tracing::{debug, error, info, instrument, warn};

use crate::builder::{self, ChildKind};
use crate::clock::Clock;
use crate::cluster::{job_completion, BenchmarkEvent, ClusterClient};
use crate::error::ReconcileError;
use crate::plan;
use crate::validation;

pub mod worker;

/// Where a pass left a benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    Unvalidated,
    Rejected,
    Validated,
    ServerMaterializing,
    ClientMaterialized,
    Observed,
}

/// Result of one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    pub state: ReconcileState,

    /// Children created by this pass, in creation order.
    pub created: Vec<(ChildKind, String)>,

    /// Status of the benchmark after the pass.
    pub status: BenchmarkStatus,
}

impl PassReport {
    /// Returns true if further passes cannot change anything.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Drives benchmarks towards their workload graph.
pub struct Reconciler {
    cluster: Arc<dyn ClusterClient>,
    clock: Arc<dyn Clock>,
}

impl Reconciler {
    pub fn new(cluster: Arc<dyn ClusterClient>, clock: Arc<dyn Clock>) -> Self {
        Self { cluster, clock }
    }

    /// Run one pass over `benchmark`.
    #[instrument(
        skip_all,
        fields(benchmark = %benchmark.name_any(), kind = %benchmark.spec.workload)
    )]
    pub async fn reconcile(&self, benchmark: &Benchmark) -> Result<PassReport, ReconcileError> {
        let generation = benchmark.metadata.generation;
        let current = benchmark.status.clone().unwrap_or_default();

        if let Some(state) = settled(&current, generation) {
            debug!(?state, "Benchmark settled, nothing to do");
            return Ok(PassReport {
                state,
                created: Vec::new(),
                status: current,
            });
        }

        let namespace = benchmark
            .namespace()
            .ok_or_else(|| ReconcileError::MissingNamespace(benchmark.name_any()))?;
        let now = self.clock.now();

        if let Err(e) = validation::validate(benchmark) {
            return self
                .reject(benchmark, &current, e.reason_code(), e.to_string())
                .await;
        }
        let plan = match plan::normalize(benchmark, now) {
            Ok(plan) => plan,
            Err(e) => {
                return self
                    .reject(benchmark, &current, e.reason_code(), e.to_string())
                    .await;
            }
        };
        let objects = builder::build(&plan, benchmark).inspect_err(|e| {
            error!(reason_code = e.reason_code(), error = %e, "Failed to build workload");
        })?;

        let mut state = ReconcileState::Validated;
        let mut created = Vec::new();
        for child in objects.in_creation_order() {
            let kind = child.kind();
            let name = child.name();
            let outcome = create_once(
                self.cluster.child_exists(&namespace, kind, name),
                || self.cluster.create_child(&namespace, &child),
            )
            .await
            .inspect_err(|e| {
                warn!(
                    %kind,
                    child = name,
                    reason_code = e.reason_code(),
                    error = %e,
                    "Failed to ensure child"
                );
            })?;

            if outcome.is_created() {
                info!(%kind, child = name, "Created child");
                let note = format!("Created {kind} {name}");
                self.emit(benchmark, BenchmarkEvent::normal(format!("Created{kind}"), note))
                    .await;
                created.push((kind, name.to_string()));
            }

            state = match kind {
                ChildKind::Deployment => ReconcileState::ServerMaterializing,
                ChildKind::Job => ReconcileState::ClientMaterialized,
                _ => state,
            };
        }

        let job = self.cluster.get_job(&namespace, &plan.job().name).await?;
        let completion = job.as_ref().and_then(job_completion);
        let status = match &completion {
            Some(completion) => {
                state = ReconcileState::Observed;
                let message = completion.message.clone();
                BenchmarkStatus::finished(completion.outcome, message, generation)
            }
            None => BenchmarkStatus::running(generation),
        };

        if status != current {
            self.cluster.update_status(benchmark, &status).await?;
            if let Some(completion) = completion {
                info!(outcome = ?completion.outcome, "Benchmark finished");
                self.emit(benchmark, finished_event(completion.outcome, completion.message))
                    .await;
            }
        }

        Ok(PassReport {
            state,
            created,
            status,
        })
    }

    async fn reject(
        &self,
        benchmark: &Benchmark,
        current: &BenchmarkStatus,
        reason_code: &'static str,
        reason: String,
    ) -> Result<PassReport, ReconcileError> {
        warn!(reason_code, %reason, "Benchmark rejected");

        let status = BenchmarkStatus::rejected(reason.clone(), benchmark.metadata.generation);
        if status != *current {
            self.cluster.update_status(benchmark, &status).await?;
            self.emit(benchmark, BenchmarkEvent::warning("ValidationFailed", reason))
                .await;
        }

        Ok(PassReport {
            state: ReconcileState::Rejected,
            created: Vec::new(),
            status,
        })
    }

    async fn emit(&self, benchmark: &Benchmark, event: BenchmarkEvent) {
        if let Err(e) = self.cluster.record_event(benchmark, &event).await {
            warn!(reason = %event.reason, error = %e, "Failed to record event");
        }
    }
}

/// State of a benchmark no pass can move any more.
///
/// A rejection only sticks for the generation it was made against; an
/// edited definition is validated again.
fn settled(status: &BenchmarkStatus, generation: Option<i64>) -> Option<ReconcileState> {
    match status.phase {
        Some(BenchmarkPhase::Completed) => Some(ReconcileState::Observed),
        Some(BenchmarkPhase::Rejected) if status.observed_generation == generation => {
            Some(ReconcileState::Rejected)
        }
        _ => None,
    }
}

fn finished_event(outcome: Outcome, message: Option<String>) -> BenchmarkEvent {
    match outcome {
        Outcome::Pass => BenchmarkEvent::normal(
            "BenchmarkFinished",
            message.unwrap_or_else(|| "Benchmark job completed".to_string()),
        ),
        Outcome::Fail => BenchmarkEvent::warning(
            "BenchmarkFinished",
            message.unwrap_or_else(|| "Benchmark job failed".to_string()),
        ),
    }
}
