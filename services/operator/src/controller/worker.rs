//! Watch loop driving the [`Reconciler`].
//!
//! The kube-runtime controller guarantees at most one pass in flight per
//! benchmark and re-triggers a pass whenever one of its children changes.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::NamespaceResourceScope;
use kperf_api::Benchmark;
use kperf_reconcile::{FailureTracker, DEFAULT_FAILURE_WINDOW};
use kube::runtime::controller::Action;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{PassReport, Reconciler};
use crate::clock::SystemClock;
use crate::cluster::KubeCluster;
use crate::config::Config;
use crate::error::ReconcileError;
use crate::labels::APP_LABEL;

/// State shared by every pass.
pub struct Context {
    reconciler: Reconciler,
    failures: Mutex<FailureTracker>,
    requeue_interval: Duration,
}

impl Context {
    pub fn new(reconciler: Reconciler, config: &Config) -> Self {
        Self {
            reconciler,
            failures: Mutex::new(FailureTracker::new(config.backoff, DEFAULT_FAILURE_WINDOW)),
            requeue_interval: config.requeue_interval,
        }
    }

    fn failures(&self) -> MutexGuard<'_, FailureTracker> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scheduling decision after a successful pass.
///
/// Running benchmarks are polled; settled ones wait for a change.
pub fn next_action(report: &PassReport, requeue_interval: Duration) -> Action {
    if report.is_terminal() {
        Action::await_change()
    } else {
        Action::requeue(requeue_interval)
    }
}

fn resource_key(benchmark: &Benchmark) -> String {
    format!(
        "{}/{}",
        benchmark.namespace().unwrap_or_default(),
        benchmark.name_any()
    )
}

async fn reconcile(
    benchmark: Arc<Benchmark>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let report = ctx.reconciler.reconcile(&benchmark).await?;
    ctx.failures().clear(&resource_key(&benchmark));
    Ok(next_action(&report, ctx.requeue_interval))
}

fn error_policy(benchmark: Arc<Benchmark>, error: &ReconcileError, ctx: Arc<Context>) -> Action {
    let key = resource_key(&benchmark);
    let delay = {
        let mut failures = ctx.failures();
        failures.prune();
        failures.record_failure(&key)
    };

    warn!(
        benchmark = %key,
        reason_code = error.reason_code(),
        error = %error,
        retry_in_secs = delay.as_secs(),
        "Reconcile failed, requeueing"
    );
    Action::requeue(delay)
}

fn scoped<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}

fn owned<K>(client: &Client, namespace: Option<&str>) -> (Api<K>, watcher::Config)
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + DeserializeOwned,
{
    (
        scoped(client, namespace),
        watcher::Config::default().labels(APP_LABEL),
    )
}

/// Run the benchmark controller until shutdown.
pub async fn run(client: Client, config: &Config, mut shutdown: watch::Receiver<bool>) {
    let namespace = config.namespace.as_deref();
    info!(
        namespace = namespace.unwrap_or("*"),
        requeue_interval_secs = config.requeue_interval.as_secs(),
        "Starting benchmark controller"
    );

    let cluster = KubeCluster::new(client.clone(), config.field_manager.clone());
    let reconciler = Reconciler::new(Arc::new(cluster), Arc::new(SystemClock));
    let ctx = Arc::new(Context::new(reconciler, config));

    let (jobs, jobs_config) = owned::<Job>(&client, namespace);
    let (deployments, deployments_config) = owned::<Deployment>(&client, namespace);
    let (services, services_config) = owned::<Service>(&client, namespace);
    let (config_maps, config_maps_config) = owned::<ConfigMap>(&client, namespace);

    Controller::new(scoped::<Benchmark>(&client, namespace), watcher::Config::default())
        .owns(jobs, jobs_config)
        .owns(deployments, deployments_config)
        .owns(services, services_config)
        .owns(config_maps, config_maps_config)
        .graceful_shutdown_on(async move {
            let _ = shutdown.changed().await;
        })
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!(benchmark = %object.name, "Pass finished"),
                Err(e) => debug!(error = %e, "Pass did not run"),
            }
        })
        .await;

    info!("Benchmark controller stopped");
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use kperf_api::{BenchmarkSpec, BenchmarkStatus, Outcome, Workload};

    use super::*;
    use crate::cluster::{ClusterError, MockCluster};
    use crate::controller::ReconcileState;

    fn context() -> Arc<Context> {
        let config = Config::from_lookup(|_| None).unwrap();
        let reconciler = Reconciler::new(
            Arc::new(MockCluster::new()),
            Arc::new(crate::clock::FixedClock(Utc::now())),
        );
        Arc::new(Context::new(reconciler, &config))
    }

    fn benchmark() -> Arc<Benchmark> {
        let mut benchmark = Benchmark::new(
            "web-1",
            BenchmarkSpec {
                image: Default::default(),
                workload: Workload::Drill(Default::default()),
            },
        );
        benchmark.metadata.namespace = Some("perf".to_string());
        Arc::new(benchmark)
    }

    fn report(status: BenchmarkStatus) -> PassReport {
        PassReport {
            state: ReconcileState::ClientMaterialized,
            created: Vec::new(),
            status,
        }
    }

    #[test]
    fn test_running_benchmarks_are_polled() {
        let interval = Duration::from_secs(30);
        assert_eq!(
            next_action(&report(BenchmarkStatus::running(None)), interval),
            Action::requeue(interval)
        );
    }

    #[test]
    fn test_settled_benchmarks_wait_for_change() {
        let interval = Duration::from_secs(30);
        assert_eq!(
            next_action(&report(BenchmarkStatus::rejected("bad", None)), interval),
            Action::await_change()
        );
        assert_eq!(
            next_action(
                &report(BenchmarkStatus::finished(Outcome::Fail, None, None)),
                interval
            ),
            Action::await_change()
        );
    }

    #[test]
    fn test_error_policy_backs_off() {
        let ctx = context();
        let error: ReconcileError = ClusterError::Unavailable("down".to_string()).into();

        assert_eq!(
            error_policy(benchmark(), &error, ctx.clone()),
            Action::requeue(Duration::from_secs(5))
        );
        assert_eq!(
            error_policy(benchmark(), &error, ctx.clone()),
            Action::requeue(Duration::from_secs(10))
        );
        assert_eq!(ctx.failures().failures("perf/web-1"), 2);
    }

    #[tokio::test]
    async fn test_success_clears_failures() {
        let ctx = context();
        let error: ReconcileError = ClusterError::Unavailable("down".to_string()).into();
        error_policy(benchmark(), &error, ctx.clone());

        let mut definition = (*benchmark()).clone();
        definition.status = Some(BenchmarkStatus::finished(Outcome::Pass, None, None));
        let action = reconcile(Arc::new(definition), ctx.clone()).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert_eq!(ctx.failures().failures("perf/web-1"), 0);
    }
}
