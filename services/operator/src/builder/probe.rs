//! Readiness probing of benchmark servers.
//!
//! Benchmark images are minimal and some servers misbehave when a probe
//! opens a connection, so readiness is read from the kernel's socket tables
//! instead: the probe succeeds once any entry's local address ends in the
//! server port, written as four upper-case hex digits.

use k8s_openapi::api::core::v1::{ExecAction, Probe};

use crate::plan::ProbePlan;

/// awk program exiting 0 iff a socket table lists a local `port`.
pub fn awk_program(port: i32) -> String {
    format!("BEGIN{{err=1}}toupper($2)~/:{port:04X}$/{{err=0}}END{{exit err}}")
}

/// Exec readiness probe for a server container.
pub fn readiness_probe(plan: &ProbePlan) -> Probe {
    let [ipv4, ipv6] = plan.transport.socket_tables();
    Probe {
        exec: Some(ExecAction {
            command: Some(vec![
                "awk".to_string(),
                awk_program(plan.port),
                ipv4.to_string(),
                ipv6.to_string(),
            ]),
        }),
        initial_delay_seconds: Some(plan.initial_delay_seconds),
        timeout_seconds: Some(plan.timeout_seconds),
        period_seconds: Some(plan.period_seconds),
        ..Default::default()
    }
}
