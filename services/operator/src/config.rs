//! Configuration for the operator.

use std::time::Duration;

use anyhow::{ensure, Result};
use kperf_reconcile::{Backoff, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX, DEFAULT_REQUEUE_INTERVAL};

/// Operator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace to watch. All namespaces when unset.
    pub namespace: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Interval between passes while a benchmark is still running.
    pub requeue_interval: Duration,

    /// Requeue backoff after failed passes.
    pub backoff: Backoff,

    /// Field manager recorded on every create and status patch.
    pub field_manager: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let secs = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        let namespace = lookup("KPERF_NAMESPACE").filter(|s| !s.is_empty());

        let log_level = lookup("KPERF_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let requeue_interval = secs("KPERF_REQUEUE_SECS", DEFAULT_REQUEUE_INTERVAL);

        let backoff = Backoff {
            base: secs("KPERF_BACKOFF_BASE_SECS", DEFAULT_BACKOFF_BASE),
            max: secs("KPERF_BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX),
        };
        ensure!(
            backoff.base <= backoff.max,
            "KPERF_BACKOFF_BASE_SECS must not exceed KPERF_BACKOFF_MAX_SECS"
        );

        let field_manager =
            lookup("KPERF_FIELD_MANAGER").unwrap_or_else(|| "kperf-operator".to_string());

        Ok(Self {
            namespace,
            log_level,
            requeue_interval,
            backoff,
            field_manager,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.namespace, None);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.requeue_interval, Duration::from_secs(30));
        assert_eq!(config.backoff, Backoff::default());
        assert_eq!(config.field_manager, "kperf-operator");
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("KPERF_NAMESPACE", "bench"),
            ("KPERF_REQUEUE_SECS", "10"),
            ("KPERF_BACKOFF_BASE_SECS", "1"),
            ("KPERF_BACKOFF_MAX_SECS", "8"),
        ]))
        .unwrap();
        assert_eq!(config.namespace.as_deref(), Some("bench"));
        assert_eq!(config.requeue_interval, Duration::from_secs(10));
        assert_eq!(config.backoff.delay(5), Duration::from_secs(8));
    }

    #[test]
    fn test_unparsable_values_fall_back() {
        let config = Config::from_lookup(lookup(&[("KPERF_REQUEUE_SECS", "soon")])).unwrap();
        assert_eq!(config.requeue_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_inverted_backoff_is_rejected() {
        let result = Config::from_lookup(lookup(&[
            ("KPERF_BACKOFF_BASE_SECS", "60"),
            ("KPERF_BACKOFF_MAX_SECS", "5"),
        ]));
        assert!(result.is_err());
    }
}
