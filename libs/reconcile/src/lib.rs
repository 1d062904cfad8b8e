//! Reconciliation primitives.
//!
//! This library provides helpers for reconciliation passes that materialize
//! child objects exactly once. Key concepts:
//!
//! - **Create once**: A child is created when absent and never touched again.
//! - **Plan fingerprint**: A stable hash of the derived plan, recorded on
//!   children for inspection only.
//! - **Failure backoff**: Failed passes are retried by the surrounding
//!   scheduler, with a delay that grows per resource.
//!
//! # Invariants
//!
//! - All operations are idempotent
//! - An "already exists" answer is a success, never an error
//! - Decisions are deterministic given the same inputs

use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

/// Result of ensuring a child object exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The object was created by this pass.
    Created,

    /// The object was already present (found, or the create raced and lost).
    AlreadyExisted,
}

impl CreateOutcome {
    /// Returns true if this pass created the object.
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created)
    }
}

/// Create a child object unless it already exists.
///
/// `exists` is consulted first; `create` only runs for an absent object and
/// may itself report [`CreateOutcome::AlreadyExisted`] when a concurrent
/// pass won the race. An existing object is never updated.
pub async fn create_once<E, X, C, F>(exists: X, create: C) -> Result<CreateOutcome, E>
where
    X: Future<Output = Result<bool, E>>,
    C: FnOnce() -> F,
    F: Future<Output = Result<CreateOutcome, E>>,
{
    if exists.await? {
        return Ok(CreateOutcome::AlreadyExisted);
    }
    create().await
}

/// A spec hash for deterministic comparison.
///
/// Recorded on created children so an operator can tell which plan produced
/// them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpecHash(String);

impl SpecHash {
    /// Compute a spec hash from canonical JSON.
    pub fn from_json(json: &serde_json::Value) -> Self {
        let canonical = canonical_json(json);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let result = hasher.finalize();
        Self(format!("sha256-{}", hex::encode(&result[..16]))) // First 16 bytes (128 bits)
    }

    /// Get the hash string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SpecHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Produce canonical JSON (sorted keys, no extra whitespace).
fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let inner: Vec<String> = pairs
                .iter()
                .map(|(k, v)| format!("\"{}\":{}", escape_json_string(k), canonical_json(v)))
                .collect();
            format!("{{{}}}", inner.join(","))
        }
        serde_json::Value::Array(arr) => {
            let inner: Vec<String> = arr.iter().map(canonical_json).collect();
            format!("[{}]", inner.join(","))
        }
        serde_json::Value::String(s) => format!("\"{}\"", escape_json_string(s)),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Null => "null".to_string(),
    }
}

fn escape_json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

/// Exponential backoff bounds for requeueing failed passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay after the first failure.
    pub base: Duration,

    /// Upper bound of the delay.
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            max: DEFAULT_BACKOFF_MAX,
        }
    }
}

impl Backoff {
    /// Delay before the next attempt after `failures` consecutive failures.
    pub fn delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.base
            .saturating_mul(1u32 << exponent)
            .min(self.max)
    }
}

/// Failure tracker for resources whose passes keep failing.
///
/// The tracker never retries anything itself; it only tells the scheduler
/// how long to wait before the next pass.
#[derive(Debug, Clone)]
pub struct FailureTracker {
    backoff: Backoff,

    /// Failures older than this no longer count.
    window: Duration,

    /// Tracked failures: resource_key -> (count, last_failure_time).
    failures: BTreeMap<String, (u32, Instant)>,
}

impl FailureTracker {
    /// Create a new failure tracker.
    pub fn new(backoff: Backoff, window: Duration) -> Self {
        Self {
            backoff,
            window,
            failures: BTreeMap::new(),
        }
    }

    /// Record a failure for a resource and return the requeue delay.
    pub fn record_failure(&mut self, resource_key: &str) -> Duration {
        let now = Instant::now();

        let (count, last) = self
            .failures
            .entry(resource_key.to_string())
            .or_insert((0, now));

        // Reset if the previous failure is outside the window
        if now.duration_since(*last) > self.window {
            *count = 0;
        }

        *count += 1;
        *last = now;
        self.backoff.delay(*count)
    }

    /// Consecutive failures currently recorded for a resource.
    pub fn failures(&self, resource_key: &str) -> u32 {
        self.failures
            .get(resource_key)
            .map(|(count, _)| *count)
            .unwrap_or(0)
    }

    /// Clear failure tracking for a resource (on success).
    pub fn clear(&mut self, resource_key: &str) {
        self.failures.remove(resource_key);
    }

    /// Prune expired entries.
    pub fn prune(&mut self) {
        let now = Instant::now();
        self.failures
            .retain(|_, (_, last)| now.duration_since(*last) <= self.window);
    }
}

/// Default interval between passes while a benchmark is still running.
pub const DEFAULT_REQUEUE_INTERVAL: Duration = Duration::from_secs(30);

/// Default delay after the first failed pass.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(5);

/// Default cap of the failure backoff.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(5 * 60); // 5 minutes

/// Default failure window.
pub const DEFAULT_FAILURE_WINDOW: Duration = Duration::from_secs(30 * 60); // 30 minutes

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_hash_deterministic() {
        let json1 = serde_json::json!({"b": 2, "a": 1});
        let json2 = serde_json::json!({"a": 1, "b": 2});

        let hash1 = SpecHash::from_json(&json1);
        let hash2 = SpecHash::from_json(&json2);

        assert_eq!(hash1, hash2);
        assert!(hash1.as_str().starts_with("sha256-"));
    }

    #[test]
    fn test_spec_hash_is_label_safe() {
        let hash = SpecHash::from_json(&serde_json::json!({"args": ["--udp"]}));
        assert!(hash.as_str().len() <= 63);
        assert!(hash
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let backoff = Backoff {
            base: Duration::from_secs(5),
            max: Duration::from_secs(60),
        };

        assert_eq!(backoff.delay(1), Duration::from_secs(5));
        assert_eq!(backoff.delay(2), Duration::from_secs(10));
        assert_eq!(backoff.delay(3), Duration::from_secs(20));
        assert_eq!(backoff.delay(5), Duration::from_secs(60));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_failure_tracker() {
        let mut tracker = FailureTracker::new(Backoff::default(), Duration::from_secs(60));

        assert_eq!(tracker.record_failure("ns/bench-1"), Duration::from_secs(5));
        assert_eq!(tracker.record_failure("ns/bench-1"), Duration::from_secs(10));
        assert_eq!(tracker.failures("ns/bench-1"), 2);
        assert_eq!(tracker.failures("ns/bench-2"), 0);

        tracker.clear("ns/bench-1");
        assert_eq!(tracker.failures("ns/bench-1"), 0);
        assert_eq!(tracker.record_failure("ns/bench-1"), Duration::from_secs(5));

        tracker.prune();
        assert_eq!(tracker.failures("ns/bench-1"), 1);
    }

    #[tokio::test]
    async fn test_create_once_skips_existing() {
        // The create future would fail; it must never be polled.
        let outcome = create_once(async { Ok::<bool, &str>(true) }, || async {
            Err::<CreateOutcome, &str>("create ran")
        })
        .await;
        assert_eq!(outcome, Ok(CreateOutcome::AlreadyExisted));
    }

    #[tokio::test]
    async fn test_create_once_creates_absent() {
        let outcome = create_once(async { Ok::<bool, &str>(false) }, || async {
            Ok::<CreateOutcome, &str>(CreateOutcome::Created)
        })
        .await;
        assert_eq!(outcome, Ok(CreateOutcome::Created));
    }

    #[tokio::test]
    async fn test_create_once_propagates_errors() {
        let outcome = create_once(async { Err::<bool, &str>("unavailable") }, || async {
            Ok::<CreateOutcome, &str>(CreateOutcome::Created)
        })
        .await;
        assert_eq!(outcome, Err("unavailable"));
    }
}
