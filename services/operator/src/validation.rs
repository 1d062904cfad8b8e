//! Semantic validation of benchmark resources.
//!
//! Runs before anything touches the cluster. A rejected benchmark gets no
//! children at all.

use kperf_api::Benchmark;
use kube::ResourceExt;
use thiserror::Error;

use crate::kinds;

/// Longest name accepted for a Service.
const MAX_NAME_LEN: usize = 63;

/// Longest key accepted in ConfigMap data.
const MAX_CONFIG_KEY_LEN: usize = 253;

/// Reasons a benchmark is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The shared image has no name.
    #[error("image.name must not be empty")]
    EmptyImage,

    /// The resource name cannot be used as a Service name.
    #[error("name {name:?} is not a valid DNS-1035 label: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// A key selection does not resolve inside its source mapping.
    #[error("{field} {key:?} does not exist in {source_field} (available: {available})")]
    MissingKey {
        field: &'static str,
        key: String,
        source_field: &'static str,
        available: String,
    },

    /// A field violates a kind-specific constraint.
    #[error("{field} {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ValidationError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ValidationError::Invalid {
            field,
            reason: reason.into(),
        }
    }

    /// Get the standardized reason code for this error.
    pub fn reason_code(&self) -> &'static str {
        match self {
            ValidationError::EmptyImage => "empty_image",
            ValidationError::InvalidName { .. } => "invalid_name",
            ValidationError::MissingKey { .. } => "missing_key",
            ValidationError::Invalid { .. } => "invalid_field",
        }
    }
}

/// Validate a benchmark: shared checks first, then the kind's predicate.
pub fn validate(benchmark: &Benchmark) -> Result<(), ValidationError> {
    validate_name(&benchmark.name_any())?;

    if benchmark.spec.image.name.trim().is_empty() {
        return Err(ValidationError::EmptyImage);
    }

    kinds::dispatch(&benchmark.spec.workload).validate()
}

/// Check that a name is a DNS-1035 label.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let reject = |reason| {
        Err(ValidationError::InvalidName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return reject("must not be empty");
    }
    if name.len() > MAX_NAME_LEN {
        return reject("must be at most 63 characters");
    }
    if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        return reject("must start with a lowercase letter");
    }
    if name.ends_with('-') {
        return reject("must end with an alphanumeric character");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return reject("must consist of lowercase alphanumerics and '-'");
    }
    Ok(())
}

/// Check that a key can be used in ConfigMap data.
pub fn validate_config_key(field: &'static str, key: &str) -> Result<(), ValidationError> {
    let reject = |reason: &str| {
        Err(ValidationError::invalid(
            field,
            format!("key {key:?} {reason}"),
        ))
    };

    if key.is_empty() {
        return reject("must not be empty");
    }
    if key.len() > MAX_CONFIG_KEY_LEN {
        return reject("must be at most 253 characters");
    }
    if key == "." || key == ".." {
        return reject("must not be '.' or '..'");
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return reject("must consist of alphanumerics, '-', '_' or '.'");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("iperf3-udp")]
    #[case("a")]
    #[case("bench-01")]
    fn test_valid_names(#[case] name: &str) {
        assert!(validate_name(name).is_ok());
    }

    #[rstest]
    #[case("")]
    #[case("1bench")]
    #[case("Bench")]
    #[case("bench-")]
    #[case("bench.local")]
    #[case("bench_1")]
    fn test_invalid_names(#[case] name: &str) {
        let err = validate_name(name).unwrap_err();
        assert_eq!(err.reason_code(), "invalid_name");
    }

    #[test]
    fn test_name_length_limit() {
        assert!(validate_name(&"a".repeat(63)).is_ok());
        assert!(validate_name(&"a".repeat(64)).is_err());
    }

    #[rstest]
    #[case("a.yml")]
    #[case("load_test-2.yaml")]
    #[case("..a")]
    fn test_valid_config_keys(#[case] key: &str) {
        assert!(validate_config_key("benchmarksVolume", key).is_ok());
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("..")]
    #[case("dir/a conf")]
    #[case("a:b")]
    fn test_invalid_config_keys(#[case] key: &str) {
        let err = validate_config_key("benchmarksVolume", key).unwrap_err();
        assert_eq!(err.reason_code(), "invalid_field");
    }

    #[test]
    fn test_config_key_length_limit() {
        assert!(validate_config_key("benchmarksVolume", &"a".repeat(253)).is_ok());
        assert!(validate_config_key("benchmarksVolume", &"a".repeat(254)).is_err());
    }
}
