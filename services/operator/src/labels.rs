//! Reserved labels and annotations carried by every child object.

use std::collections::BTreeMap;

use crate::plan::Role;

/// Benchmark tool of the owning resource.
pub const APP_LABEL: &str = "kperf.dev/app";

/// Name of the owning resource.
pub const CR_NAME_LABEL: &str = "kperf.dev/cr-name";

/// Role of the pod within the benchmark (`job`, `server` or `client`).
pub const ROLE_LABEL: &str = "kperf.dev/role";

/// Fingerprint of the plan that produced a child. Informational only.
pub const PLAN_HASH_ANNOTATION: &str = "kperf.dev/plan-hash";

/// Labels identifying the pods of one role of one benchmark.
pub fn selector(kind: &str, name: &str, role: Role) -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_LABEL.to_string(), kind.to_string()),
        (CR_NAME_LABEL.to_string(), name.to_string()),
        (ROLE_LABEL.to_string(), role.as_str().to_string()),
    ])
}

/// User pod labels with the reserved labels laid over them.
///
/// Reserved keys always win so selectors stay stable.
pub fn pod_labels(
    user: &BTreeMap<String, String>,
    kind: &str,
    name: &str,
    role: Role,
) -> BTreeMap<String, String> {
    let mut labels = user.clone();
    labels.extend(selector(kind, name, role));
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_labels_win() {
        let user = BTreeMap::from([
            (APP_LABEL.to_string(), "spoofed".to_string()),
            ("team".to_string(), "storage".to_string()),
        ]);

        let labels = pod_labels(&user, "fio", "disk-1", Role::Job);
        assert_eq!(labels[APP_LABEL], "fio");
        assert_eq!(labels[CR_NAME_LABEL], "disk-1");
        assert_eq!(labels[ROLE_LABEL], "job");
        assert_eq!(labels["team"], "storage");

        // Caller's map is untouched
        assert_eq!(user[APP_LABEL], "spoofed");
    }
}
