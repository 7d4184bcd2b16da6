//! Link-set reconciliation planning.
//!
//! Pure comparison of the previous version's linked files against the local
//! directory index. No I/O happens here; the resulting plan drives the
//! remote call sequence in `reconcile`.

use crate::record::{FileSet, RetentionPolicy};
use std::collections::BTreeSet;

/// Classification of every file name involved in a reconciliation.
///
/// Computed once per session and never mutated afterwards. Invariants:
/// `keep` and `drop` partition the previous version's linked names, and a
/// name never appears in both `keep` and `upload` (an upload supersedes a
/// kept link of the same name).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    /// Links from the previous version carried into the new one.
    pub keep: BTreeSet<String>,
    /// Links from the previous version removed from the new one.
    pub drop: BTreeSet<String>,
    /// Local files whose content must be uploaded and linked.
    pub upload: BTreeSet<String>,
}

impl ReconciliationPlan {
    /// True when the new version reuses the previous link set as-is.
    pub fn is_unchanged(&self) -> bool {
        self.drop.is_empty() && self.upload.is_empty()
    }
}

/// Classify every name in `remote_linked` and `local` into keep/drop/upload.
///
/// - same name, same checksum: keep
/// - same name, different checksum: drop the old link and upload the local
///   content under the same name, regardless of policy. A stale link
///   pointing at content that no longer matches local state would be
///   silently wrong.
/// - only remote: keep or drop per `policy.discard_missing`
/// - only local: upload
pub fn diff(remote_linked: &FileSet, local: &FileSet, policy: RetentionPolicy) -> ReconciliationPlan {
    let mut plan = ReconciliationPlan::default();

    for file in remote_linked.iter() {
        match local.get(&file.name) {
            Some(candidate) if candidate.checksum == file.checksum => {
                plan.keep.insert(file.name.clone());
            }
            Some(_) => {
                plan.drop.insert(file.name.clone());
                plan.upload.insert(file.name.clone());
            }
            None => {
                if policy.discard_missing {
                    plan.drop.insert(file.name.clone());
                } else {
                    plan.keep.insert(file.name.clone());
                }
            }
        }
    }

    for file in local.iter() {
        if !remote_linked.contains(&file.name) {
            plan.upload.insert(file.name.clone());
        }
    }

    debug_assert!(plan.keep.is_disjoint(&plan.drop));
    debug_assert!(plan.keep.is_disjoint(&plan.upload));

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Checksum, FileDescriptor};

    fn set(entries: &[(&str, &str)]) -> FileSet {
        entries
            .iter()
            .map(|(name, checksum)| FileDescriptor {
                name: name.to_string(),
                checksum: Checksum::new(*checksum),
            })
            .collect()
    }

    fn names(collection: &BTreeSet<String>) -> Vec<&str> {
        collection.iter().map(String::as_str).collect()
    }

    const KEEP_MISSING: RetentionPolicy = RetentionPolicy {
        discard_missing: false,
    };
    const DISCARD_MISSING: RetentionPolicy = RetentionPolicy {
        discard_missing: true,
    };

    #[test]
    fn unchanged_file_is_kept_under_any_policy() {
        // Scenario A
        let remote = set(&[("a", "md5:1")]);
        let local = set(&[("a", "md5:1")]);

        for policy in [KEEP_MISSING, DISCARD_MISSING] {
            let plan = diff(&remote, &local, policy);
            assert_eq!(names(&plan.keep), vec!["a"]);
            assert!(plan.drop.is_empty());
            assert!(plan.upload.is_empty());
        }
    }

    #[test]
    fn changed_content_is_dropped_and_reuploaded() {
        // Scenario B
        let remote = set(&[("a", "md5:1")]);
        let local = set(&[("a", "md5:2")]);

        let plan = diff(&remote, &local, KEEP_MISSING);
        assert!(plan.keep.is_empty());
        assert_eq!(names(&plan.drop), vec!["a"]);
        assert_eq!(names(&plan.upload), vec!["a"]);
    }

    #[test]
    fn changed_content_replaces_regardless_of_policy() {
        let remote = set(&[("a", "md5:1")]);
        let local = set(&[("a", "md5:2")]);

        for policy in [KEEP_MISSING, DISCARD_MISSING] {
            let plan = diff(&remote, &local, policy);
            assert!(plan.drop.contains("a"));
            assert!(plan.upload.contains("a"));
        }
    }

    #[test]
    fn missing_file_is_kept_when_policy_retains() {
        // Scenario C
        let remote = set(&[("a", "md5:1"), ("b", "md5:2")]);
        let local = set(&[("a", "md5:1")]);

        let plan = diff(&remote, &local, KEEP_MISSING);
        assert_eq!(names(&plan.keep), vec!["a", "b"]);
        assert!(plan.drop.is_empty());
        assert!(plan.upload.is_empty());
    }

    #[test]
    fn missing_file_is_dropped_when_policy_discards() {
        // Scenario D
        let remote = set(&[("a", "md5:1"), ("b", "md5:2")]);
        let local = set(&[("a", "md5:1")]);

        let plan = diff(&remote, &local, DISCARD_MISSING);
        assert_eq!(names(&plan.keep), vec!["a"]);
        assert_eq!(names(&plan.drop), vec!["b"]);
        assert!(plan.upload.is_empty());
    }

    #[test]
    fn new_local_file_is_uploaded() {
        // Scenario E
        let remote = FileSet::new();
        let local = set(&[("c", "md5:3")]);

        let plan = diff(&remote, &local, KEEP_MISSING);
        assert!(plan.keep.is_empty());
        assert!(plan.drop.is_empty());
        assert_eq!(names(&plan.upload), vec!["c"]);
    }

    #[test]
    fn identical_sets_produce_an_unchanged_plan() {
        let remote = set(&[("a", "md5:1"), ("b", "md5:2")]);
        let local = remote.clone();

        for policy in [KEEP_MISSING, DISCARD_MISSING] {
            let plan = diff(&remote, &local, policy);
            assert!(plan.is_unchanged());
            assert_eq!(plan.keep.len(), remote.len());
        }
    }

    #[test]
    fn keep_and_drop_partition_the_remote_names() {
        let remote = set(&[
            ("same", "md5:1"),
            ("changed", "md5:2"),
            ("missing", "md5:3"),
        ]);
        let local = set(&[("same", "md5:1"), ("changed", "md5:9"), ("new", "md5:4")]);

        for policy in [KEEP_MISSING, DISCARD_MISSING] {
            let plan = diff(&remote, &local, policy);

            let mut partition: BTreeSet<String> = plan.keep.clone();
            partition.extend(plan.drop.iter().cloned());
            let remote_names: BTreeSet<String> =
                remote.names().map(str::to_string).collect();

            assert_eq!(partition, remote_names);
            assert!(plan.keep.is_disjoint(&plan.drop));
            assert!(plan.keep.is_disjoint(&plan.upload));
        }
    }
}
