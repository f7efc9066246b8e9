//! Defensive disjointness audit over the resolved splits.
//!
//! The splitter branches that compute partitions already guarantee
//! disjointness, so overlap here is a safety net for user-supplied manifests,
//! not a primary enforcement mechanism. Violations are logged as warnings and
//! never abort construction.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::manifest::Split;
use crate::splitter::SplitSet;

/// Prefixes shared by each pair of splits; empty when fully disjoint.
pub fn pairwise_overlaps(splits: &SplitSet) -> Vec<(Split, Split, Vec<String>)> {
    let pairs = [
        (Split::Train, &splits.train, Split::Valid, &splits.valid),
        (Split::Train, &splits.train, Split::Test, &splits.test),
        (Split::Valid, &splits.valid, Split::Test, &splits.test),
    ];
    let mut overlaps = Vec::new();
    for (left, left_prefixes, right, right_prefixes) in pairs {
        let right_set: HashSet<&String> = right_prefixes.iter().collect();
        let shared: Vec<String> = left_prefixes
            .iter()
            .filter(|prefix| right_set.contains(*prefix))
            .cloned()
            .collect();
        if !shared.is_empty() {
            overlaps.push((left, right, shared));
        }
    }
    overlaps
}

/// Warn about any prefix appearing in more than one split.
pub fn ensure_no_set_overlap(splits: &SplitSet) {
    let overlaps = pairwise_overlaps(splits);
    if overlaps.is_empty() {
        debug!("train, valid, and test sets are pairwise disjoint");
        return;
    }
    for (left, right, shared) in overlaps {
        warn!(
            left = left.manifest_name(),
            right = right.manifest_name(),
            count = shared.len(),
            prefixes = ?shared,
            "splits share prefixes"
        );
    }
}
