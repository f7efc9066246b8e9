use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub fn stable_hash_with(f: impl FnOnce(&mut DefaultHasher)) -> u64 {
    let mut hasher = DefaultHasher::new();
    f(&mut hasher);
    hasher.finish()
}

/// Key used to deterministically order values under a seed.
///
/// Sorting a slice by this key is the crate's pinned shuffle: the permutation
/// depends only on the seed and the values, never on platform or run.
pub fn shuffle_key(seed: u64, value: &str) -> u64 {
    stable_hash_with(|hasher| {
        seed.hash(hasher);
        value.hash(hasher);
    })
}
