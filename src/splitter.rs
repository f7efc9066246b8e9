//! Deterministic train/valid/test partitioning and manifest reconciliation.
//!
//! Which of the three manifest files already exist on disk decides how splits
//! are produced:
//!
//! - all three exist: load them verbatim, trusted as-is;
//! - none exist: shuffle the discovered universe deterministically and slice
//!   it 90/5/5, persisting all three manifests;
//! - valid and test exist without train: compute train as the remainder of
//!   the universe and persist only the train manifest (supports adding new
//!   training data without disturbing fixed evaluation sets);
//! - anything else is refused rather than guessed.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info};

use crate::constants::splits::{TRAIN_RATIO, VALID_RATIO};
use crate::errors::CorpusError;
use crate::hash::shuffle_key;
use crate::manifest::{self, Split};

/// One three-way partition of the prefix universe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitSet {
    /// Training prefixes, order significant.
    pub train: Vec<String>,
    /// Validation prefixes.
    pub valid: Vec<String>,
    /// Test prefixes.
    pub test: Vec<String>,
}

/// Deterministically partition `prefixes` into train/valid/test.
///
/// The shuffle sorts by a stable hash key derived from the seed and each
/// prefix, so the permutation is bit-for-bit reproducible across runs and
/// platforms. Slice bounds are `train_end = floor(0.90*N)` and
/// `valid_end = floor(train_end + 0.05*N)`; the remainder is test.
///
/// Fails with `InvalidState` if any resulting slice is empty. The arithmetic
/// needs roughly twenty utterances before all three slices are non-empty;
/// smaller corpora are unsupported.
pub fn divide_prefixes(prefixes: &[String], seed: u64) -> Result<SplitSet, CorpusError> {
    let mut shuffled = prefixes.to_vec();
    shuffled.sort_by_key(|prefix| shuffle_key(seed, prefix));

    let n = shuffled.len();
    let train_end = (TRAIN_RATIO * n as f64) as usize;
    let valid_end = (train_end as f64 + VALID_RATIO * n as f64) as usize;

    let test = shuffled.split_off(valid_end);
    let valid = shuffled.split_off(train_end);
    let train = shuffled;

    if train.is_empty() || valid.is_empty() || test.is_empty() {
        return Err(CorpusError::InvalidState(format!(
            "deterministic split of {n} prefixes produced an empty subset \
             (train={}, valid={}, test={}); the corpus is too small to split",
            train.len(),
            valid.len(),
            test.len()
        )));
    }
    debug!(
        n,
        train = train.len(),
        valid = valid.len(),
        test = test.len(),
        seed,
        "divided prefixes"
    );
    Ok(SplitSet { train, valid, test })
}

/// Resolve the three splits for a target directory.
///
/// `universe` lazily produces the discovered, size-filtered prefix universe;
/// it is only invoked on the branches that need to compute a split, so a
/// fully-manifested directory never touches feature artifacts here.
pub fn resolve_splits<F>(tgt_dir: &Path, seed: u64, universe: F) -> Result<SplitSet, CorpusError>
where
    F: FnOnce() -> Result<Vec<String>, CorpusError>,
{
    let train_fn = Split::Train.manifest_path(tgt_dir);
    let valid_fn = Split::Valid.manifest_path(tgt_dir);
    let test_fn = Split::Test.manifest_path(tgt_dir);

    match (train_fn.is_file(), valid_fn.is_file(), test_fn.is_file()) {
        (true, true, true) => {
            info!(tgt_dir = %tgt_dir.display(), "loading existing split manifests");
            Ok(SplitSet {
                train: manifest::read_prefixes(&train_fn)?,
                valid: manifest::read_prefixes(&valid_fn)?,
                test: manifest::read_prefixes(&test_fn)?,
            })
        }
        (false, false, false) => {
            info!(tgt_dir = %tgt_dir.display(), seed, "computing fresh splits");
            let splits = divide_prefixes(&universe()?, seed)?;
            manifest::write_prefixes(&splits.train, &train_fn)?;
            manifest::write_prefixes(&splits.valid, &valid_fn)?;
            manifest::write_prefixes(&splits.test, &test_fn)?;
            Ok(splits)
        }
        (false, true, true) => {
            info!(tgt_dir = %tgt_dir.display(), "reconciling train against fixed valid/test");
            let valid = manifest::read_prefixes(&valid_fn)?;
            let test = manifest::read_prefixes(&test_fn)?;
            let held_out: HashSet<&String> = valid.iter().chain(test.iter()).collect();
            let train: Vec<String> = universe()?
                .into_iter()
                .filter(|prefix| !held_out.contains(prefix))
                .collect();
            manifest::write_prefixes(&train, &train_fn)?;
            Ok(SplitSet { train, valid, test })
        }
        (train, valid, test) => Err(CorpusError::UnsupportedManifestState { train, valid, test }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn universe(n: usize) -> Vec<String> {
        (0..n).map(|idx| format!("utt_{idx:03}")).collect()
    }

    #[test]
    fn divide_is_deterministic_for_a_fixed_seed() {
        let prefixes = universe(40);
        let first = divide_prefixes(&prefixes, 0).unwrap();
        let second = divide_prefixes(&prefixes, 0).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn divide_respects_floor_arithmetic() {
        let n = 43;
        let splits = divide_prefixes(&universe(n), 0).unwrap();
        let train_end = (0.90 * n as f64) as usize;
        let valid_end = (train_end as f64 + 0.05 * n as f64) as usize;
        assert_eq!(splits.train.len(), train_end);
        assert_eq!(splits.valid.len(), valid_end - train_end);
        assert_eq!(splits.test.len(), n - valid_end);
    }

    #[test]
    fn divide_partitions_without_loss_or_overlap() {
        let prefixes = universe(60);
        let splits = divide_prefixes(&prefixes, 7).unwrap();
        let mut all: Vec<String> = splits
            .train
            .iter()
            .chain(splits.valid.iter())
            .chain(splits.test.iter())
            .cloned()
            .collect();
        all.sort();
        assert_eq!(all, prefixes);
    }

    #[test]
    fn different_seeds_give_different_orderings() {
        let prefixes = universe(50);
        let a = divide_prefixes(&prefixes, 0).unwrap();
        let b = divide_prefixes(&prefixes, 1).unwrap();
        assert_ne!(a.train, b.train);
    }

    #[test]
    fn tiny_corpus_fails_the_empty_slice_check() {
        // N=10: train_end=9, valid_end=9, so valid gets no entries.
        let err = divide_prefixes(&universe(10), 0).unwrap_err();
        assert!(matches!(err, CorpusError::InvalidState(_)));
    }

    #[test]
    fn fresh_resolution_persists_all_three_manifests() {
        let dir = tempdir().unwrap();
        let prefixes = universe(40);
        let splits = resolve_splits(dir.path(), 0, || Ok(prefixes.clone())).unwrap();
        for split in crate::manifest::ALL_SPLITS {
            assert!(split.manifest_path(dir.path()).is_file());
        }
        // A second resolution loads the persisted manifests verbatim.
        let reloaded = resolve_splits(dir.path(), 0, || {
            panic!("universe must not be computed when all manifests exist")
        })
        .unwrap();
        assert_eq!(reloaded, splits);
    }

    #[test]
    fn partial_resolution_computes_train_as_remainder() {
        let dir = tempdir().unwrap();
        let prefixes = universe(10);
        let valid = vec![prefixes[0].clone(), prefixes[1].clone()];
        let test = vec![prefixes[2].clone()];
        manifest::write_prefixes(&valid, &Split::Valid.manifest_path(dir.path())).unwrap();
        manifest::write_prefixes(&test, &Split::Test.manifest_path(dir.path())).unwrap();

        let splits = resolve_splits(dir.path(), 0, || Ok(prefixes.clone())).unwrap();
        assert_eq!(splits.valid, valid);
        assert_eq!(splits.test, test);
        assert_eq!(splits.train, prefixes[3..].to_vec());
        assert!(Split::Train.manifest_path(dir.path()).is_file());
    }

    #[test]
    fn other_partial_combinations_are_refused() {
        let dir = tempdir().unwrap();
        let only_train = vec!["utt_0".to_string()];
        manifest::write_prefixes(&only_train, &Split::Train.manifest_path(dir.path())).unwrap();

        let err = resolve_splits(dir.path(), 0, || Ok(universe(40))).unwrap_err();
        assert!(matches!(
            err,
            CorpusError::UnsupportedManifestState {
                train: true,
                valid: false,
                test: false,
            }
        ));
    }
}
