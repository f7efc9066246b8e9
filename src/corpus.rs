//! The corpus aggregate: directory validation, feature gating, split
//! resolution, and file-manifest accessors for the training process.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::audit;
use crate::config::CorpusConfig;
use crate::constants::layout::{
    FEAT_DIR, LABEL_DIR, SNAPSHOT_FILENAME, UNTRANSCRIBED_DIR, UNTRANSCRIBED_MANIFEST, WAV_DIR,
    WAV_EXTENSION,
};
use crate::constants::snapshot::SNAPSHOT_VERSION;
use crate::errors::CorpusError;
use crate::features::{self, FeatureBackend};
use crate::labels::{LabelIndex, LabelSegmenter};
use crate::manifest;
use crate::splitter;
use crate::utterance::{self, AudioExtractor, Utterance};

/// A preprocessed speech corpus, ready for model training.
///
/// Construction runs the full assembly pipeline (directory validation, label
/// indexing, feature gating, split resolution, length sort, overlap audit);
/// any step failing aborts the build, so a returned `Corpus` is never
/// partial. Once constructed it is immutable: changing the corpus means
/// re-deriving it into a (possibly new) target directory.
#[derive(Debug)]
pub struct Corpus {
    config: CorpusConfig,
    tgt_dir: PathBuf,
    label_index: LabelIndex,
    train_prefixes: Vec<String>,
    valid_prefixes: Vec<String>,
    test_prefixes: Vec<String>,
    untranscribed_prefixes: Option<Vec<String>>,
    utterances: Option<Vec<Utterance>>,
    num_feats: OnceLock<usize>,
}

/// Plain-data snapshot of an assembled corpus.
///
/// Deliberately decoupled from the in-memory representation so saved corpora
/// stay readable as the crate evolves.
#[derive(Debug, Serialize, Deserialize)]
struct CorpusSnapshot {
    version: u8,
    config: CorpusConfig,
    labels: Vec<String>,
    train_prefixes: Vec<String>,
    valid_prefixes: Vec<String>,
    test_prefixes: Vec<String>,
    untranscribed_prefixes: Option<Vec<String>>,
}

impl Corpus {
    /// Assemble a corpus from a preprocessed target directory.
    ///
    /// Expects per-utterance WAVs in `<tgt_dir>/wav/` and transcriptions in
    /// `<tgt_dir>/label/` named `<prefix>.<label_type>`. Existing split
    /// manifests in `tgt_dir` are honored; otherwise splits are computed
    /// deterministically and persisted. A snapshot is written on success.
    pub fn new(
        config: CorpusConfig,
        tgt_dir: &Path,
        labels: BTreeSet<String>,
        backend: &dyn FeatureBackend,
    ) -> Result<Self, CorpusError> {
        debug!(
            tgt_dir = %tgt_dir.display(),
            feat_type = %config.feat_type,
            label_type = %config.label_type,
            max_samples = config.max_samples,
            "assembling corpus"
        );
        let tgt_dir = tgt_dir.to_path_buf();
        check_directories(&tgt_dir)?;
        let wav_dir = tgt_dir.join(WAV_DIR);
        let feat_dir = tgt_dir.join(FEAT_DIR);
        let label_dir = tgt_dir.join(LABEL_DIR);

        info!(count = labels.len(), "corpus label set");
        let label_index = LabelIndex::build(labels);

        features::prepare_feats(&wav_dir, &feat_dir, &config.feat_type, backend)?;

        let splits = splitter::resolve_splits(&tgt_dir, config.seed, || {
            let prefixes = determine_prefixes(&wav_dir, &label_dir, &config.label_type)?;
            features::filter_by_size(&feat_dir, prefixes, &config.feat_type, config.max_samples)
        })?;

        // Ascending-length training order lets downstream batching group
        // similarly-sized sequences and minimize padding waste.
        let train_prefixes =
            features::sort_by_size(&feat_dir, splits.train, &config.feat_type)?;
        let splits = splitter::SplitSet {
            train: train_prefixes,
            valid: splits.valid,
            test: splits.test,
        };
        audit::ensure_no_set_overlap(&splits);

        let untranscribed_prefixes =
            manifest::read_optional_prefixes(&tgt_dir.join(UNTRANSCRIBED_MANIFEST))?;

        let corpus = Self {
            config,
            tgt_dir,
            label_index,
            train_prefixes: splits.train,
            valid_prefixes: splits.valid,
            test_prefixes: splits.test,
            untranscribed_prefixes,
            utterances: None,
            num_feats: OnceLock::new(),
        };
        corpus.save_snapshot()?;
        Ok(corpus)
    }

    /// Assemble a corpus from a directory whose label set is not known up
    /// front: the set is derived by scanning the transcription files.
    pub fn open(
        tgt_dir: &Path,
        config: CorpusConfig,
        backend: &dyn FeatureBackend,
    ) -> Result<Self, CorpusError> {
        let labels = determine_labels(&tgt_dir.join(LABEL_DIR), &config.label_type)?;
        Self::new(config, tgt_dir, labels, backend)
    }

    /// Materialize a corpus from pre-parsed utterance records.
    ///
    /// Deduplicates, filters by `keep`, segments labels, drops records with
    /// empty segmented text or audio too short to train on, writes the
    /// transcription and per-utterance audio layout under `tgt_dir`, then
    /// runs the ordinary assembly. The surviving records are retained on the
    /// returned corpus.
    pub fn from_utterances(
        utterances: Vec<Utterance>,
        keep: impl Fn(&Utterance) -> bool,
        segmenter: &dyn LabelSegmenter,
        audio: &dyn AudioExtractor,
        backend: &dyn FeatureBackend,
        tgt_dir: &Path,
        config: CorpusConfig,
    ) -> Result<Self, CorpusError> {
        let utterances = utterance::remove_duplicates(utterances);
        let utterances: Vec<Utterance> = utterances.into_iter().filter(|u| keep(u)).collect();
        let utterances: Vec<Utterance> = utterances
            .into_iter()
            .map(|u| segmenter.segment_labels(u))
            .collect();
        let utterances = utterance::remove_empty_text(utterances);
        let utterances = utterance::remove_too_short(utterances);
        info!(count = utterances.len(), "materializing corpus from utterances");

        fs::create_dir_all(tgt_dir)?;
        utterance::write_transcriptions(
            &utterances,
            &tgt_dir.join(LABEL_DIR),
            &config.label_type,
        )?;
        extract_utterance_wavs(&utterances, &tgt_dir.join(WAV_DIR), audio)?;

        let mut corpus = Self::new(config, tgt_dir, segmenter.labels(), backend)?;
        corpus.utterances = Some(utterances);
        Ok(corpus)
    }

    /// Restore a previously assembled corpus from its on-disk snapshot,
    /// skipping the assembly pipeline entirely.
    pub fn restore(tgt_dir: &Path) -> Result<Self, CorpusError> {
        let path = tgt_dir.join(SNAPSHOT_FILENAME);
        let bytes = fs::read(&path)?;
        let snapshot: CorpusSnapshot = serde_json::from_slice(&bytes).map_err(|err| {
            CorpusError::Snapshot(format!("failed to decode '{}': {err}", path.display()))
        })?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(CorpusError::Snapshot(format!(
                "snapshot version mismatch (expected {SNAPSHOT_VERSION}, found {})",
                snapshot.version
            )));
        }
        debug!(tgt_dir = %tgt_dir.display(), "restored corpus from snapshot");
        Ok(Self {
            label_index: LabelIndex::build(snapshot.labels),
            config: snapshot.config,
            tgt_dir: tgt_dir.to_path_buf(),
            train_prefixes: snapshot.train_prefixes,
            valid_prefixes: snapshot.valid_prefixes,
            test_prefixes: snapshot.test_prefixes,
            untranscribed_prefixes: snapshot.untranscribed_prefixes,
            utterances: None,
            num_feats: OnceLock::new(),
        })
    }

    /// Serialize the assembled state to `<tgt_dir>/corpus.p`.
    pub fn save_snapshot(&self) -> Result<PathBuf, CorpusError> {
        let snapshot = CorpusSnapshot {
            version: SNAPSHOT_VERSION,
            config: self.config.clone(),
            // Skip the implicit pad entry; restore re-prepends it.
            labels: self.label_index.labels()[1..].to_vec(),
            train_prefixes: self.train_prefixes.clone(),
            valid_prefixes: self.valid_prefixes.clone(),
            test_prefixes: self.test_prefixes.clone(),
            untranscribed_prefixes: self.untranscribed_prefixes.clone(),
        };
        let path = self.tgt_dir.join(SNAPSHOT_FILENAME);
        let bytes = serde_json::to_vec(&snapshot)
            .map_err(|err| CorpusError::Snapshot(format!("failed to encode snapshot: {err}")))?;
        fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Assembly configuration this corpus was built with.
    pub fn config(&self) -> &CorpusConfig {
        &self.config
    }

    /// Target directory this corpus lives in.
    pub fn tgt_dir(&self) -> &Path {
        &self.tgt_dir
    }

    /// Directory holding per-utterance audio.
    pub fn wav_dir(&self) -> PathBuf {
        self.tgt_dir.join(WAV_DIR)
    }

    /// Directory holding normalized audio and feature artifacts.
    pub fn feat_dir(&self) -> PathBuf {
        self.tgt_dir.join(FEAT_DIR)
    }

    /// Directory holding transcription files.
    pub fn label_dir(&self) -> PathBuf {
        self.tgt_dir.join(LABEL_DIR)
    }

    /// Training prefixes, sorted ascending by feature length.
    pub fn train_prefixes(&self) -> &[String] {
        &self.train_prefixes
    }

    /// Validation prefixes.
    pub fn valid_prefixes(&self) -> &[String] {
        &self.valid_prefixes
    }

    /// Test prefixes.
    pub fn test_prefixes(&self) -> &[String] {
        &self.test_prefixes
    }

    /// The label/index bijection.
    pub fn label_index(&self) -> &LabelIndex {
        &self.label_index
    }

    /// Retained utterance records, present only on corpora materialized via
    /// [`Corpus::from_utterances`].
    pub fn utterances(&self) -> Option<&[Utterance]> {
        self.utterances.as_deref()
    }

    /// Number of caller-supplied labels (excludes the pad entry).
    pub fn vocab_size(&self) -> usize {
        self.label_index.vocab_size()
    }

    /// Convert label tokens to indices.
    pub fn labels_to_indices<S: AsRef<str>>(
        &self,
        labels: &[S],
    ) -> Result<Vec<usize>, CorpusError> {
        self.label_index.labels_to_indices(labels)
    }

    /// Convert indices to label tokens.
    pub fn indices_to_labels(&self, indices: &[usize]) -> Result<Vec<String>, CorpusError> {
        self.label_index.indices_to_labels(indices)
    }

    /// Feature and label file paths for the training set, aligned by index.
    pub fn train_fns(&self) -> (Vec<PathBuf>, Vec<PathBuf>) {
        self.prefixes_to_fns(&self.train_prefixes)
    }

    /// Feature and label file paths for the validation set, aligned by index.
    pub fn valid_fns(&self) -> (Vec<PathBuf>, Vec<PathBuf>) {
        self.prefixes_to_fns(&self.valid_prefixes)
    }

    /// Feature and label file paths for the test set, aligned by index.
    pub fn test_fns(&self) -> (Vec<PathBuf>, Vec<PathBuf>) {
        self.prefixes_to_fns(&self.test_prefixes)
    }

    /// Feature file paths for untranscribed utterances, if any were listed.
    pub fn untranscribed_fns(&self) -> Vec<PathBuf> {
        let untranscribed_dir = self.feat_dir().join(UNTRANSCRIBED_DIR);
        self.untranscribed_prefixes
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|prefix| features::feature_path(&untranscribed_dir, prefix, &self.config.feat_type))
            .collect()
    }

    /// Per-time-step feature dimensionality, computed from one training
    /// artifact on first access and cached thereafter.
    pub fn num_feats(&self) -> Result<usize, CorpusError> {
        if let Some(dims) = self.num_feats.get() {
            return Ok(*dims);
        }
        let (feat_fns, _) = self.train_fns();
        let first = feat_fns.first().ok_or_else(|| {
            CorpusError::InvalidState("cannot compute num_feats: training set is empty".to_string())
        })?;
        let dims = features::feature_dims(first)?;
        let _ = self.num_feats.set(dims);
        Ok(dims)
    }

    fn prefixes_to_fns(&self, prefixes: &[String]) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let feat_dir = self.feat_dir();
        let label_dir = self.label_dir();
        let feat_fns = prefixes
            .iter()
            .map(|prefix| features::feature_path(&feat_dir, prefix, &self.config.feat_type))
            .collect();
        let label_fns = prefixes
            .iter()
            .map(|prefix| label_dir.join(format!("{prefix}.{}", self.config.label_type)))
            .collect();
        (feat_fns, label_fns)
    }
}

/// Validate the target directory layout, creating the feature dir if absent.
fn check_directories(tgt_dir: &Path) -> Result<(), CorpusError> {
    if !tgt_dir.is_dir() {
        return Err(CorpusError::Directory(tgt_dir.to_path_buf()));
    }
    let wav_dir = tgt_dir.join(WAV_DIR);
    if !wav_dir.is_dir() {
        return Err(CorpusError::Directory(wav_dir));
    }
    let label_dir = tgt_dir.join(LABEL_DIR);
    if !label_dir.is_dir() {
        return Err(CorpusError::Directory(label_dir));
    }
    fs::create_dir_all(tgt_dir.join(FEAT_DIR))?;
    Ok(())
}

/// Discover the usable prefix universe: label-file prefixes ∩ wav-file
/// prefixes, sorted for determinism.
fn determine_prefixes(
    wav_dir: &Path,
    label_dir: &Path,
    label_type: &str,
) -> Result<Vec<String>, CorpusError> {
    let label_prefixes = prefixes_with_extension(label_dir, label_type);
    let wav_prefixes = prefixes_with_extension(wav_dir, WAV_EXTENSION);
    let prefixes: Vec<String> = label_prefixes.intersection(&wav_prefixes).cloned().collect();
    if prefixes.is_empty() {
        return Err(CorpusError::EmptyCorpus {
            wav_dir: wav_dir.to_path_buf(),
            label_dir: label_dir.to_path_buf(),
            label_type: label_type.to_string(),
        });
    }
    Ok(prefixes)
}

/// Relative file stems (extension stripped) for files under `dir` with the
/// given extension. Nested paths use `/` separators so prefixes are stable
/// across platforms.
fn prefixes_with_extension(dir: &Path, extension: &str) -> BTreeSet<String> {
    let mut prefixes = BTreeSet::new();
    for entry in WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
    {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(extension) {
            continue;
        }
        let rel = path.strip_prefix(dir).unwrap_or(path).with_extension("");
        let prefix: Vec<&str> = rel
            .components()
            .filter_map(|component| component.as_os_str().to_str())
            .collect();
        if !prefix.is_empty() {
            prefixes.insert(prefix.join("/"));
        }
    }
    prefixes
}

/// Derive the label set by scanning every transcription file's tokens.
fn determine_labels(label_dir: &Path, label_type: &str) -> Result<BTreeSet<String>, CorpusError> {
    if !label_dir.is_dir() {
        return Err(CorpusError::Directory(label_dir.to_path_buf()));
    }
    let mut labels = BTreeSet::new();
    for entry in fs::read_dir(label_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(label_type) {
            continue;
        }
        let contents = fs::read_to_string(&path)?;
        labels.extend(
            contents
                .split_whitespace()
                .map(str::to_string),
        );
    }
    Ok(labels)
}

/// Cut one WAV per utterance into the target wav dir, lazily.
fn extract_utterance_wavs(
    utterances: &[Utterance],
    wav_dir: &Path,
    audio: &dyn AudioExtractor,
) -> Result<(), CorpusError> {
    fs::create_dir_all(wav_dir)?;
    for utterance in utterances {
        let dst = wav_dir.join(format!("{}.{WAV_EXTENSION}", utterance.prefix));
        if dst.is_file() {
            continue;
        }
        audio.extract_utterance(utterance, &dst)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_subdirectories_are_fatal() {
        let dir = tempdir().unwrap();
        let err = check_directories(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, CorpusError::Directory(_)));

        fs::create_dir_all(dir.path().join(WAV_DIR)).unwrap();
        let err = check_directories(dir.path()).unwrap_err();
        assert!(matches!(err, CorpusError::Directory(path) if path.ends_with(LABEL_DIR)));

        fs::create_dir_all(dir.path().join(LABEL_DIR)).unwrap();
        check_directories(dir.path()).unwrap();
        assert!(dir.path().join(FEAT_DIR).is_dir());
    }

    #[test]
    fn prefix_universe_is_the_sorted_intersection() {
        let dir = tempdir().unwrap();
        let wav_dir = dir.path().join(WAV_DIR);
        let label_dir = dir.path().join(LABEL_DIR);
        fs::create_dir_all(&wav_dir).unwrap();
        fs::create_dir_all(&label_dir).unwrap();

        for prefix in ["b", "a", "wav_only"] {
            fs::write(wav_dir.join(format!("{prefix}.wav")), b"riff").unwrap();
        }
        for prefix in ["a", "b", "label_only"] {
            fs::write(label_dir.join(format!("{prefix}.phonemes")), "p t\n").unwrap();
        }

        let prefixes = determine_prefixes(&wav_dir, &label_dir, "phonemes").unwrap();
        assert_eq!(prefixes, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn disjoint_artifacts_mean_an_empty_corpus() {
        let dir = tempdir().unwrap();
        let wav_dir = dir.path().join(WAV_DIR);
        let label_dir = dir.path().join(LABEL_DIR);
        fs::create_dir_all(&wav_dir).unwrap();
        fs::create_dir_all(&label_dir).unwrap();
        fs::write(wav_dir.join("x.wav"), b"riff").unwrap();
        fs::write(label_dir.join("y.phonemes"), "p\n").unwrap();

        let err = determine_prefixes(&wav_dir, &label_dir, "phonemes").unwrap_err();
        assert!(matches!(err, CorpusError::EmptyCorpus { .. }));
    }

    #[test]
    fn labels_are_scanned_from_transcriptions() {
        let dir = tempdir().unwrap();
        let label_dir = dir.path().join(LABEL_DIR);
        fs::create_dir_all(&label_dir).unwrap();
        fs::write(label_dir.join("u0.phonemes"), "p a t\n").unwrap();
        fs::write(label_dir.join("u1.phonemes"), "t k\n").unwrap();
        fs::write(label_dir.join("u2.tones"), "high low\n").unwrap();

        let labels = determine_labels(&label_dir, "phonemes").unwrap();
        let expected: BTreeSet<String> =
            ["a", "k", "p", "t"].iter().map(|s| s.to_string()).collect();
        assert_eq!(labels, expected);
    }
}
