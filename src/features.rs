//! Lazy feature gating, length filtering, and feature-artifact inspection.
//!
//! Feature artifacts are `.npy` arrays addressed by `(prefix, feat_type)` as
//! `<feat_dir>/<prefix>.<feat_type>.npy`. They are treated as immutable once
//! written; the re-check-before-write pattern in [`prepare_feats`] is what
//! makes construction idempotent across retries.

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::ArrayD;
use ndarray_npy::read_npy;
use tracing::{debug, info};

use crate::constants::layout::{FEATURE_EXTENSION, WAV_EXTENSION};
use crate::errors::CorpusError;

/// External collaborator performing audio normalization and batched feature
/// extraction. The corpus core never computes features itself.
pub trait FeatureBackend {
    /// Write a normalized (mono, fixed sample rate) copy of `src` to `dst`.
    fn normalize_audio(&self, src: &Path, dst: &Path) -> Result<(), CorpusError>;

    /// Extract features for every normalized WAV in `feat_dir`, writing one
    /// `<prefix>.<feat_type>.npy` artifact per file. Batched over the whole
    /// directory so model/tooling startup cost is amortized.
    fn extract_features(&self, feat_dir: &Path, feat_type: &str) -> Result<(), CorpusError>;
}

/// Expected feature-artifact path for a prefix.
pub fn feature_path(feat_dir: &Path, prefix: &str, feat_type: &str) -> PathBuf {
    feat_dir.join(format!("{prefix}.{feat_type}.{FEATURE_EXTENSION}"))
}

/// Ensure every WAV in `wav_dir` has an extracted feature artifact.
///
/// Scans the WAV dir, normalizing a mono copy into `feat_dir` for each file
/// whose artifact is missing, then runs one batched extraction pass iff
/// anything was missing. A second call with all artifacts present is a no-op
/// scan.
pub fn prepare_feats(
    wav_dir: &Path,
    feat_dir: &Path,
    feat_type: &str,
    backend: &dyn FeatureBackend,
) -> Result<(), CorpusError> {
    fs::create_dir_all(feat_dir)?;

    let mut should_extract = false;
    for entry in fs::read_dir(wav_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(WAV_EXTENSION) {
            continue;
        }
        let Some(prefix) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let feat_path = feature_path(feat_dir, prefix, feat_type);
        if feat_path.is_file() {
            continue;
        }
        should_extract = true;
        let normalized_path = feat_dir.join(format!("{prefix}.{WAV_EXTENSION}"));
        if !normalized_path.is_file() {
            debug!(prefix, "normalizing audio");
            backend.normalize_audio(&path, &normalized_path)?;
        }
    }

    if should_extract {
        info!(feat_dir = %feat_dir.display(), feat_type, "running batched feature extraction");
        backend.extract_features(feat_dir, feat_type)?;
    }
    Ok(())
}

/// Drop prefixes whose feature artifact has more than `max_samples` time
/// steps. Output order preserves input order minus exclusions.
pub fn filter_by_size(
    feat_dir: &Path,
    prefixes: Vec<String>,
    feat_type: &str,
    max_samples: usize,
) -> Result<Vec<String>, CorpusError> {
    let mut kept = Vec::with_capacity(prefixes.len());
    for prefix in prefixes {
        let frames = feature_frame_count(&feature_path(feat_dir, &prefix, feat_type))?;
        if frames > max_samples {
            debug!(%prefix, frames, max_samples, "dropping over-long utterance");
            continue;
        }
        kept.push(prefix);
    }
    Ok(kept)
}

/// Sort prefixes by ascending feature length.
///
/// Each artifact's leading dimension is read once and cached as the sort key;
/// the sort is stable so equal-length utterances keep their input order.
pub fn sort_by_size(
    feat_dir: &Path,
    prefixes: Vec<String>,
    feat_type: &str,
) -> Result<Vec<String>, CorpusError> {
    let mut keyed = Vec::with_capacity(prefixes.len());
    for prefix in prefixes {
        let frames = feature_frame_count(&feature_path(feat_dir, &prefix, feat_type))?;
        keyed.push((frames, prefix));
    }
    keyed.sort_by_key(|(frames, _)| *frames);
    Ok(keyed.into_iter().map(|(_, prefix)| prefix).collect())
}

/// Number of time steps (leading dimension) in a feature artifact.
pub fn feature_frame_count(path: &Path) -> Result<usize, CorpusError> {
    let shape = feature_shape(path)?;
    shape.first().copied().ok_or_else(|| {
        CorpusError::UnsupportedFeatureShape {
            path: path.to_path_buf(),
            shape,
        }
    })
}

/// Per-time-step feature dimensionality of an artifact.
///
/// 2D artifacts are `time x feats`; 3D artifacts are `time x channels x
/// feats` and are flattened to `channels * feats`. Any other rank is an
/// error.
pub fn feature_dims(path: &Path) -> Result<usize, CorpusError> {
    let shape = feature_shape(path)?;
    match shape.as_slice() {
        [_, feats] => Ok(*feats),
        [_, channels, feats] => Ok(channels * feats),
        _ => Err(CorpusError::UnsupportedFeatureShape {
            path: path.to_path_buf(),
            shape,
        }),
    }
}

fn feature_shape(path: &Path) -> Result<Vec<usize>, CorpusError> {
    let array: ArrayD<f32> = read_npy(path).map_err(|err| {
        CorpusError::Feature(format!("failed to read '{}': {err}", path.display()))
    })?;
    Ok(array.shape().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2, Array3};
    use ndarray_npy::write_npy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Backend that copies audio verbatim and writes fixed-size artifacts,
    /// counting extraction passes.
    struct CountingBackend {
        frames: usize,
        extractions: AtomicUsize,
    }

    impl CountingBackend {
        fn new(frames: usize) -> Self {
            Self {
                frames,
                extractions: AtomicUsize::new(0),
            }
        }
    }

    impl FeatureBackend for CountingBackend {
        fn normalize_audio(&self, src: &Path, dst: &Path) -> Result<(), CorpusError> {
            fs::copy(src, dst)?;
            Ok(())
        }

        fn extract_features(&self, feat_dir: &Path, feat_type: &str) -> Result<(), CorpusError> {
            self.extractions.fetch_add(1, Ordering::SeqCst);
            for entry in fs::read_dir(feat_dir)? {
                let path = entry?.path();
                if path.extension().and_then(|ext| ext.to_str()) != Some(WAV_EXTENSION) {
                    continue;
                }
                let prefix = path.file_stem().unwrap().to_str().unwrap();
                let array = Array2::<f32>::zeros((self.frames, 4));
                write_npy(feature_path(feat_dir, prefix, feat_type), &array).unwrap();
            }
            Ok(())
        }
    }

    fn seed_wavs(wav_dir: &Path, prefixes: &[&str]) {
        fs::create_dir_all(wav_dir).unwrap();
        for prefix in prefixes {
            fs::write(wav_dir.join(format!("{prefix}.wav")), b"riff").unwrap();
        }
    }

    #[test]
    fn second_gate_pass_is_a_no_op() {
        let dir = tempdir().unwrap();
        let wav_dir = dir.path().join("wav");
        let feat_dir = dir.path().join("feat");
        seed_wavs(&wav_dir, &["utt_a", "utt_b"]);

        let backend = CountingBackend::new(10);
        prepare_feats(&wav_dir, &feat_dir, "fbank", &backend).unwrap();
        assert_eq!(backend.extractions.load(Ordering::SeqCst), 1);
        assert!(feature_path(&feat_dir, "utt_a", "fbank").is_file());

        prepare_feats(&wav_dir, &feat_dir, "fbank", &backend).unwrap();
        assert_eq!(backend.extractions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn gate_normalizes_only_missing_copies() {
        let dir = tempdir().unwrap();
        let wav_dir = dir.path().join("wav");
        let feat_dir = dir.path().join("feat");
        seed_wavs(&wav_dir, &["utt_a"]);
        fs::create_dir_all(&feat_dir).unwrap();
        // Pre-existing normalized copy must not be overwritten.
        fs::write(feat_dir.join("utt_a.wav"), b"already-normalized").unwrap();

        let backend = CountingBackend::new(5);
        prepare_feats(&wav_dir, &feat_dir, "fbank", &backend).unwrap();
        assert_eq!(
            fs::read(feat_dir.join("utt_a.wav")).unwrap(),
            b"already-normalized"
        );
    }

    #[test]
    fn size_filter_boundary_is_inclusive() {
        let dir = tempdir().unwrap();
        let feat_dir = dir.path().to_path_buf();
        write_npy(
            feature_path(&feat_dir, "at_cap", "fbank"),
            &Array2::<f32>::zeros((100, 4)),
        )
        .unwrap();
        write_npy(
            feature_path(&feat_dir, "over_cap", "fbank"),
            &Array2::<f32>::zeros((101, 4)),
        )
        .unwrap();

        let kept = filter_by_size(
            &feat_dir,
            vec!["at_cap".to_string(), "over_cap".to_string()],
            "fbank",
            100,
        )
        .unwrap();
        assert_eq!(kept, vec!["at_cap".to_string()]);
    }

    #[test]
    fn sort_orders_by_leading_dimension() {
        let dir = tempdir().unwrap();
        let feat_dir = dir.path().to_path_buf();
        for (prefix, frames) in [("long", 30), ("short", 5), ("mid", 12)] {
            write_npy(
                feature_path(&feat_dir, prefix, "fbank"),
                &Array2::<f32>::zeros((frames, 4)),
            )
            .unwrap();
        }
        let sorted = sort_by_size(
            &feat_dir,
            vec!["long".into(), "short".into(), "mid".into()],
            "fbank",
        )
        .unwrap();
        assert_eq!(sorted, vec!["short", "mid", "long"]);
    }

    #[test]
    fn feature_dims_flattens_channels() {
        let dir = tempdir().unwrap();
        let two_d = dir.path().join("two.fbank.npy");
        write_npy(&two_d, &Array2::<f32>::zeros((7, 40))).unwrap();
        assert_eq!(feature_dims(&two_d).unwrap(), 40);

        let three_d = dir.path().join("three.fbank.npy");
        write_npy(&three_d, &Array3::<f32>::zeros((7, 3, 40))).unwrap();
        assert_eq!(feature_dims(&three_d).unwrap(), 120);
    }

    #[test]
    fn unexpected_rank_is_rejected() {
        let dir = tempdir().unwrap();
        let one_d = dir.path().join("flat.fbank.npy");
        write_npy(&one_d, &Array1::<f32>::zeros(9)).unwrap();
        let err = feature_dims(&one_d).unwrap_err();
        assert!(matches!(
            err,
            CorpusError::UnsupportedFeatureShape { shape, .. } if shape == vec![9]
        ));
    }

    #[test]
    fn missing_artifact_surfaces_a_feature_error() {
        let dir = tempdir().unwrap();
        let err =
            feature_frame_count(&feature_path(dir.path(), "ghost", "fbank")).unwrap_err();
        assert!(matches!(err, CorpusError::Feature(_)));
    }
}
