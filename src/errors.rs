use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error type for corpus assembly, manifest, and feature-artifact failures.
///
/// Every variant aborts corpus construction; nothing is caught and retried
/// internally. Overlap between splits is the one soft condition and is
/// reported through logging instead (see [`crate::audit`]).
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("required directory is missing: {0}")]
    Directory(PathBuf),
    #[error("manifest '{0}' exists but is empty; delete it or populate it")]
    CorruptManifest(PathBuf),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error(
        "corpus has no usable utterances: no prefix has both a WAV in '{}' \
         and a transcription in '{}' with extension '.{label_type}'",
        wav_dir.display(),
        label_dir.display()
    )]
    EmptyCorpus {
        wav_dir: PathBuf,
        label_dir: PathBuf,
        label_type: String,
    },
    #[error(
        "unhandled manifest combination: train exists = {train}, valid exists = {valid}, \
         test exists = {test}"
    )]
    UnsupportedManifestState {
        train: bool,
        valid: bool,
        test: bool,
    },
    #[error("feature artifact '{}' has unsupported shape {shape:?}", path.display())]
    UnsupportedFeatureShape { path: PathBuf, shape: Vec<usize> },
    #[error("unknown label token or index: {0}")]
    UnknownLabel(String),
    #[error("feature artifact failure: {0}")]
    Feature(String),
    #[error("snapshot failure: {0}")]
    Snapshot(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}
