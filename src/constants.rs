//! Centralized constants shared across the corpus pipeline.

/// Target-directory layout names required by collaborators.
pub mod layout {
    /// Subdirectory holding source or per-utterance audio.
    pub const WAV_DIR: &str = "wav";
    /// Subdirectory holding one transcription file per utterance.
    pub const LABEL_DIR: &str = "label";
    /// Subdirectory holding normalized audio and extracted feature artifacts.
    pub const FEAT_DIR: &str = "feat";
    /// Subdirectory of the feature dir holding untranscribed feature artifacts.
    pub const UNTRANSCRIBED_DIR: &str = "untranscribed";
    /// Optional manifest listing untranscribed prefixes.
    pub const UNTRANSCRIBED_MANIFEST: &str = "untranscribed_prefixes.txt";
    /// Serialized corpus snapshot filename.
    pub const SNAPSHOT_FILENAME: &str = "corpus.p";
    /// Extension of audio files in the WAV dir.
    pub const WAV_EXTENSION: &str = "wav";
    /// Extension of serialized feature artifacts.
    pub const FEATURE_EXTENSION: &str = "npy";
}

/// Split ratios and shuffle seeding.
pub mod splits {
    /// Fraction of the prefix universe assigned to training.
    pub const TRAIN_RATIO: f64 = 0.90;
    /// Fraction of the prefix universe assigned to validation.
    pub const VALID_RATIO: f64 = 0.05;
    /// Default shuffle seed; splits are reproducible for a fixed seed.
    pub const DEFAULT_SEED: u64 = 0;
}

/// Label-index conventions.
pub mod labels {
    /// Reserved padding token.
    pub const PAD_LABEL: &str = "pad";
    /// Index the padding token always occupies.
    pub const PAD_INDEX: usize = 0;
}

/// Snapshot format versioning.
pub mod snapshot {
    /// Bumped whenever the snapshot schema changes shape.
    pub const SNAPSHOT_VERSION: u8 = 1;
}

/// Utterance preprocessing thresholds.
pub mod utterances {
    /// Utterances shorter than this are too short to train on and are dropped.
    pub const MIN_DURATION_MS: u64 = 300;
}
