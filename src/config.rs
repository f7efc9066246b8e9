use serde::{Deserialize, Serialize};

use crate::constants::splits::DEFAULT_SEED;

/// Corpus assembly configuration.
///
/// Describes the feature and label artifact naming plus the knobs that shape
/// the deterministic split: the seed and the per-utterance length cap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Speech feature type, used in artifact filenames (for example `"fbank"`
    /// for log Mel filterbank features).
    pub feat_type: String,
    /// Transcription tokenization, used in label filenames (for example
    /// `"phonemes"` or `"tones"`).
    pub label_type: String,
    /// Maximum number of time steps an utterance's feature artifact may have.
    /// Longer utterances are excluded when computing splits; excessively long
    /// sequences destabilize sequence-model training.
    pub max_samples: usize,
    /// Seed for the deterministic prefix shuffle.
    pub seed: u64,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            feat_type: "fbank".to_string(),
            label_type: "phonemes".to_string(),
            max_samples: 1000,
            seed: DEFAULT_SEED,
        }
    }
}
