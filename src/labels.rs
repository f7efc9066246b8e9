//! Bidirectional mapping between transcription tokens and integer indices.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use tracing::debug;

use crate::constants::labels::{PAD_INDEX, PAD_LABEL};
use crate::errors::CorpusError;
use crate::utterance::Utterance;

/// Segments a raw utterance's text into the token sequence used for training.
///
/// Implemented by collaborators that know the tokenization scheme (phonemes,
/// tones, characters, ...). A segmenter also carries the closed set of labels
/// its segmentation can produce.
pub trait LabelSegmenter {
    /// Return a copy of `utterance` with `text` rewritten as space-separated
    /// label tokens.
    fn segment_labels(&self, utterance: Utterance) -> Utterance;

    /// The set of label tokens this segmenter produces.
    fn labels(&self) -> BTreeSet<String>;
}

/// Bijection between label tokens and indices `0..=vocab_size`.
///
/// Labels are sorted lexicographically and the reserved `pad` token is
/// prepended at index 0, so the mapping is deterministic regardless of the
/// iteration order of the caller-supplied set.
#[derive(Clone, Debug)]
pub struct LabelIndex {
    label_to_index: IndexMap<String, usize>,
    index_to_label: Vec<String>,
    vocab_size: usize,
}

impl LabelIndex {
    /// Build the index from a label set.
    pub fn build<I>(labels: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let sorted: BTreeSet<String> = labels.into_iter().collect();
        let vocab_size = sorted.len();
        let mut index_to_label = Vec::with_capacity(vocab_size + 1);
        index_to_label.push(PAD_LABEL.to_string());
        index_to_label.extend(sorted);
        let label_to_index: IndexMap<String, usize> = index_to_label
            .iter()
            .enumerate()
            .map(|(index, label)| (label.clone(), index))
            .collect();
        debug!(vocab_size, "built label index");
        Self {
            label_to_index,
            index_to_label,
            vocab_size,
        }
    }

    /// Number of caller-supplied labels. The implicit `pad` entry is part of
    /// the index mapping but excluded from this count.
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// The indexed labels in index order, `pad` first.
    pub fn labels(&self) -> &[String] {
        &self.index_to_label
    }

    /// Look up the index for one label token.
    pub fn index_of(&self, label: &str) -> Result<usize, CorpusError> {
        self.label_to_index
            .get(label)
            .copied()
            .ok_or_else(|| CorpusError::UnknownLabel(label.to_string()))
    }

    /// Look up the label token at one index.
    pub fn label_at(&self, index: usize) -> Result<&str, CorpusError> {
        self.index_to_label
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| CorpusError::UnknownLabel(format!("index {index}")))
    }

    /// Convert a sequence of label tokens into their indices.
    pub fn labels_to_indices<S: AsRef<str>>(
        &self,
        labels: &[S],
    ) -> Result<Vec<usize>, CorpusError> {
        labels
            .iter()
            .map(|label| self.index_of(label.as_ref()))
            .collect()
    }

    /// Convert a sequence of indices into their label tokens.
    pub fn indices_to_labels(&self, indices: &[usize]) -> Result<Vec<String>, CorpusError> {
        indices
            .iter()
            .map(|index| self.label_at(*index).map(str::to_string))
            .collect()
    }
}
