//! Raw utterance records and the preprocessing passes applied before a
//! corpus is materialized from annotation data.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::utterances::MIN_DURATION_MS;
use crate::errors::CorpusError;

/// One transcribed span of a source recording, as produced by an upstream
/// annotation-format reader.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    /// Source recording this utterance is cut from.
    pub media_path: PathBuf,
    /// Unique identifier shared by the utterance's audio, feature, and
    /// transcription artifacts.
    pub prefix: String,
    /// Speaker attribution, when the annotation provides one.
    pub speaker: Option<String>,
    /// Span start within the source recording, in milliseconds.
    pub start_ms: u64,
    /// Span end within the source recording, in milliseconds.
    pub end_ms: u64,
    /// Transcription text; after segmentation, space-separated label tokens.
    pub text: String,
}

impl Utterance {
    /// Duration of the spanned audio in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// Extracts the audio span of one utterance into a standalone WAV file.
///
/// Collaborator interface: the corpus core decides which spans to cut and
/// where they land, not how audio is decoded.
pub trait AudioExtractor {
    /// Write the audio for `utterance` (from its `media_path` span) to `dst`.
    fn extract_utterance(&self, utterance: &Utterance, dst: &Path) -> Result<(), CorpusError>;
}

/// Drop utterances that duplicate an earlier one's span and text, keeping
/// first occurrences in order.
pub fn remove_duplicates(utterances: Vec<Utterance>) -> Vec<Utterance> {
    let mut seen: HashSet<(PathBuf, u64, u64, String)> = HashSet::new();
    utterances
        .into_iter()
        .filter(|utterance| {
            seen.insert((
                utterance.media_path.clone(),
                utterance.start_ms,
                utterance.end_ms,
                utterance.text.clone(),
            ))
        })
        .collect()
}

/// Drop utterances whose text is empty after trimming.
pub fn remove_empty_text(utterances: Vec<Utterance>) -> Vec<Utterance> {
    utterances
        .into_iter()
        .filter(|utterance| !utterance.text.trim().is_empty())
        .collect()
}

/// Drop utterances too short to be usable as training sequences.
pub fn remove_too_short(utterances: Vec<Utterance>) -> Vec<Utterance> {
    utterances
        .into_iter()
        .filter(|utterance| utterance.duration_ms() >= MIN_DURATION_MS)
        .collect()
}

/// Write one `<prefix>.<label_type>` transcription file per utterance.
///
/// Lazy: existing files are kept, so re-materializing a corpus does not
/// rewrite transcriptions that are already on disk.
pub fn write_transcriptions(
    utterances: &[Utterance],
    label_dir: &Path,
    label_type: &str,
) -> Result<(), CorpusError> {
    fs::create_dir_all(label_dir)?;
    for utterance in utterances {
        let path = label_dir.join(format!("{}.{label_type}", utterance.prefix));
        if path.is_file() {
            continue;
        }
        debug!(prefix = %utterance.prefix, "writing transcription");
        fs::write(&path, format!("{}\n", utterance.text))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn utterance(prefix: &str, start_ms: u64, end_ms: u64, text: &str) -> Utterance {
        Utterance {
            media_path: PathBuf::from("session1.wav"),
            prefix: prefix.to_string(),
            speaker: None,
            start_ms,
            end_ms,
            text: text.to_string(),
        }
    }

    #[test]
    fn duplicates_keep_first_occurrence() {
        let utterances = vec![
            utterance("u0", 0, 900, "p a t"),
            utterance("u1", 0, 900, "p a t"),
            utterance("u2", 900, 1800, "p a t"),
        ];
        let deduped = remove_duplicates(utterances);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].prefix, "u0");
        assert_eq!(deduped[1].prefix, "u2");
    }

    #[test]
    fn empty_text_and_short_spans_are_dropped() {
        let utterances = vec![
            utterance("u0", 0, 900, "  "),
            utterance("u1", 0, 100, "p a"),
            utterance("u2", 0, 900, "p a"),
        ];
        let kept = remove_too_short(remove_empty_text(utterances));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].prefix, "u2");
    }

    #[test]
    fn transcription_writes_are_lazy() {
        let dir = tempdir().unwrap();
        let label_dir = dir.path().join("label");
        let utterances = vec![utterance("u0", 0, 900, "p a t")];
        write_transcriptions(&utterances, &label_dir, "phonemes").unwrap();
        let path = label_dir.join("u0.phonemes");
        assert_eq!(fs::read_to_string(&path).unwrap(), "p a t\n");

        fs::write(&path, "edited by hand\n").unwrap();
        write_transcriptions(&utterances, &label_dir, "phonemes").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "edited by hand\n");
    }
}
