#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Disjointness auditing over resolved splits.
pub mod audit;
/// Corpus assembly configuration.
pub mod config;
/// Centralized constants: directory layout, ratios, label conventions.
pub mod constants;
/// The corpus aggregate and its construction pipeline.
pub mod corpus;
/// Feature gating, length filtering, and artifact inspection.
pub mod features;
/// Label/index bijection and segmentation interface.
pub mod labels;
/// Split manifests as plain-text prefix lists.
pub mod manifest;
/// Deterministic partitioning and manifest reconciliation.
pub mod splitter;
/// Raw utterance records and preprocessing passes.
pub mod utterance;

mod errors;
mod hash;

pub use config::CorpusConfig;
pub use corpus::Corpus;
pub use errors::CorpusError;
pub use features::FeatureBackend;
pub use labels::{LabelIndex, LabelSegmenter};
pub use manifest::Split;
pub use splitter::SplitSet;
pub use utterance::{AudioExtractor, Utterance};
