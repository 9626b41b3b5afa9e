//! Single-answer overgeneralization metric.
//!
//! Each top-k prediction is mapped to its WordNet class set (the word plus
//! every hypernym of every sense) and its probability is credited to one of
//! three buckets: an acceptable generalization, an over-generalization, or
//! anything else. Buckets are normalized to sum to one.
//!
//! Predictions without any synset cannot be classified. They are left out of
//! the buckets and reported through `unresolved_count` / `unresolved_mass`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::MetricError;
use crate::lexicon::WordNet;
use crate::model::{MaskedLmBackend, MaskedLanguageModel, Prediction};
use crate::tokenizer::TokenVocab;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Correct,
    Overgeneralization,
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OvergeneralizationScores {
    pub correct: f64,
    pub overgeneralization: f64,
    pub other: f64,
    pub unresolved_count: usize,
    pub unresolved_mass: f64,
}

impl OvergeneralizationScores {
    pub const COLUMNS: [&'static str; 3] = ["correct", "overgeneralization", "other"];

    pub fn as_row(&self) -> [f64; 3] {
        [self.correct, self.overgeneralization, self.other]
    }

    pub fn total(&self) -> f64 {
        self.correct + self.overgeneralization + self.other
    }
}

/// Generalization wins over over-generalization when a class set hits both.
pub fn classify(
    class_names: &BTreeSet<String>,
    generalization: &BTreeSet<String>,
    over_generalization: &BTreeSet<String>,
) -> Bucket {
    if !class_names.is_disjoint(generalization) {
        Bucket::Correct
    } else if !class_names.is_disjoint(over_generalization) {
        Bucket::Overgeneralization
    } else {
        Bucket::Other
    }
}

pub fn score_predictions(
    sentence: &str,
    predictions: &[Prediction],
    wordnet: &WordNet,
    generalization: &BTreeSet<String>,
    over_generalization: &BTreeSet<String>,
) -> Result<OvergeneralizationScores, MetricError> {
    let mut scores = OvergeneralizationScores::default();

    for prediction in predictions {
        let p = prediction.probability as f64;
        let Some(class_names) = wordnet.class_names(&prediction.token) else {
            scores.unresolved_count += 1;
            scores.unresolved_mass += p;
            continue;
        };
        let bucket = classify(&class_names, generalization, over_generalization);
        debug!(token = %prediction.token, p, ?bucket, "classified prediction");
        match bucket {
            Bucket::Correct => scores.correct += p,
            Bucket::Overgeneralization => scores.overgeneralization += p,
            Bucket::Other => scores.other += p,
        }
    }

    let normalization = scores.total();
    if normalization <= 0.0 {
        return Err(MetricError::NothingResolved {
            sentence: sentence.to_string(),
        });
    }
    scores.correct /= normalization;
    scores.overgeneralization /= normalization;
    scores.other /= normalization;
    Ok(scores)
}

pub async fn over_generalization_metric<B, T>(
    model: &MaskedLanguageModel<B, T>,
    wordnet: &WordNet,
    sentence: &str,
    mask_index: usize,
    k: usize,
    generalization: &BTreeSet<String>,
    over_generalization: &BTreeSet<String>,
) -> Result<OvergeneralizationScores, MetricError>
where
    B: MaskedLmBackend,
    T: TokenVocab,
{
    let predictions = model.predict(sentence, mask_index, k).await?;
    let scores = score_predictions(sentence, &predictions, wordnet, generalization, over_generalization)?;
    debug!(
        sentence,
        correct = scores.correct,
        overgeneralization = scores.overgeneralization,
        other = scores.other,
        unresolved = scores.unresolved_count,
        unresolved_mass = scores.unresolved_mass,
        "overgeneralization scores"
    );
    Ok(scores)
}
