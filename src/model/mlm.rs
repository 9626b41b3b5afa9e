use serde::{Deserialize, Serialize};
use tracing::debug;

use super::logits::{restricted_softmax, softmax, top_k};
use super::{MaskedLmBackend, ModelError, TokenBatch};
use crate::tokenizer::TokenVocab;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub token: String,
    pub id: u32,
    pub probability: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultipleChoiceOutput {
    pub predictions: Vec<Prediction>,
    /// Probability assigned to the answer at the query's target index.
    pub target_probability: f32,
}

/// Masked language model with an attached tokenizer.
pub struct MaskedLanguageModel<B, T> {
    backend: B,
    tokenizer: T,
    model_name: String,
    multi_choice: bool,
    /// `vocab_size` from the model configuration; logits of any other width are rejected.
    vocab_size: Option<usize>,
}

impl<B: MaskedLmBackend, T: TokenVocab> MaskedLanguageModel<B, T> {
    pub fn new(backend: B, tokenizer: T, model_name: impl Into<String>, multi_choice: bool) -> Self {
        Self {
            backend,
            tokenizer,
            model_name: model_name.into(),
            multi_choice,
            vocab_size: None,
        }
    }

    pub fn with_vocab_size(mut self, vocab_size: usize) -> Self {
        self.vocab_size = Some(vocab_size);
        self
    }

    pub fn tokenizer(&self) -> &T {
        &self.tokenizer
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Encodes `sentence` and returns the ids together with the token position
    /// of the mask. `mask_index` is the 1-based word position of the mask; it
    /// is only used when the sentence does not already carry the mask token.
    pub fn encode_masked(&self, sentence: &str, mask_index: usize) -> Result<(Vec<u32>, usize), ModelError> {
        let mut ids = self.tokenizer.encode(sentence, true)?;
        let mask_id = self.tokenizer.mask_token_id();
        if let Some(position) = ids.iter().position(|&id| id == mask_id) {
            return Ok((ids, position));
        }

        let position = word_to_token_position(sentence, mask_index, ids.len())?;
        ids[position] = mask_id;
        Ok((ids, position))
    }

    /// Top-`k` predictions for the masked position over the full vocabulary.
    pub async fn predict(&self, sentence: &str, mask_index: usize, k: usize) -> Result<Vec<Prediction>, ModelError> {
        let (ids, position) = self.encode_masked(sentence, mask_index)?;
        let row = self.mask_row(ids, position).await?;
        let probabilities = softmax(&row);
        Ok(self.ranked(&probabilities, k))
    }

    /// Top-`k` predictions with probability mass restricted to `answers`.
    pub async fn predict_multiple_choice(
        &self,
        sentence: &str,
        mask_index: usize,
        answers: &[String],
        target_index: usize,
        k: usize,
    ) -> Result<MultipleChoiceOutput, ModelError> {
        if !self.multi_choice {
            return Err(ModelError::MultipleChoiceDisabled);
        }
        if answers.is_empty() {
            return Err(ModelError::EmptyAnswers);
        }
        if target_index >= answers.len() {
            return Err(ModelError::TargetOutOfRange {
                index: target_index,
                len: answers.len(),
            });
        }

        let legal = self.tokenizer.convert_tokens_to_ids(answers);
        let (ids, position) = self.encode_masked(sentence, mask_index)?;
        let row = self.mask_row(ids, position).await?;
        let probabilities = restricted_softmax(&row, &legal);

        let target_probability = probabilities
            .get(legal[target_index] as usize)
            .copied()
            .unwrap_or(0.0);
        let predictions = self.ranked(&probabilities, k);
        debug!(
            sentence,
            target = %answers[target_index],
            target_probability,
            top = predictions.first().map(|p| p.token.as_str()).unwrap_or(""),
            "multiple-choice query"
        );

        Ok(MultipleChoiceOutput {
            predictions,
            target_probability,
        })
    }

    async fn mask_row(&self, ids: Vec<u32>, position: usize) -> Result<Vec<f32>, ModelError> {
        let logits = self.backend.forward(&TokenBatch::single(ids)).await?;
        if let Some(expected) = self.vocab_size.filter(|&n| n != logits.vocab_size()) {
            return Err(ModelError::VocabMismatch {
                expected,
                actual: logits.vocab_size(),
            });
        }
        logits.row(0, position).map(<[f32]>::to_vec).ok_or(ModelError::MaskOutOfRange {
            index: position,
            len: logits.seq_len(),
        })
    }

    fn ranked(&self, probabilities: &[f32], k: usize) -> Vec<Prediction> {
        top_k(probabilities, k)
            .into_iter()
            .map(|(id, probability)| Prediction {
                token: self.tokenizer.display_token(id),
                id,
                probability,
            })
            .collect()
    }
}

/// Maps a 1-based word position to a token position, assuming one token per
/// word, one leading and one trailing special token, and a separate token for
/// a final period.
pub fn word_to_token_position(sentence: &str, mask_index: usize, token_count: usize) -> Result<usize, ModelError> {
    let word_count = sentence.split(' ').count() as isize;
    let mut position = mask_index as isize + token_count as isize - 2 - word_count;
    if sentence.ends_with('.') {
        position -= 1;
    }
    if position < 0 || position as usize >= token_count {
        return Err(ModelError::MaskOutOfRange {
            index: position.max(0) as usize,
            len: token_count,
        });
    }
    Ok(position as usize)
}
