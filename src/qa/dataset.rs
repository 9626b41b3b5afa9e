use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;
use tracing::info;

use super::QaError;
use crate::model::{Seq2SeqBatch, IGNORE_INDEX};
use crate::report::artifacts::read_csv_rows;
use crate::tokenizer::TokenVocab;

pub const YES: &str = "Yes";
pub const NO: &str = "No";

#[derive(Debug, Deserialize)]
struct QuestionRow {
    question: String,
    label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QaSample {
    pub question: String,
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub labels: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct YesNoDataset {
    samples: Vec<QaSample>,
    pad_token_id: u32,
    yes_count: usize,
    no_count: usize,
}

impl YesNoDataset {
    /// Reads a CSV with `question` and `label` columns.
    pub fn load<T: TokenVocab>(path: &Path, tokenizer: &T, max_length: usize) -> Result<Self, QaError> {
        let rows: Vec<QuestionRow> = read_csv_rows(path)?;
        if rows.is_empty() {
            return Err(QaError::EmptyDataset {
                path: path.display().to_string(),
            });
        }
        let dataset = Self::from_pairs(
            rows.into_iter().map(|r| (r.question, r.label)),
            tokenizer,
            max_length,
        )?;
        info!(
            path = %path.display(),
            questions = dataset.len(),
            yes = dataset.yes_count,
            no = dataset.no_count,
            "loaded yes/no dataset"
        );
        Ok(dataset)
    }

    pub fn from_pairs<T, I>(pairs: I, tokenizer: &T, max_length: usize) -> Result<Self, QaError>
    where
        T: TokenVocab,
        I: IntoIterator<Item = (String, String)>,
    {
        let pad = tokenizer.pad_token_id();
        let mut samples = Vec::new();
        let (mut yes_count, mut no_count) = (0, 0);

        for (question, label) in pairs {
            match label.as_str() {
                YES => yes_count += 1,
                NO => no_count += 1,
                _ => {}
            }
            let question_ids = tokenizer.encode(&question, true)?;
            let label_ids = tokenizer.encode(&format!("{label} </s>"), false)?;
            let (input_ids, attention_mask) = pad_with_mask(question_ids, max_length, pad);
            let (labels, _) = pad_with_mask(label_ids, max_length, pad);
            samples.push(QaSample {
                question,
                input_ids,
                attention_mask,
                labels,
            });
        }

        Ok(Self {
            samples,
            pad_token_id: pad,
            yes_count,
            no_count,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[QaSample] {
        &self.samples
    }

    pub fn yes_count(&self) -> usize {
        self.yes_count
    }

    pub fn no_count(&self) -> usize {
        self.no_count
    }

    pub fn batch_count(&self, batch_size: usize) -> usize {
        self.len().div_ceil(batch_size.max(1))
    }

    /// Batches following `order`, the last one possibly short.
    pub fn batches(&self, order: &[usize], batch_size: usize) -> Vec<Seq2SeqBatch> {
        order
            .chunks(batch_size.max(1))
            .map(|chunk| {
                let samples: Vec<&QaSample> = chunk.iter().filter_map(|&i| self.samples.get(i)).collect();
                collate(&samples, self.pad_token_id)
            })
            .collect()
    }

    pub fn sequential_batches(&self, batch_size: usize) -> Vec<Seq2SeqBatch> {
        let order: Vec<usize> = (0..self.len()).collect();
        self.batches(&order, batch_size)
    }
}

/// Truncates or pads `ids` to `max_length`; the mask marks real tokens.
pub fn pad_with_mask(mut ids: Vec<u32>, max_length: usize, pad: u32) -> (Vec<u32>, Vec<u32>) {
    ids.truncate(max_length);
    let real = ids.len();
    ids.resize(max_length, pad);
    let mut mask = vec![1; real];
    mask.resize(max_length, 0);
    (ids, mask)
}

/// Stacks samples into a batch; label padding becomes the loss ignore index.
pub fn collate(samples: &[&QaSample], pad_token_id: u32) -> Seq2SeqBatch {
    Seq2SeqBatch {
        input_ids: samples.iter().map(|s| s.input_ids.clone()).collect(),
        attention_mask: samples.iter().map(|s| s.attention_mask.clone()).collect(),
        labels: samples
            .iter()
            .map(|s| {
                s.labels
                    .iter()
                    .map(|&id| if id == pad_token_id { IGNORE_INDEX } else { id as i64 })
                    .collect()
            })
            .collect(),
    }
}

/// Epoch-dependent permutation so every epoch sees a different order while a
/// run stays reproducible for a given seed.
pub fn shuffled_indices(len: usize, seed: u64, epoch: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..len).collect();
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(epoch as u64));
    indices.shuffle(&mut rng);
    indices
}
