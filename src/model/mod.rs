//! Model wrappers. Inference and training numerics stay with the external
//! framework; this module only moves token batches in and logits, losses and
//! generated ids out.

pub mod logits;
pub mod mlm;
pub mod remote;

use std::future::Future;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::HttpError;
use crate::tokenizer::TokenizerError;

pub use logits::Logits;
pub use mlm::{MaskedLanguageModel, MultipleChoiceOutput, Prediction};
pub use remote::RemoteBackend;

/// Label value ignored by the loss.
pub const IGNORE_INDEX: i64 = -100;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: reqwest::StatusCode, body: String },
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("logits shape mismatch: expected {expected} values, got {actual}")]
    Shape { expected: usize, actual: usize },
    #[error("ragged logits in sequence {sequence} (row {position:?}): expected {expected}, got {actual}")]
    RaggedLogits {
        sequence: usize,
        position: Option<usize>,
        expected: usize,
        actual: usize,
    },
    #[error("logits width {actual} does not match configured vocab_size {expected}")]
    VocabMismatch { expected: usize, actual: usize },
    #[error("mask position {index} outside sequence of length {len}")]
    MaskOutOfRange { index: usize, len: usize },
    #[error("multiple-choice restriction requested but the model was loaded without it")]
    MultipleChoiceDisabled,
    #[error("no legal answers in multiple-choice query")]
    EmptyAnswers,
    #[error("target index {index} outside {len} answers")]
    TargetOutOfRange { index: usize, len: usize },
    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<HttpError> for ModelError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Request(e) => Self::Request(e),
            HttpError::Status { status, body } => Self::HttpStatus { status, body },
            HttpError::Json(e) => Self::Json(e),
        }
    }
}

/// Batched encoder input for a masked-LM forward pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBatch {
    pub input_ids: Vec<Vec<u32>>,
    pub token_type_ids: Vec<Vec<u32>>,
}

impl TokenBatch {
    pub fn single(input_ids: Vec<u32>) -> Self {
        let token_type_ids = vec![vec![0; input_ids.len()]];
        Self {
            input_ids: vec![input_ids],
            token_type_ids,
        }
    }
}

pub trait MaskedLmBackend: Send + Sync {
    /// Per-position vocabulary logits for every sequence in the batch.
    fn forward(&self, batch: &TokenBatch) -> impl Future<Output = Result<Logits, ModelError>> + Send;
}

/// Padded encoder/decoder batch for sequence-to-sequence training.
/// Label positions equal to [`IGNORE_INDEX`] are excluded from the loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seq2SeqBatch {
    pub input_ids: Vec<Vec<u32>>,
    pub attention_mask: Vec<Vec<u32>>,
    pub labels: Vec<Vec<i64>>,
}

impl Seq2SeqBatch {
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerSettings {
    pub lr: f64,
    pub weight_decay: f64,
    pub adam_epsilon: f64,
    pub warmup_steps: usize,
    pub total_steps: usize,
    pub gradient_clip_val: f64,
}

pub trait Seq2SeqBackend: Send + Sync {
    fn configure(
        &self,
        settings: &OptimizerSettings,
    ) -> impl Future<Output = Result<(), ModelError>> + Send;

    /// Forward and backward pass; gradients accumulate until `optimizer_step`.
    fn train_step(&self, batch: &Seq2SeqBatch) -> impl Future<Output = Result<f32, ModelError>> + Send;

    fn optimizer_step(&self) -> impl Future<Output = Result<(), ModelError>> + Send;

    fn validation_step(
        &self,
        batch: &Seq2SeqBatch,
    ) -> impl Future<Output = Result<f32, ModelError>> + Send;

    /// Greedy decoding; each output holds at most `max_length` ids.
    fn generate(
        &self,
        input_ids: &[Vec<u32>],
        attention_mask: &[Vec<u32>],
        max_length: usize,
    ) -> impl Future<Output = Result<Vec<Vec<u32>>, ModelError>> + Send;

    fn save_checkpoint(&self, path: &Path) -> impl Future<Output = Result<(), ModelError>> + Send;

    fn load_checkpoint(&self, path: &Path) -> impl Future<Output = Result<(), ModelError>> + Send;
}
