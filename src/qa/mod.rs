//! Yes/no question answering fine-tuning driver for a seq2seq model.

pub mod checkpoint;
pub mod dataset;
pub mod evaluate;
pub mod trainer;

use std::path::PathBuf;

use thiserror::Error;

use crate::config::{env_bool, env_f64, env_string, env_u64, env_usize, split_list};
use crate::model::{ModelError, OptimizerSettings};
use crate::registry::RegistryError;
use crate::report::ReportError;
use crate::tokenizer::TokenizerError;

pub use checkpoint::CheckpointKeeper;
pub use dataset::{QaSample, YesNoDataset};
pub use evaluate::{evaluate_all, test_model, EvaluationReport};
pub use trainer::{train_model, EpochLoss, LossHistory};

const DEFAULT_QA_MODEL: &str = "t5-base";
const DEFAULT_TRAIN_DATA: &str = "csv/train_no_animals_and_fruits_questions.csv";
const DEFAULT_DEV_DATA: &str = "csv/val_no_animals_and_fruits_questions.csv";
const DEFAULT_TEST_FILES: &str = "csv/animals_can_fly_questions.csv,csv/animals_cant_fly_questions.csv";

#[derive(Debug, Error)]
pub enum QaError {
    #[error("dataset {path} has no rows")]
    EmptyDataset { path: String },
    #[error("checkpoint file error at {path}: {source}")]
    Checkpoint {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("backend returned {actual} generations for a batch of {expected}")]
    GenerationCount { expected: usize, actual: usize },
    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone)]
pub struct QaConfig {
    pub model_name: String,
    pub train: bool,
    pub log_level: String,
    pub backend_endpoint: String,
    pub model_cache_dir: Option<PathBuf>,
    pub artifact_root: PathBuf,
    pub train_data: PathBuf,
    pub dev_data: PathBuf,
    pub test_files: Vec<PathBuf>,
    pub checkpoint: Option<PathBuf>,
    pub max_epochs: usize,
    pub batch_size: usize,
    pub max_length: usize,
    pub lr: f64,
    pub weight_decay: f64,
    pub adam_epsilon: f64,
    pub warmup_steps: usize,
    pub gradient_clip_val: f64,
    pub gradient_accumulation_steps: usize,
    pub save_top_k: usize,
    pub seed: u64,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_QA_MODEL.to_string(),
            train: true,
            log_level: "info".to_string(),
            backend_endpoint: "http://127.0.0.1:8500".to_string(),
            model_cache_dir: None,
            artifact_root: PathBuf::from("."),
            train_data: PathBuf::from(DEFAULT_TRAIN_DATA),
            dev_data: PathBuf::from(DEFAULT_DEV_DATA),
            test_files: split_list(DEFAULT_TEST_FILES).into_iter().map(PathBuf::from).collect(),
            checkpoint: None,
            max_epochs: 30,
            batch_size: 8,
            max_length: 128,
            lr: 1e-4,
            weight_decay: 0.0,
            adam_epsilon: 1e-8,
            warmup_steps: 0,
            gradient_clip_val: 1.0,
            gradient_accumulation_steps: 16,
            save_top_k: 5,
            seed: 42,
        }
    }
}

impl QaConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            model_name: env_string("QA_MODEL").unwrap_or(d.model_name),
            train: env_bool("QA_TRAIN").unwrap_or(d.train),
            log_level: std::env::var("RUST_LOG").unwrap_or(d.log_level),
            backend_endpoint: env_string("MODEL_BACKEND_ENDPOINT").unwrap_or(d.backend_endpoint),
            model_cache_dir: env_string("MODEL_CACHE_DIR").map(PathBuf::from),
            artifact_root: env_string("ARTIFACT_ROOT").map(PathBuf::from).unwrap_or(d.artifact_root),
            train_data: env_string("QA_TRAIN_DATA").map(PathBuf::from).unwrap_or(d.train_data),
            dev_data: env_string("QA_DEV_DATA").map(PathBuf::from).unwrap_or(d.dev_data),
            test_files: env_string("QA_TEST_FILES")
                .map(|v| split_list(&v).into_iter().map(PathBuf::from).collect())
                .unwrap_or(d.test_files),
            checkpoint: env_string("QA_CHECKPOINT").map(PathBuf::from),
            max_epochs: env_usize("QA_MAX_EPOCHS").unwrap_or(d.max_epochs),
            batch_size: env_usize("QA_BATCH_SIZE").filter(|&b| b > 0).unwrap_or(d.batch_size),
            max_length: env_usize("QA_MAX_LENGTH").unwrap_or(d.max_length),
            lr: env_f64("QA_LR").unwrap_or(d.lr),
            weight_decay: env_f64("QA_WEIGHT_DECAY").unwrap_or(d.weight_decay),
            adam_epsilon: env_f64("QA_ADAM_EPSILON").unwrap_or(d.adam_epsilon),
            warmup_steps: env_usize("QA_WARMUP_STEPS").unwrap_or(d.warmup_steps),
            gradient_clip_val: env_f64("QA_GRADIENT_CLIP_VAL").unwrap_or(d.gradient_clip_val),
            gradient_accumulation_steps: env_usize("QA_GRADIENT_ACCUMULATION_STEPS")
                .filter(|&s| s > 0)
                .unwrap_or(d.gradient_accumulation_steps),
            save_top_k: env_usize("QA_SAVE_TOP_K").unwrap_or(d.save_top_k),
            seed: env_u64("QA_SEED").unwrap_or(d.seed),
        }
    }

    pub fn optimizer_settings(&self, total_steps: usize) -> OptimizerSettings {
        OptimizerSettings {
            lr: self.lr,
            weight_decay: self.weight_decay,
            adam_epsilon: self.adam_epsilon,
            warmup_steps: self.warmup_steps,
            total_steps,
            gradient_clip_val: self.gradient_clip_val,
        }
    }
}
