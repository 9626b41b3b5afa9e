use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::checkpoint::CheckpointKeeper;
use super::dataset::{shuffled_indices, YesNoDataset};
use super::{QaConfig, QaError};
use crate::model::Seq2SeqBackend;
use crate::report::artifacts::write_json;
use crate::report::ArtifactLayout;
use crate::tokenizer::TokenVocab;

pub const TRAINING_LOSS_FILE: &str = "training_loss.json";
pub const VALIDATION_LOSS_FILE: &str = "validation_loss.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochLoss {
    pub epoch: usize,
    pub step: usize,
    pub loss: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossHistory {
    pub model_name: String,
    pub started_at: DateTime<Utc>,
    pub training: Vec<EpochLoss>,
    pub validation: Vec<EpochLoss>,
}

impl LossHistory {
    pub fn best_validation(&self) -> Option<&EpochLoss> {
        self.validation
            .iter()
            .filter(|e| !e.loss.is_nan())
            .min_by(|a, b| a.loss.total_cmp(&b.loss))
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

/// Optimizer steps per epoch with gradient accumulation; a trailing partial
/// accumulation window still steps.
pub fn optimizer_steps_per_epoch(batches: usize, accumulation: usize) -> usize {
    batches.div_ceil(accumulation.max(1))
}

pub async fn validate<B: Seq2SeqBackend>(
    backend: &B,
    dataset: &YesNoDataset,
    batch_size: usize,
) -> Result<f32, QaError> {
    let mut losses = Vec::with_capacity(dataset.batch_count(batch_size));
    for batch in dataset.sequential_batches(batch_size) {
        losses.push(backend.validation_step(&batch).await?);
    }
    Ok(mean(&losses))
}

/// Fine-tunes on the training split, validating after every epoch and
/// keeping the best checkpoints. Loss histories are written as JSON.
pub async fn train_model<B, T>(
    backend: &B,
    tokenizer: &T,
    config: &QaConfig,
    layout: &ArtifactLayout,
) -> Result<LossHistory, QaError>
where
    B: Seq2SeqBackend,
    T: TokenVocab,
{
    let train = YesNoDataset::load(&layout.resolve(&config.train_data), tokenizer, config.max_length)?;
    let dev = YesNoDataset::load(&layout.resolve(&config.dev_data), tokenizer, config.max_length)?;

    if let Some(checkpoint) = &config.checkpoint {
        info!(checkpoint = %checkpoint.display(), "resuming from checkpoint");
        backend.load_checkpoint(&layout.resolve(checkpoint)).await?;
    }

    let accumulation = config.gradient_accumulation_steps.max(1);
    let batches_per_epoch = train.batch_count(config.batch_size);
    let total_steps = optimizer_steps_per_epoch(batches_per_epoch, accumulation) * config.max_epochs;
    backend.configure(&config.optimizer_settings(total_steps)).await?;
    info!(
        model = %config.model_name,
        train = train.len(),
        dev = dev.len(),
        epochs = config.max_epochs,
        batches_per_epoch,
        total_steps,
        "training started"
    );

    let mut keeper = CheckpointKeeper::new(layout.checkpoint_dir(), config.save_top_k);
    let mut history = LossHistory {
        model_name: config.model_name.clone(),
        started_at: Utc::now(),
        training: Vec::with_capacity(config.max_epochs),
        validation: Vec::with_capacity(config.max_epochs),
    };
    let mut step = 0;

    for epoch in 0..config.max_epochs {
        let order = shuffled_indices(train.len(), config.seed, epoch);
        let batches = train.batches(&order, config.batch_size);
        let last = batches.len();
        let mut losses = Vec::with_capacity(last);

        for (i, batch) in batches.iter().enumerate() {
            let loss = backend.train_step(batch).await?;
            losses.push(loss);
            if (i + 1) % accumulation == 0 || i + 1 == last {
                backend.optimizer_step().await?;
                step += 1;
                debug!(epoch, step, loss, "optimizer step");
            }
        }

        let train_loss = mean(&losses);
        let val_loss = validate(backend, &dev, config.batch_size).await?;
        info!(epoch, step, train_loss, val_loss, "epoch finished");

        history.training.push(EpochLoss { epoch, step, loss: train_loss });
        history.validation.push(EpochLoss { epoch, step, loss: val_loss });
        keeper.consider(backend, epoch, step, val_loss).await?;
    }

    write_json(&layout.json(TRAINING_LOSS_FILE), &history.training)?;
    write_json(&layout.json(VALIDATION_LOSS_FILE), &history.validation)?;
    if let Some(best) = keeper.best() {
        info!(path = %best.path.display(), val_loss = best.val_loss, "best checkpoint");
    }
    Ok(history)
}
