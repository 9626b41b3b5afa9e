//! Keeps the checkpoints with the lowest validation loss.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::QaError;
use crate::model::Seq2SeqBackend;

pub fn checkpoint_name(epoch: usize, step: usize) -> String {
    format!("checkpoint-epoch={epoch}-step={step}.ckpt")
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeptCheckpoint {
    pub path: PathBuf,
    pub val_loss: f32,
}

#[derive(Debug)]
pub struct CheckpointKeeper {
    dir: PathBuf,
    top_k: usize,
    kept: Vec<KeptCheckpoint>,
}

impl CheckpointKeeper {
    pub fn new(dir: impl Into<PathBuf>, top_k: usize) -> Self {
        Self {
            dir: dir.into(),
            top_k,
            kept: Vec::new(),
        }
    }

    pub fn best(&self) -> Option<&KeptCheckpoint> {
        self.kept.first()
    }

    fn qualifies(&self, val_loss: f32) -> bool {
        if self.top_k == 0 || val_loss.is_nan() {
            return false;
        }
        self.kept.len() < self.top_k
            || self.kept.last().is_some_and(|worst| val_loss < worst.val_loss)
    }

    /// Saves a checkpoint when `val_loss` ranks among the best `top_k`,
    /// deleting whichever file falls out of the ranking.
    pub async fn consider<B: Seq2SeqBackend>(
        &mut self,
        backend: &B,
        epoch: usize,
        step: usize,
        val_loss: f32,
    ) -> Result<Option<PathBuf>, QaError> {
        if !self.qualifies(val_loss) {
            debug!(epoch, step, val_loss, "checkpoint not in top k");
            return Ok(None);
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| QaError::Checkpoint {
                path: self.dir.display().to_string(),
                source,
            })?;
        let path = self.dir.join(checkpoint_name(epoch, step));
        backend.save_checkpoint(&path).await?;
        info!(path = %path.display(), val_loss, "checkpoint saved");

        self.kept.push(KeptCheckpoint {
            path: path.clone(),
            val_loss,
        });
        self.kept.sort_by(|a, b| a.val_loss.total_cmp(&b.val_loss));

        while self.kept.len() > self.top_k {
            if let Some(evicted) = self.kept.pop() {
                remove_checkpoint(&evicted.path).await?;
                debug!(path = %evicted.path.display(), val_loss = evicted.val_loss, "checkpoint evicted");
            }
        }
        Ok(Some(path))
    }
}

async fn remove_checkpoint(path: &Path) -> Result<(), QaError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(QaError::Checkpoint {
            path: path.display().to_string(),
            source,
        }),
    }
}
