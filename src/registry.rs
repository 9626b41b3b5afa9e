//! Pretrained model registry access.
//!
//! Models are addressed by their hub name (`roberta-large`, `t5-base`, ...).
//! Files are downloaded once into the hub cache and reused afterwards.

use std::path::{Path, PathBuf};

use hf_hub::api::tokio::{Api, ApiBuilder, ApiError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::tokenizer::{PretrainedTokenizer, TokenVocab, TokenizerError};

const TOKENIZER_FILE: &str = "tokenizer.json";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("hub request failed: {0}")]
    Hub(#[from] ApiError),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid model config: {0}")]
    Config(#[from] serde_json::Error),
    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),
    #[error("tokenizer has {tokenizer} tokens but the model config declares vocab_size {config}")]
    VocabSize { config: usize, tokenizer: usize },
    #[error("{token} token id {tokenizer} differs from the model config's {config}")]
    SpecialToken {
        token: &'static str,
        config: u32,
        tokenizer: u32,
    },
}

/// Subset of a transformer `config.json` used by the harness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub vocab_size: usize,
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub pad_token_id: Option<u32>,
}

impl ModelConfig {
    pub fn from_path(path: &Path) -> Result<Self, RegistryError> {
        let raw = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// The embedding matrix may be padded past the tokenizer, never the reverse.
    pub fn check_tokenizer<T: TokenVocab>(&self, tokenizer: &T) -> Result<(), RegistryError> {
        if tokenizer.vocab_size() > self.vocab_size {
            return Err(RegistryError::VocabSize {
                config: self.vocab_size,
                tokenizer: tokenizer.vocab_size(),
            });
        }
        if let Some(config) = self.pad_token_id.filter(|&id| id != tokenizer.pad_token_id()) {
            return Err(RegistryError::SpecialToken {
                token: "pad",
                config,
                tokenizer: tokenizer.pad_token_id(),
            });
        }
        Ok(())
    }
}

pub struct ModelRegistry {
    api: Api,
}

impl ModelRegistry {
    pub fn new(cache_dir: Option<PathBuf>) -> Result<Self, RegistryError> {
        let mut builder = ApiBuilder::new().with_progress(false);
        if let Some(dir) = cache_dir {
            builder = builder.with_cache_dir(dir);
        }
        Ok(Self { api: builder.build()? })
    }

    async fn fetch(&self, model_name: &str, file: &str) -> Result<PathBuf, RegistryError> {
        let path = self.api.model(model_name.to_string()).get(file).await?;
        info!(model = model_name, file, path = %path.display(), "resolved registry file");
        Ok(path)
    }

    pub async fn tokenizer(&self, model_name: &str) -> Result<PretrainedTokenizer, RegistryError> {
        let path = self.fetch(model_name, TOKENIZER_FILE).await?;
        Ok(PretrainedTokenizer::from_file(&path)?)
    }

    pub async fn config(&self, model_name: &str) -> Result<ModelConfig, RegistryError> {
        let path = self.fetch(model_name, CONFIG_FILE).await?;
        ModelConfig::from_path(&path)
    }

    /// Tokenizer and config of `model_name`, checked against each other.
    pub async fn load(&self, model_name: &str) -> Result<(PretrainedTokenizer, ModelConfig), RegistryError> {
        let tokenizer = self.tokenizer(model_name).await?;
        let config = self.config(model_name).await?;
        config.check_tokenizer(&tokenizer)?;
        info!(
            model = model_name,
            vocab_size = config.vocab_size,
            model_type = config.model_type.as_deref().unwrap_or("unknown"),
            "model config loaded"
        );
        Ok((tokenizer, config))
    }
}
