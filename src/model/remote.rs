//! JSON-over-HTTP bridge to a model-serving process that hosts the actual
//! transformer checkpoint.

use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::http::{send_json, RetryPolicy};

use super::{Logits, MaskedLmBackend, ModelError, OptimizerSettings, Seq2SeqBackend, Seq2SeqBatch, TokenBatch};

const DEFAULT_TIMEOUT_MS: u64 = 300_000;
const RETRY: RetryPolicy = RetryPolicy::new(3, 200);

#[derive(Debug, Serialize)]
struct ForwardRequest<'a> {
    model: &'a str,
    input_ids: &'a [Vec<u32>],
    token_type_ids: &'a [Vec<u32>],
}

#[derive(Debug, Deserialize)]
struct ForwardResponse {
    logits: Vec<Vec<Vec<f32>>>,
}

#[derive(Debug, Serialize)]
struct ConfigureRequest<'a> {
    model: &'a str,
    #[serde(flatten)]
    settings: &'a OptimizerSettings,
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    model: &'a str,
    #[serde(flatten)]
    batch: &'a Seq2SeqBatch,
}

#[derive(Debug, Deserialize)]
struct LossResponse {
    loss: f32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    input_ids: &'a [Vec<u32>],
    attention_mask: &'a [Vec<u32>],
    max_length: usize,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    sequences: Vec<Vec<u32>>,
}

#[derive(Debug, Serialize)]
struct CheckpointRequest<'a> {
    model: &'a str,
    path: String,
}

#[derive(Debug, Serialize)]
struct ModelRequest<'a> {
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct Ack {
    #[serde(default = "default_ok")]
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

fn default_ok() -> bool {
    true
}

#[derive(Clone)]
pub struct RemoteBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl RemoteBackend {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn post<Req, Resp>(&self, route: &str, payload: &Req) -> Result<Resp, ModelError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/{}", self.endpoint, route.trim_start_matches('/'));
        send_json(RETRY, "model backend", || self.client.post(&url).json(payload))
            .await
            .map_err(|e| {
                tracing::error!(route, error = %e, "model backend request failed");
                ModelError::from(e)
            })
    }

    async fn acknowledge<Req: Serialize + ?Sized>(&self, route: &str, payload: &Req) -> Result<(), ModelError> {
        let ack: Ack = self.post(route, payload).await?;
        if ack.ok {
            Ok(())
        } else {
            Err(ModelError::Backend(ack.error.unwrap_or_else(|| format!("{route} rejected"))))
        }
    }
}

impl MaskedLmBackend for RemoteBackend {
    async fn forward(&self, batch: &TokenBatch) -> Result<Logits, ModelError> {
        let request = ForwardRequest {
            model: &self.model,
            input_ids: &batch.input_ids,
            token_type_ids: &batch.token_type_ids,
        };
        let response: ForwardResponse = self.post("forward", &request).await?;
        Logits::from_nested(response.logits)
    }
}

impl Seq2SeqBackend for RemoteBackend {
    async fn configure(&self, settings: &OptimizerSettings) -> Result<(), ModelError> {
        let request = ConfigureRequest {
            model: &self.model,
            settings,
        };
        self.acknowledge("configure", &request).await
    }

    async fn train_step(&self, batch: &Seq2SeqBatch) -> Result<f32, ModelError> {
        let request = BatchRequest { model: &self.model, batch };
        let response: LossResponse = self.post("train_step", &request).await?;
        Ok(response.loss)
    }

    async fn optimizer_step(&self) -> Result<(), ModelError> {
        self.acknowledge("optimizer_step", &ModelRequest { model: &self.model }).await
    }

    async fn validation_step(&self, batch: &Seq2SeqBatch) -> Result<f32, ModelError> {
        let request = BatchRequest { model: &self.model, batch };
        let response: LossResponse = self.post("validation_step", &request).await?;
        Ok(response.loss)
    }

    async fn generate(
        &self,
        input_ids: &[Vec<u32>],
        attention_mask: &[Vec<u32>],
        max_length: usize,
    ) -> Result<Vec<Vec<u32>>, ModelError> {
        let request = GenerateRequest {
            model: &self.model,
            input_ids,
            attention_mask,
            max_length,
        };
        let response: GenerateResponse = self.post("generate", &request).await?;
        Ok(response.sequences)
    }

    async fn save_checkpoint(&self, path: &Path) -> Result<(), ModelError> {
        let request = CheckpointRequest {
            model: &self.model,
            path: path.display().to_string(),
        };
        self.acknowledge("checkpoint/save", &request).await
    }

    async fn load_checkpoint(&self, path: &Path) -> Result<(), ModelError> {
        let request = CheckpointRequest {
            model: &self.model,
            path: path.display().to_string(),
        };
        self.acknowledge("checkpoint/load", &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_request_flattens_batch_fields() {
        let batch = Seq2SeqBatch {
            input_ids: vec![vec![1, 2]],
            attention_mask: vec![vec![1, 1]],
            labels: vec![vec![5, -100]],
        };
        let json = serde_json::to_value(BatchRequest { model: "t5-base", batch: &batch }).expect("serialize");
        assert_eq!(json["model"], "t5-base");
        assert_eq!(json["labels"], serde_json::json!([[5, -100]]));
    }

    #[test]
    fn ack_defaults_to_ok() {
        let ack: Ack = serde_json::from_str("{}").expect("parse");
        assert!(ack.ok);
    }

    #[test]
    fn endpoint_trailing_slash_trimmed() {
        let backend = RemoteBackend::new("http://localhost:8500/", "roberta-large");
        assert_eq!(backend.endpoint, "http://localhost:8500");
        assert_eq!(backend.model(), "roberta-large");
    }
}
