use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::http::{send_json, HttpError, RetryPolicy};
use crate::store::{EntityStore, StoreError};

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_EDGE_LIMIT: usize = 100;
const RETRY: RetryPolicy = RetryPolicy::new(3, 500);
const LANGUAGE: &str = "en";

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: reqwest::StatusCode, body: String },
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<HttpError> for KnowledgeError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Request(e) => Self::Request(e),
            HttpError::Status { status, body } => Self::HttpStatus { status, body },
            HttpError::Json(e) => Self::Json(e),
        }
    }
}

/// Relation label (`IsA`, `HasA`, `CapableOf`, ...) to related English terms,
/// strongest edges first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConceptRecord {
    #[serde(flatten)]
    pub relations: BTreeMap<String, Vec<String>>,
}

impl ConceptRecord {
    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    pub fn related(&self, relation: &str) -> &[String] {
        self.relations.get(relation).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Structured knowledge about an entity string.
pub trait KnowledgeSource: Send + Sync {
    /// With `update_db`, a freshly fetched record is written back to the store.
    fn entity_information(
        &self,
        entity: &str,
        update_db: bool,
    ) -> impl Future<Output = Result<ConceptRecord, KnowledgeError>> + Send;
}

#[derive(Debug, Deserialize)]
struct EdgePage {
    #[serde(default)]
    edges: Vec<Edge>,
}

#[derive(Debug, Deserialize)]
struct Edge {
    rel: EdgeNode,
    start: EdgeNode,
    end: EdgeNode,
    #[serde(default)]
    weight: f64,
}

#[derive(Debug, Deserialize)]
struct EdgeNode {
    #[serde(default)]
    label: String,
    #[serde(default)]
    language: Option<String>,
}

impl EdgeNode {
    fn is_english(&self) -> bool {
        self.language.as_deref().map_or(true, |l| l == LANGUAGE)
    }
}

pub struct ConceptNetClient<S> {
    store: S,
    client: reqwest::Client,
    endpoint: String,
    edge_limit: usize,
}

impl<S: EntityStore> ConceptNetClient<S> {
    pub fn new(store: S, endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            store,
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            edge_limit: DEFAULT_EDGE_LIMIT,
        }
    }

    async fn fetch(&self, entity: &str) -> Result<ConceptRecord, KnowledgeError> {
        let term = entity.trim().to_lowercase().replace(' ', "_");
        let url = format!(
            "{}/c/{LANGUAGE}/{}?limit={}",
            self.endpoint,
            urlencoding::encode(&term),
            self.edge_limit
        );
        let page: EdgePage = send_json(RETRY, "conceptnet", || self.client.get(&url)).await?;
        Ok(record_from_edges(&term, page.edges))
    }
}

impl<S: EntityStore> KnowledgeSource for ConceptNetClient<S> {
    async fn entity_information(
        &self,
        entity: &str,
        update_db: bool,
    ) -> Result<ConceptRecord, KnowledgeError> {
        if let Some(cached) = self.store.load_concept(entity).await? {
            debug!(entity, "concept record served from store");
            return Ok(cached);
        }

        let record = self.fetch(entity).await?;
        if update_db {
            self.store.save_concept(entity, &record).await?;
            debug!(entity, relations = record.relations.len(), "concept record stored");
        }
        Ok(record)
    }
}

fn record_from_edges(term: &str, mut edges: Vec<Edge>) -> ConceptRecord {
    edges.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    let term_label = term.replace('_', " ");

    let mut relations: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for edge in edges {
        if !edge.start.is_english() || !edge.end.is_english() || edge.rel.label.is_empty() {
            continue;
        }
        let other = if edge.start.label.eq_ignore_ascii_case(&term_label) {
            edge.end.label
        } else {
            edge.start.label
        };
        if other.is_empty() || other.eq_ignore_ascii_case(&term_label) {
            continue;
        }
        let related = relations.entry(edge.rel.label).or_default();
        if !related.contains(&other) {
            related.push(other);
        }
    }
    ConceptRecord { relations }
}
