pub mod keys;

use std::future::Future;

use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::lexicon::conceptnet::ConceptRecord;

pub const ENTITY_MASK: &str = "<entity>";
pub const CATEGORY_MASK: &str = "<category>";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("corrupt record at {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One generated "is-a" row: the entity, the category it was pulled from and
/// the filled template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsASentence {
    pub name: String,
    pub category: String,
    pub sentence: String,
}

/// Backing datastore for category membership and cached knowledge records.
pub trait EntityStore: Send + Sync {
    /// Entity names filed under `category`. Multi-word names use `_`.
    fn category_entities(
        &self,
        category: &str,
    ) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    fn load_concept(
        &self,
        entity: &str,
    ) -> impl Future<Output = Result<Option<ConceptRecord>, StoreError>> + Send;

    fn save_concept(
        &self,
        entity: &str,
        record: &ConceptRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Fills `base_sent` for every entity of `category`, sorted by entity name so
/// repeated runs see rows in the same order.
pub async fn generate_is_a_sentences<S: EntityStore>(
    store: &S,
    category: &str,
    base_sent: &str,
    entity_mask: &str,
    category_mask: &str,
) -> Result<Vec<IsASentence>, StoreError> {
    let mut entities = store.category_entities(category).await?;
    entities.sort();
    entities.dedup();
    debug!(category, count = entities.len(), "loaded category entities");

    Ok(entities
        .into_iter()
        .map(|name| {
            let sentence = base_sent
                .replace(entity_mask, &name)
                .replace(category_mask, category);
            IsASentence {
                name,
                category: category.to_string(),
                sentence,
            }
        })
        .collect())
}

#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
}

impl RedisStore {
    pub fn new(connection: MultiplexedConnection) -> Self {
        Self { connection }
    }

    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let connection = client.get_multiplexed_tokio_connection().await?;
        Ok(Self::new(connection))
    }

    pub async fn is_connected(&self) -> bool {
        let mut conn = self.connection.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }
}

impl EntityStore for RedisStore {
    async fn category_entities(&self, category: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection.clone();
        let members: Vec<String> = conn.smembers(keys::category_entities_key(category)).await?;
        Ok(members)
    }

    async fn load_concept(&self, entity: &str) -> Result<Option<ConceptRecord>, StoreError> {
        let key = keys::concept_record_key(entity);
        let mut conn = self.connection.clone();
        let payload: Option<String> = conn.get(&key).await?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(|source| StoreError::Corrupt { key, source }))
            .transpose()
    }

    async fn save_concept(&self, entity: &str, record: &ConceptRecord) -> Result<(), StoreError> {
        let payload = serde_json::to_string(record)?;
        let mut conn = self.connection.clone();
        let _: () = conn.set(keys::concept_record_key(entity), payload).await?;
        Ok(())
    }
}
