//! Groups entities under their WordNet hypernyms, attaching a knowledge
//! record to each hypernym the first time it appears.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::MetricError;
use crate::lexicon::{ConceptRecord, KnowledgeSource, WordNet};
use crate::report::artifacts::{read_csv_column, read_json, write_json};

pub const ENTITY_COLUMN: &str = "name";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityGroup {
    pub entities: Vec<String>,
    #[serde(flatten)]
    pub knowledge: ConceptRecord,
}

pub type EntityGroups = BTreeMap<String, EntityGroup>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupingStats {
    pub entities: usize,
    pub resolved: usize,
    pub lookup_failures: usize,
}

pub async fn group_entities<K: KnowledgeSource>(
    entities: &[String],
    wordnet: &WordNet,
    knowledge: &K,
    backoff: Duration,
) -> (EntityGroups, GroupingStats) {
    let mut groups = EntityGroups::new();
    let mut stats = GroupingStats {
        entities: entities.len(),
        ..Default::default()
    };

    for entity in entities {
        let hypernyms = wordnet.entity_hypernyms(entity);
        if hypernyms.is_empty() {
            debug!(entity = %entity, "no hypernym, entity dropped");
            continue;
        }
        stats.resolved += 1;

        for hypernym in hypernyms {
            if !groups.contains_key(&hypernym) {
                match knowledge.entity_information(&hypernym, true).await {
                    Ok(record) => {
                        groups.insert(
                            hypernym.clone(),
                            EntityGroup {
                                entities: Vec::new(),
                                knowledge: record,
                            },
                        );
                    }
                    Err(e) => {
                        stats.lookup_failures += 1;
                        warn!(
                            entity = %entity,
                            hypernym = %hypernym,
                            error = %e,
                            backoff_secs = backoff.as_secs(),
                            "knowledge lookup failed, backing off"
                        );
                        sleep(backoff).await;
                        continue;
                    }
                }
            }
            if let Some(group) = groups.get_mut(&hypernym) {
                group.entities.push(entity.clone());
            }
        }
    }

    info!(
        entities = stats.entities,
        resolved = stats.resolved,
        groups = groups.len(),
        lookup_failures = stats.lookup_failures,
        "wordnet grouping finished"
    );
    (groups, stats)
}

/// Groups the entities listed in the `name` column of `csv_path`.
pub async fn group_entities_using_wordnet<K: KnowledgeSource>(
    csv_path: &Path,
    wordnet: &WordNet,
    knowledge: &K,
    backoff: Duration,
) -> Result<(EntityGroups, GroupingStats), MetricError> {
    let entities = read_csv_column(csv_path, ENTITY_COLUMN)?;
    Ok(group_entities(&entities, wordnet, knowledge, backoff).await)
}

pub fn save_groups(path: &Path, groups: &EntityGroups) -> Result<(), MetricError> {
    write_json(path, groups)?;
    Ok(())
}

pub fn load_groups(path: &Path) -> Result<EntityGroups, MetricError> {
    Ok(read_json(path)?)
}
