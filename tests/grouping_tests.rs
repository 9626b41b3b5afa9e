mod common;

use std::time::Duration;

use common::{wordnet, write_wordnet, MemoryStore, StubKnowledge};
use lexprobe::eval::grouping::{group_entities, group_entities_using_wordnet, load_groups, save_groups};
use lexprobe::lexicon::{ConceptNetClient, ConceptRecord, KnowledgeSource, WordNet};
use lexprobe::store::EntityStore;

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Grouping
// ============================================================================

#[tokio::test]
async fn unresolved_entities_are_dropped() {
    let knowledge = StubKnowledge::default();
    let (groups, stats) = group_entities(&names(&["cat", "car"]), &wordnet(), &knowledge, Duration::ZERO).await;

    assert_eq!(stats.entities, 2);
    assert_eq!(stats.resolved, 1);
    assert_eq!(groups["animal"].entities, vec!["cat"]);
    assert_eq!(groups["animal"].knowledge.related("IsA"), ["animal".to_string()]);
    assert!(groups.values().all(|g| !g.entities.contains(&"car".to_string())));
}

#[tokio::test]
async fn every_hypernym_gets_the_entity_and_one_lookup() {
    let knowledge = StubKnowledge::default();
    let (groups, _) = group_entities(&names(&["cat", "dog", "robin"]), &wordnet(), &knowledge, Duration::ZERO).await;

    assert_eq!(groups["mammal"].entities, vec!["cat", "dog"]);
    assert_eq!(groups["animal"].entities, vec!["cat", "dog", "robin"]);
    assert_eq!(groups["bird"].entities, vec!["robin"]);
    assert_eq!(groups["entity"].entities.len(), 3);
    assert_eq!(knowledge.call_count(), groups.len());
}

#[tokio::test]
async fn failed_lookup_skips_only_that_hypernym() {
    let knowledge = StubKnowledge::failing_on(&["organism"]);
    let (groups, stats) = group_entities(&names(&["cat"]), &wordnet(), &knowledge, Duration::ZERO).await;

    assert_eq!(stats.lookup_failures, 1);
    assert!(!groups.contains_key("organism"));
    assert_eq!(groups["animal"].entities, vec!["cat"]);
    assert_eq!(groups["entity"].entities, vec!["cat"]);
}

#[tokio::test]
async fn groups_from_sweep_csv_round_trip_through_json() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_wordnet(dir.path());
    let wn = WordNet::open(dir.path()).expect("wordnet opens");

    let csv_path = dir.path().join("sweep.csv");
    std::fs::write(&csv_path, ",prediction,name,category\n0,animal,trout,animal\n1,animal,stone,animal\n")
        .expect("csv");

    let knowledge = StubKnowledge::default();
    let (groups, stats) = group_entities_using_wordnet(&csv_path, &wn, &knowledge, Duration::ZERO)
        .await
        .expect("grouping");
    assert_eq!(stats.resolved, 2);
    assert_eq!(groups["fish"].entities, vec!["trout"]);

    let json_path = dir.path().join("json/groups.json");
    save_groups(&json_path, &groups).expect("save");
    let raw = std::fs::read_to_string(&json_path).expect("json");
    assert!(raw.contains("\"IsA\""));
    assert_eq!(load_groups(&json_path).expect("load"), groups);
}

// ============================================================================
// Knowledge write-back
// ============================================================================

#[tokio::test]
async fn cached_records_skip_the_network() {
    let store = MemoryStore::default();
    let cached = ConceptRecord {
        relations: [("HasA".to_string(), vec!["fur".to_string()])].into_iter().collect(),
    };
    store.save_concept("cat", &cached).await.expect("seed");

    // unroutable endpoint: any request would fail
    let client = ConceptNetClient::new(store, "http://127.0.0.1:9");
    let record = client.entity_information("cat", true).await.expect("served from store");
    assert_eq!(record, cached);
}
