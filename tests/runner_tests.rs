mod common;

use std::path::Path;
use std::time::Duration;

use common::{wordnet, MemoryStore, ScriptedMlm, StubKnowledge, WordVocab};
use lexprobe::config::{Config, ProbeTask};
use lexprobe::eval::grouping::load_groups;
use lexprobe::model::MaskedLanguageModel;
use lexprobe::report::ArtifactLayout;
use lexprobe::runner::groups_path;
use lexprobe::tokenizer::TokenVocab;
use lexprobe::{ProbeRun, RunError};

const WORDS: &[&str] = &["animal", "cat", "dog", "car", "mammal", "bird", "robin", "can", "fly"];

const BATTERY: &str = r#"{
  "can_fly": {
    "mask_index": 1,
    "sentences": ["Birds can fly."],
    "correct_classes": ["robin"],
    "overgeneralize_classes": ["mammal"],
    "mc_overgeneralize_classes": ["mammal"],
    "comb_size": [1]
  }
}"#;

fn config(root: &Path, task: ProbeTask) -> Config {
    let tests_path = root.join("tests.json");
    std::fs::write(&tests_path, BATTERY).expect("battery");
    Config {
        model_name: "test-mlm".to_string(),
        multi_choice: true,
        task,
        log_level: "debug".to_string(),
        redis_url: "redis://127.0.0.1:6379/".to_string(),
        backend_endpoint: "http://127.0.0.1:8500".to_string(),
        conceptnet_endpoint: "http://127.0.0.1:9".to_string(),
        wordnet_dir: root.join("wordnet"),
        model_cache_dir: None,
        artifact_root: root.to_path_buf(),
        tests_path,
        test_name: None,
        categories: vec!["animal".to_string()],
        sweep_top_k: 3,
        metric_top_k: 5,
        lookup_backoff: Duration::ZERO,
    }
}

fn scripted() -> MaskedLanguageModel<ScriptedMlm, WordVocab> {
    let vocab = WordVocab::new(WORDS);
    let width = vocab.vocab_size();
    let backend = ScriptedMlm::new(width).with_default(&[
        (vocab.id("animal"), 6.0),
        (vocab.id("robin"), 5.0),
        (vocab.id("dog"), 4.0),
    ]);
    MaskedLanguageModel::new(backend, vocab, "test-mlm", true).with_vocab_size(width)
}

#[tokio::test]
async fn preprocess_then_multiple_choice() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = MemoryStore::default().with_category("animal", &["cat", "dog", "car"]);
    let knowledge = StubKnowledge::default();
    let wn = wordnet();
    let model = scripted();

    let preprocess_config = config(dir.path(), ProbeTask::Preprocess);
    let run = ProbeRun {
        config: &preprocess_config,
        model: &model,
        store: &store,
        knowledge: &knowledge,
        wordnet: &wn,
        layout: ArtifactLayout::new(dir.path()),
    };
    run.run().await.expect("preprocess");

    let groups = load_groups(&groups_path(&run.layout, "test-mlm", "animal")).expect("groups saved");
    assert_eq!(groups["mammal"].entities, vec!["cat", "dog"]);
    assert!(groups.values().all(|g| !g.entities.contains(&"car".to_string())));

    let mc_config = config(dir.path(), ProbeTask::MultipleChoice);
    let run = ProbeRun { config: &mc_config, ..run };
    run.run().await.expect("multiple choice");
    assert!(dir.path().join("json/1_vs_1/test-mlm_<mask>_can_fly.json").exists());
}

#[tokio::test]
async fn single_answer_task_writes_table() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = MemoryStore::default();
    let knowledge = StubKnowledge::default();
    let wn = wordnet();
    let model = scripted();
    let config = config(dir.path(), ProbeTask::SingleAnswer);

    ProbeRun {
        config: &config,
        model: &model,
        store: &store,
        knowledge: &knowledge,
        wordnet: &wn,
        layout: ArtifactLayout::new(dir.path()),
    }
    .run()
    .await
    .expect("single answer");
    assert!(dir
        .path()
        .join("graphs/overgeneralization_metric/test-mlm_overgeneralization_metric.svg")
        .exists());
}

#[tokio::test]
async fn multiple_choice_without_groups_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = MemoryStore::default();
    let knowledge = StubKnowledge::default();
    let wn = wordnet();
    let model = scripted();
    let config = config(dir.path(), ProbeTask::MultipleChoice);

    let err = ProbeRun {
        config: &config,
        model: &model,
        store: &store,
        knowledge: &knowledge,
        wordnet: &wn,
        layout: ArtifactLayout::new(dir.path()),
    }
    .run()
    .await
    .expect_err("groups missing");
    assert!(matches!(err, RunError::Metric(_)));
}
