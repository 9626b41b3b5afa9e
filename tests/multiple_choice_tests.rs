mod common;

use std::collections::BTreeSet;

use common::{ScriptedMlm, WordVocab};
use lexprobe::eval::battery::{run_mc_overgeneralization_metric, TestBattery};
use lexprobe::eval::grouping::{EntityGroup, EntityGroups};
use lexprobe::eval::multiple_choice::{
    combinations, expand_classes, filter_word_in_model_vocab, filter_word_not_in_model_vocab,
    mc_over_generalization_test, save_mc_artifacts, CombSize, McTestLog,
};
use lexprobe::eval::MetricError;
use lexprobe::model::{MaskedLanguageModel, ModelError};
use lexprobe::report::ArtifactLayout;
use lexprobe::tokenizer::TokenVocab;
use proptest::prelude::*;

const WORDS: &[&str] = &["bird", "robin", "sparrow", "mammal", "dog", "cat", "fish", "trout", "can", "fly"];

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn groups() -> EntityGroups {
    let group = |entities: &[&str]| EntityGroup {
        entities: entities.iter().map(|e| e.to_string()).collect(),
        ..Default::default()
    };
    EntityGroups::from([
        ("bird".to_string(), group(&["robin", "sparrow", "penguin"])),
        ("mammal".to_string(), group(&["dog", "cat"])),
    ])
}

/// Prefers "dog" above every bird and "robin" above the other mammals.
fn scripted(multi_choice: bool) -> MaskedLanguageModel<ScriptedMlm, WordVocab> {
    let vocab = WordVocab::new(WORDS);
    let backend = ScriptedMlm::new(vocab.vocab_size()).with_default(&[
        (vocab.id("dog"), 5.0),
        (vocab.id("robin"), 4.0),
        (vocab.id("sparrow"), 3.0),
        (vocab.id("bird"), 2.0),
        (vocab.id("cat"), 1.0),
        (vocab.id("mammal"), 0.5),
    ]);
    MaskedLanguageModel::new(backend, vocab, "test-mlm", multi_choice)
}

fn n_choose_k(n: usize, k: usize) -> usize {
    if k > n {
        return 0;
    }
    (0..k).fold(1, |acc, i| acc * (n - i) / (i + 1))
}

// ============================================================================
// Vocabulary filtering and combinations
// ============================================================================

#[test]
fn expansion_adds_group_members() {
    let expanded = expand_classes(&set(&["bird", "reptile"]), &groups());
    assert_eq!(expanded, set(&["bird", "penguin", "reptile", "robin", "sparrow"]));
}

#[test]
fn out_of_vocabulary_words_are_filtered() {
    let vocab = WordVocab::new(WORDS);
    let words = set(&["robin", "penguin", "dog"]);
    assert_eq!(filter_word_in_model_vocab(&vocab, &words), vec!["dog", "robin"]);
    assert_eq!(filter_word_not_in_model_vocab(&vocab, &words), vec!["penguin"]);
}

proptest! {
    #[test]
    fn vocab_filters_partition_input(words in prop::collection::vec("[a-z]{1,7}", 0..20)) {
        let vocab = WordVocab::new(WORDS);
        let known = filter_word_in_model_vocab(&vocab, &words);
        let unknown = filter_word_not_in_model_vocab(&vocab, &words);

        prop_assert_eq!(known.len() + unknown.len(), words.len());
        prop_assert!(known.iter().all(|w| !unknown.contains(w)));
        let mut merged: Vec<String> = known.into_iter().chain(unknown).collect();
        let mut expected = words.clone();
        merged.sort();
        expected.sort();
        prop_assert_eq!(merged, expected);
    }

    #[test]
    fn combination_count_is_binomial(n in 0usize..9, k in 0usize..10) {
        let items: Vec<usize> = (0..n).collect();
        let combs = combinations(&items, k);
        prop_assert_eq!(combs.len(), n_choose_k(n, k));
        prop_assert!(combs.iter().all(|c| c.len() == k && c.windows(2).all(|w| w[0] < w[1])));
    }
}

// ============================================================================
// Multiple-choice test
// ============================================================================

#[tokio::test]
async fn row_sums_equal_combination_count() {
    let model = scripted(true);
    for (comb_size, combos) in [(CombSize::Fixed(1), 3.0), (CombSize::Fixed(2), 3.0), (CombSize::All, 1.0)] {
        let log = mc_over_generalization_test(
            &model,
            "<mask> can fly.",
            1,
            &set(&["bird"]),
            &set(&["mammal"]),
            &groups(),
            comb_size,
        )
        .await
        .expect("mc test");

        // penguin is not in the vocabulary
        assert_eq!(log.hits.keys().cloned().collect::<Vec<_>>(), vec!["bird", "robin", "sparrow"]);
        assert_eq!(log.wrong_answers, vec!["cat", "dog", "mammal"]);
        assert_eq!(n_choose_k(3, comb_size.resolve(3)) as f64, combos);
        assert_eq!(log.heatmap_grid().row_sums(), vec![combos; 3], "{comb_size}");
    }
}

#[tokio::test]
async fn model_choices_land_in_the_right_columns() {
    let log = mc_over_generalization_test(
        &scripted(true),
        "<mask> can fly.",
        1,
        &set(&["robin"]),
        &set(&["dog", "cat"]),
        &EntityGroups::new(),
        CombSize::Fixed(1),
    )
    .await
    .expect("mc test");

    // robin vs cat -> robin, robin vs dog -> dog
    assert_eq!(log.hits["robin"]["robin"], 1);
    assert_eq!(log.hits["robin"]["dog"], 1);
    let grid = log.heatmap_grid();
    assert_eq!(grid.col_labels, vec!["correct answer", "cat", "dog", "other"]);
    assert_eq!(grid.cells, vec![vec![1.0, 0.0, 1.0, 0.0]]);
}

#[tokio::test]
async fn multiple_choice_requires_support() {
    let err = mc_over_generalization_test(
        &scripted(false),
        "<mask> can fly.",
        1,
        &set(&["robin"]),
        &set(&["dog"]),
        &EntityGroups::new(),
        CombSize::Fixed(1),
    )
    .await
    .expect_err("disabled");
    assert!(matches!(err, MetricError::Model(ModelError::MultipleChoiceDisabled)));
}

#[tokio::test]
async fn artifacts_follow_comb_size_directories() {
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = ArtifactLayout::new(dir.path());
    let mut log = McTestLog {
        wrong_answers: vec!["dog".to_string()],
        ..Default::default()
    };
    log.record("robin", "robin");

    let (json, graph) = save_mc_artifacts(&layout, &log, "<mask> can fly.", "m_<mask>_can_fly", CombSize::All)
        .expect("saved");
    assert_eq!(json, dir.path().join("json/1_vs_all/m_<mask>_can_fly.json"));
    assert_eq!(graph, dir.path().join("graphs/1_vs_all/m_<mask>_can_fly.svg"));
    let reloaded: McTestLog = serde_json::from_str(&std::fs::read_to_string(json).expect("json")).expect("log");
    assert_eq!(reloaded, log);
    let svg = std::fs::read_to_string(graph).expect("svg");
    assert!(svg.contains("All Answers"));
    assert!(svg.contains("Correct Answer"));
}

#[tokio::test]
async fn battery_runs_every_comb_size() {
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = ArtifactLayout::new(dir.path());
    let battery: TestBattery = serde_json::from_str(
        r#"{
            "can_fly": {"mask_index": 1, "sentences": ["Birds can fly."], "correct_classes": ["bird"],
                        "mc_overgeneralize_classes": ["mammal"], "comb_size": [1, -1]},
            "skipped": {"mask_index": 1, "sentences": ["Fish can swim."], "correct_classes": ["fish"]}
        }"#,
    )
    .expect("battery");

    let written = run_mc_overgeneralization_metric(&scripted(true), &layout, &battery, Some("can_fly"), &groups())
        .await
        .expect("battery runs");
    assert_eq!(written.len(), 2);
    assert!(dir.path().join("json/1_vs_1/test-mlm_<mask>_can_fly.json").exists());
    assert!(dir.path().join("graphs/1_vs_all/test-mlm_<mask>_can_fly.svg").exists());
}
