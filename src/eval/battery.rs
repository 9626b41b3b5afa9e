//! Overgeneralization test battery: loading and the two battery runners.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use super::grouping::EntityGroups;
use super::multiple_choice::{mc_over_generalization_test, save_mc_artifacts, CombSize};
use super::overgeneralization::{over_generalization_metric, OvergeneralizationScores};
use super::MetricError;
use crate::lexicon::WordNet;
use crate::model::{MaskedLmBackend, MaskedLanguageModel};
use crate::report::artifacts::{file_stem_for, write_json};
use crate::report::table::save_table;
use crate::report::ArtifactLayout;
use crate::tokenizer::TokenVocab;

pub const OVERGENERALIZATION_DIR: &str = "overgeneralization_metric";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OvergeneralizationTest {
    /// 1-based word position replaced by the mask token.
    pub mask_index: usize,
    pub sentences: Vec<String>,
    pub correct_classes: BTreeSet<String>,
    #[serde(default)]
    pub overgeneralize_classes: BTreeSet<String>,
    #[serde(default)]
    pub mc_overgeneralize_classes: BTreeSet<String>,
    #[serde(default = "default_comb_sizes", deserialize_with = "one_or_many")]
    pub comb_size: Vec<CombSize>,
}

fn default_comb_sizes() -> Vec<CombSize> {
    vec![CombSize::Fixed(1)]
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<CombSize>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(CombSize),
        Many(Vec<CombSize>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(size) => vec![size],
        OneOrMany::Many(sizes) => sizes,
    })
}

/// Test name -> test case.
pub type TestBattery = BTreeMap<String, OvergeneralizationTest>;

pub fn load_battery(path: &Path) -> Result<TestBattery, MetricError> {
    let raw = std::fs::read_to_string(path).map_err(|source| MetricError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| MetricError::Battery {
        path: path.display().to_string(),
        source,
    })
}

/// Tests selected by `test_name`; every test when no name is given.
pub fn selected_tests<'a>(
    battery: &'a TestBattery,
    test_name: Option<&'a str>,
) -> impl Iterator<Item = (&'a String, &'a OvergeneralizationTest)> + 'a {
    battery
        .iter()
        .filter(move |(name, _)| test_name.map_or(true, |wanted| wanted == name.as_str()))
}

/// Replaces the word at 1-based `mask_index` with `mask_token`, keeping any
/// trailing punctuation of the replaced word.
pub fn mask_sentence(sentence: &str, mask_index: usize, mask_token: &str) -> Result<String, MetricError> {
    let mut words: Vec<String> = sentence.split(' ').map(str::to_string).collect();
    let slot = mask_index
        .checked_sub(1)
        .and_then(|i| words.get_mut(i))
        .ok_or_else(|| MetricError::MaskIndex {
            sentence: sentence.to_string(),
            mask_index,
        })?;
    let punctuation: String = slot
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_punctuation())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    *slot = format!("{mask_token}{punctuation}");
    Ok(words.join(" "))
}

pub fn output_name(model_stem: &str, sentence: &str) -> String {
    format!("{model_stem}_{}", sentence.replace(' ', "_").replace('.', ""))
}

/// Runs the multiple-choice test for every selected sentence and combination
/// size and returns the written artifact paths.
pub async fn run_mc_overgeneralization_metric<B, T>(
    model: &MaskedLanguageModel<B, T>,
    layout: &ArtifactLayout,
    battery: &TestBattery,
    test_name: Option<&str>,
    groups: &EntityGroups,
) -> Result<Vec<(PathBuf, PathBuf)>, MetricError>
where
    B: MaskedLmBackend,
    T: TokenVocab,
{
    let stem = file_stem_for(model.model_name());
    let mask_token = model.tokenizer().mask_token().to_string();
    let mut written = Vec::new();

    for (name, test) in selected_tests(battery, test_name) {
        info!(test = %name, sentences = test.sentences.len(), "running multiple-choice test");
        for sentence in &test.sentences {
            let masked = mask_sentence(sentence, test.mask_index, &mask_token)?;
            let output = output_name(&stem, &masked);
            for &comb_size in &test.comb_size {
                let log = mc_over_generalization_test(
                    model,
                    &masked,
                    test.mask_index,
                    &test.correct_classes,
                    &test.mc_overgeneralize_classes,
                    groups,
                    comb_size,
                )
                .await?;
                written.push(save_mc_artifacts(layout, &log, &masked, &output, comb_size)?);
            }
        }
    }
    Ok(written)
}

/// Runs the single-answer metric over every selected sentence. Sentences with
/// no resolvable prediction are logged and skipped.
pub async fn run_overgeneralization_metric<B, T>(
    model: &MaskedLanguageModel<B, T>,
    wordnet: &WordNet,
    layout: &ArtifactLayout,
    battery: &TestBattery,
    test_name: Option<&str>,
    k: usize,
) -> Result<BTreeMap<String, OvergeneralizationScores>, MetricError>
where
    B: MaskedLmBackend,
    T: TokenVocab,
{
    let mask_token = model.tokenizer().mask_token().to_string();
    let mut test_log = BTreeMap::new();

    for (name, test) in selected_tests(battery, test_name) {
        info!(test = %name, sentences = test.sentences.len(), "running overgeneralization test");
        for sentence in &test.sentences {
            let masked = mask_sentence(sentence, test.mask_index, &mask_token)?;
            match over_generalization_metric(
                model,
                wordnet,
                &masked,
                test.mask_index,
                k,
                &test.correct_classes,
                &test.overgeneralize_classes,
            )
            .await
            {
                Ok(scores) => {
                    test_log.insert(masked, scores);
                }
                Err(MetricError::NothingResolved { sentence }) => {
                    warn!(sentence = %sentence, "no prediction resolved, sentence skipped");
                }
                Err(e) => return Err(e),
            }
        }
    }

    save_overgeneralization_log(layout, model.model_name(), &test_log)?;
    Ok(test_log)
}

pub fn save_overgeneralization_log(
    layout: &ArtifactLayout,
    model_name: &str,
    test_log: &BTreeMap<String, OvergeneralizationScores>,
) -> Result<(PathBuf, PathBuf), MetricError> {
    let file = format!("{}_overgeneralization_metric", file_stem_for(model_name));

    let json_path = layout.json(OVERGENERALIZATION_DIR).join(format!("{file}.json"));
    write_json(&json_path, test_log)?;

    let rows: Vec<String> = test_log.keys().cloned().collect();
    let cols: Vec<String> = OvergeneralizationScores::COLUMNS.iter().map(|c| c.to_string()).collect();
    let cells: Vec<Vec<String>> = test_log
        .values()
        .map(|scores| scores.as_row().iter().map(|v| format!("{v:.3}")).collect())
        .collect();
    let graph_path = layout.graph(OVERGENERALIZATION_DIR).join(format!("{file}.svg"));
    save_table(&graph_path, &rows, &cols, &cells)?;

    info!(json = %json_path.display(), graph = %graph_path.display(), sentences = test_log.len(), "overgeneralization log written");
    Ok((json_path, graph_path))
}
