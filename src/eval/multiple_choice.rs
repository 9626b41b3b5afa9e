//! Multiple-choice overgeneralization test.
//!
//! For every correct answer and every combination of wrong answers, the
//! model chooses among `[correct] + combination` only. The chosen answer is
//! counted per correct answer, giving a confusion-style log that is rendered
//! as a heatmap.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::grouping::EntityGroups;
use super::MetricError;
use crate::model::{MaskedLmBackend, MaskedLanguageModel};
use crate::report::artifacts::write_json;
use crate::report::heatmap::save_heatmap;
use crate::report::{ArtifactLayout, ColorMap, HeatmapGrid};
use crate::tokenizer::TokenVocab;

pub const CORRECT_COLUMN: &str = "correct answer";
pub const OTHER_COLUMN: &str = "other";

/// Number of wrong answers offered next to the correct one. Written as `-1`
/// in test batteries when every wrong answer is offered at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum CombSize {
    All,
    Fixed(usize),
}

impl CombSize {
    pub fn resolve(self, available: usize) -> usize {
        match self {
            Self::All => available,
            Self::Fixed(n) => n,
        }
    }

    /// Directory label, `1_vs_3` or `1_vs_all`.
    pub fn label(self) -> String {
        format!("1_vs_{self}")
    }
}

impl fmt::Display for CombSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Fixed(n) => write!(f, "{n}"),
        }
    }
}

impl TryFrom<i64> for CombSize {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::All),
            n if n >= 0 => Ok(Self::Fixed(n as usize)),
            n => Err(format!("invalid combination size {n}, expected -1 or a non-negative integer")),
        }
    }
}

impl From<CombSize> for i64 {
    fn from(value: CombSize) -> Self {
        match value {
            CombSize::All => -1,
            CombSize::Fixed(n) => n as i64,
        }
    }
}

fn in_vocab<T: TokenVocab>(tokenizer: &T, word: &str) -> bool {
    tokenizer.convert_token_to_id(word) != tokenizer.unk_token_id()
}

pub fn filter_word_in_model_vocab<T, I, S>(tokenizer: &T, words: I) -> Vec<String>
where
    T: TokenVocab,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    words
        .into_iter()
        .filter(|w| in_vocab(tokenizer, w.as_ref()))
        .map(|w| w.as_ref().to_string())
        .collect()
}

pub fn filter_word_not_in_model_vocab<T, I, S>(tokenizer: &T, words: I) -> Vec<String>
where
    T: TokenVocab,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    words
        .into_iter()
        .filter(|w| !in_vocab(tokenizer, w.as_ref()))
        .map(|w| w.as_ref().to_string())
        .collect()
}

/// All `size`-element combinations of `items`, in lexicographic index order.
pub fn combinations<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    let n = items.len();
    if size > n {
        return Vec::new();
    }
    let mut indices: Vec<usize> = (0..size).collect();
    let mut out = Vec::new();
    loop {
        out.push(indices.iter().map(|&i| items[i].clone()).collect());

        // rightmost index that can still move forward
        let Some(i) = (0..size).rev().find(|&i| indices[i] != i + n - size) else {
            return out;
        };
        indices[i] += 1;
        for j in i + 1..size {
            indices[j] = indices[j - 1] + 1;
        }
    }
}

/// Adds the grouped entities of every class that names a group.
pub fn expand_classes(classes: &BTreeSet<String>, groups: &EntityGroups) -> BTreeSet<String> {
    let mut expanded = classes.clone();
    for class in classes {
        if let Some(group) = groups.get(class) {
            expanded.extend(group.entities.iter().cloned());
        }
    }
    expanded
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McTestLog {
    pub wrong_answers: Vec<String>,
    /// correct answer -> chosen answer -> count
    pub hits: BTreeMap<String, BTreeMap<String, u32>>,
}

impl McTestLog {
    pub fn record(&mut self, correct: &str, chosen: &str) {
        *self
            .hits
            .entry(correct.to_string())
            .or_default()
            .entry(chosen.to_string())
            .or_default() += 1;
    }

    pub fn heatmap_grid(&self) -> HeatmapGrid {
        let column_of: BTreeMap<&str, usize> = self
            .wrong_answers
            .iter()
            .enumerate()
            .map(|(i, w)| (w.as_str(), i + 1))
            .collect();
        let other = self.wrong_answers.len() + 1;

        let mut col_labels = Vec::with_capacity(other + 1);
        col_labels.push(CORRECT_COLUMN.to_string());
        col_labels.extend(self.wrong_answers.iter().cloned());
        col_labels.push(OTHER_COLUMN.to_string());

        let mut row_labels = Vec::with_capacity(self.hits.len());
        let mut cells = Vec::with_capacity(self.hits.len());
        for (correct, chosen) in &self.hits {
            let mut row = vec![0.0; other + 1];
            for (answer, &count) in chosen {
                let col = if answer == correct {
                    0
                } else {
                    column_of.get(answer.as_str()).copied().unwrap_or(other)
                };
                row[col] += count as f64;
            }
            row_labels.push(correct.clone());
            cells.push(row);
        }

        HeatmapGrid {
            row_labels,
            col_labels,
            cells,
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn mc_over_generalization_test<B, T>(
    model: &MaskedLanguageModel<B, T>,
    base_sent: &str,
    mask_index: usize,
    correct_classes: &BTreeSet<String>,
    incorrect_classes: &BTreeSet<String>,
    groups: &EntityGroups,
    comb_size: CombSize,
) -> Result<McTestLog, MetricError>
where
    B: MaskedLmBackend,
    T: TokenVocab,
{
    let tokenizer = model.tokenizer();
    let correct_answers = filter_word_in_model_vocab(tokenizer, &expand_classes(correct_classes, groups));
    let wrong_answers = filter_word_in_model_vocab(tokenizer, &expand_classes(incorrect_classes, groups));
    let wrong_combinations = combinations(&wrong_answers, comb_size.resolve(wrong_answers.len()));
    info!(
        sentence = base_sent,
        correct = correct_answers.len(),
        wrong = wrong_answers.len(),
        combinations = wrong_combinations.len(),
        comb_size = %comb_size,
        "multiple-choice test"
    );

    let mut log = McTestLog {
        wrong_answers,
        hits: BTreeMap::new(),
    };
    for correct in &correct_answers {
        log.hits.entry(correct.clone()).or_default();
        for combination in &wrong_combinations {
            let mut answers = Vec::with_capacity(combination.len() + 1);
            answers.push(correct.clone());
            answers.extend(combination.iter().cloned());

            let output = model
                .predict_multiple_choice(base_sent, mask_index, &answers, 0, 1)
                .await?;
            let chosen = output
                .predictions
                .first()
                .map(|p| p.token.as_str())
                .unwrap_or_default();
            debug!(correct = %correct, chosen, "multiple-choice answer");
            log.record(correct, chosen);
        }
    }
    Ok(log)
}

pub fn mc_json_path(layout: &ArtifactLayout, output_name: &str, comb_size: CombSize) -> PathBuf {
    layout.json(&comb_size.label()).join(format!("{output_name}.json"))
}

pub fn mc_graph_path(layout: &ArtifactLayout, output_name: &str, comb_size: CombSize) -> PathBuf {
    layout.graph(&comb_size.label()).join(format!("{output_name}.svg"))
}

pub fn save_mc_artifacts(
    layout: &ArtifactLayout,
    log: &McTestLog,
    base_sent: &str,
    output_name: &str,
    comb_size: CombSize,
) -> Result<(PathBuf, PathBuf), MetricError> {
    let json_path = mc_json_path(layout, output_name, comb_size);
    write_json(&json_path, log)?;

    let graph_path = mc_graph_path(layout, output_name, comb_size);
    save_heatmap(
        &graph_path,
        &log.heatmap_grid(),
        base_sent,
        "All Answers",
        "Correct Answer",
        ColorMap::RdBu,
    )?;
    info!(json = %json_path.display(), graph = %graph_path.display(), "multiple-choice artifacts written");
    Ok((json_path, graph_path))
}
