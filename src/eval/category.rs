//! Category accuracy sweep over "A <entity> is a type of <mask>." sentences.

use std::path::PathBuf;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use super::MetricError;
use crate::model::{MaskedLmBackend, MaskedLanguageModel, Prediction};
use crate::report::artifacts::{file_stem_for, write_csv_records};
use crate::report::histogram::{save_histogram, HistogramSeries};
use crate::report::ArtifactLayout;
use crate::store::{generate_is_a_sentences, EntityStore, IsASentence, CATEGORY_MASK, ENTITY_MASK};
use crate::tokenizer::TokenVocab;

/// 1-based word position of the mask in the is-a template.
pub const IS_A_MASK_INDEX: usize = 7;

pub fn is_a_template(mask_token: &str) -> String {
    format!("A {ENTITY_MASK} is a type of {mask_token}.")
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepRow {
    pub index: usize,
    pub source: IsASentence,
    pub top_k: Vec<String>,
    pub prediction: String,
    pub probability: f32,
    /// False when the category name occurs inside the subject word.
    pub scored: bool,
}

impl SweepRow {
    pub fn is_correct(&self) -> bool {
        self.scored && self.prediction == self.source.category
    }

    pub fn subject(&self) -> &str {
        subject_word(&self.source.sentence)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryReport {
    pub category: String,
    pub base_sentence: String,
    pub top_k: usize,
    pub rows: Vec<SweepRow>,
}

impl CategoryReport {
    /// Correct rows over all rows, unscored ones included; 0 for an empty category.
    pub fn accuracy(&self) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        let correct = self.rows.iter().filter(|r| r.is_correct()).count();
        correct as f64 / self.rows.len() as f64
    }

    pub fn true_scores(&self) -> Vec<(String, f32)> {
        self.scores(true)
    }

    pub fn false_scores(&self) -> Vec<(String, f32)> {
        self.scores(false)
    }

    fn scores(&self, correct: bool) -> Vec<(String, f32)> {
        self.rows
            .iter()
            .filter(|r| r.scored && r.is_correct() == correct)
            .map(|r| (r.subject().to_string(), r.probability))
            .collect()
    }

    pub fn correct_rows(&self) -> impl Iterator<Item = &SweepRow> {
        self.rows.iter().filter(|r| r.is_correct())
    }
}

/// Second whitespace token of the sentence: the entity in the is-a template.
pub fn subject_word(sentence: &str) -> &str {
    sentence.split(' ').nth(1).unwrap_or("")
}

/// Picks the reported prediction for one row; returns `(prediction, probability, scored)`.
pub fn classify_row(category: &str, subject: &str, predictions: &[Prediction]) -> (String, f32, bool) {
    if subject.contains(category) {
        return (String::new(), 0.0, false);
    }
    if let Some(hit) = predictions.iter().find(|p| p.token == category) {
        return (category.to_string(), hit.probability, true);
    }
    match predictions.first() {
        Some(top) => (top.token.clone(), top.probability, true),
        None => (String::new(), 0.0, true),
    }
}

pub async fn sweep_category<B, T, S>(
    model: &MaskedLanguageModel<B, T>,
    store: &S,
    category: &str,
    k: usize,
) -> Result<CategoryReport, MetricError>
where
    B: MaskedLmBackend,
    T: TokenVocab,
    S: EntityStore,
{
    let base_sentence = is_a_template(model.tokenizer().mask_token());
    let data = generate_is_a_sentences(store, category, &base_sentence, ENTITY_MASK, CATEGORY_MASK).await?;

    let mut rows = Vec::with_capacity(data.len());
    for (index, source) in data.into_iter().enumerate() {
        let original_len = source.sentence.split(' ').count();
        let sentence = source.sentence.replace('_', " ");
        let mask_index = IS_A_MASK_INDEX + sentence.split(' ').count() - original_len;

        let predictions = model.predict(&sentence, mask_index, k).await?;
        let (prediction, probability, scored) =
            classify_row(category, subject_word(&source.sentence), &predictions);

        rows.push(SweepRow {
            index,
            top_k: predictions.into_iter().map(|p| p.token).collect(),
            prediction,
            probability,
            scored,
            source,
        });
    }

    let report = CategoryReport {
        category: category.to_string(),
        base_sentence,
        top_k: k,
        rows,
    };
    if report.rows.is_empty() {
        warn!(category, "no is-a rows for category");
    }
    info!(category, rows = report.rows.len(), accuracy = report.accuracy(), "category sweep finished");
    Ok(report)
}

/// Sweeps every category and writes its histogram and filtered CSV. A store
/// failure skips that category after `backoff`; model failures abort.
pub async fn filter_data_by_category<B, T, S>(
    model: &MaskedLanguageModel<B, T>,
    store: &S,
    layout: &ArtifactLayout,
    categories: &[String],
    k: usize,
    backoff: Duration,
) -> Result<Vec<CategoryReport>, MetricError>
where
    B: MaskedLmBackend,
    T: TokenVocab,
    S: EntityStore,
{
    let mut reports = Vec::with_capacity(categories.len());
    for category in categories {
        match sweep_category(model, store, category, k).await {
            Ok(report) => {
                write_category_artifacts(layout, model.model_name(), &report)?;
                reports.push(report);
            }
            Err(MetricError::Store(e)) => {
                warn!(category = %category, error = %e, backoff_secs = backoff.as_secs(), "is-a lookup failed, backing off");
                sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(reports)
}

pub fn category_csv_path(layout: &ArtifactLayout, model_name: &str, category: &str) -> PathBuf {
    layout.csv(&format!("{}_{category}.csv", file_stem_for(model_name)))
}

pub fn category_graph_path(layout: &ArtifactLayout, model_name: &str, category: &str) -> PathBuf {
    layout.graph(&format!("{}_{category}.svg", file_stem_for(model_name)))
}

/// Histogram of prediction probabilities split by correctness and a CSV of
/// the correctly predicted rows.
pub fn write_category_artifacts(
    layout: &ArtifactLayout,
    model_name: &str,
    report: &CategoryReport,
) -> Result<(PathBuf, PathBuf), MetricError> {
    let title = format!(
        "{model_name} P[{}| {}]\n Accuracy={}",
        report.category,
        report.base_sentence,
        report.accuracy()
    );
    let false_values: Vec<f64> = report.false_scores().iter().map(|s| s.1 as f64).collect();
    let true_values: Vec<f64> = report.true_scores().iter().map(|s| s.1 as f64).collect();
    let graph_path = category_graph_path(layout, model_name, &report.category);
    save_histogram(
        &graph_path,
        &title,
        &[
            HistogramSeries { label: "False Prediction", color: "red", opacity: 1.0, values: &false_values },
            HistogramSeries { label: "True Prediction", color: "blue", opacity: 0.4, values: &true_values },
        ],
    )?;

    let header = vec![
        String::new(),
        format!("top_{}_predictions", report.top_k),
        "prediction".to_string(),
        "prediction_probability".to_string(),
        "name".to_string(),
        "category".to_string(),
        "sentence".to_string(),
    ];

    let records: Vec<Vec<String>> = report
        .correct_rows()
        .map(|row| {
            vec![
                row.index.to_string(),
                serde_json::to_string(&row.top_k).unwrap_or_default(),
                row.prediction.clone(),
                row.probability.to_string(),
                row.source.name.clone(),
                row.source.category.clone(),
                row.source.sentence.clone(),
            ]
        })
        .collect();

    let csv_path = category_csv_path(layout, model_name, &report.category);
    write_csv_records(&csv_path, &header, &records)?;
    info!(csv = %csv_path.display(), graph = %graph_path.display(), "category artifacts written");
    Ok((csv_path, graph_path))
}
