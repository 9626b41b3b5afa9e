use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::dataset::YesNoDataset;
use super::{QaConfig, QaError};
use crate::model::Seq2SeqBackend;
use crate::report::artifacts::write_csv_rows;
use crate::report::ArtifactLayout;
use crate::tokenizer::TokenVocab;

/// Yes/no answers fit in one generated token plus the decoder start.
pub const ANSWER_MAX_LENGTH: usize = 2;
pub const RESULTS_DIR: &str = "results";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRow {
    pub question: String,
    pub model_answer: String,
    pub true_answer: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    pub test_file: PathBuf,
    pub results_path: PathBuf,
    pub correct: usize,
    pub total: usize,
}

impl EvaluationReport {
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

/// `csv/animals_can_fly_questions.csv` -> `csv/results/animals_can_fly_questions_result.csv`.
pub fn results_path(layout: &ArtifactLayout, test_file: &Path) -> PathBuf {
    let stem = test_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "questions".to_string());
    layout.csv(RESULTS_DIR).join(format!("{stem}_result.csv"))
}

/// Answers every question of `test_file` by greedy generation and compares
/// the decoded answer with the decoded label.
pub async fn test_model<B, T>(
    backend: &B,
    tokenizer: &T,
    config: &QaConfig,
    layout: &ArtifactLayout,
    test_file: &Path,
) -> Result<EvaluationReport, QaError>
where
    B: Seq2SeqBackend,
    T: TokenVocab,
{
    let dataset = YesNoDataset::load(&layout.resolve(test_file), tokenizer, config.max_length)?;
    let mut rows = Vec::with_capacity(dataset.len());
    let mut correct = 0;

    for samples in dataset.samples().chunks(config.batch_size.max(1)) {
        let input_ids: Vec<Vec<u32>> = samples.iter().map(|s| s.input_ids.clone()).collect();
        let attention_mask: Vec<Vec<u32>> = samples.iter().map(|s| s.attention_mask.clone()).collect();
        let outputs = backend
            .generate(&input_ids, &attention_mask, ANSWER_MAX_LENGTH)
            .await?;
        if outputs.len() != samples.len() {
            return Err(QaError::GenerationCount {
                expected: samples.len(),
                actual: outputs.len(),
            });
        }

        for (sample, output) in samples.iter().zip(&outputs) {
            let model_answer = tokenizer.decode(output, true)?.trim().to_string();
            let true_answer = tokenizer.decode(&sample.labels, true)?.trim().to_string();
            debug!(question = %sample.question, model_answer = %model_answer, true_answer = %true_answer, "answered");
            if model_answer == true_answer {
                correct += 1;
            }
            rows.push(AnswerRow {
                question: sample.question.clone(),
                model_answer,
                true_answer,
            });
        }
    }

    let results_path = results_path(layout, test_file);
    write_csv_rows(&results_path, &rows)?;
    let report = EvaluationReport {
        test_file: test_file.to_path_buf(),
        results_path,
        correct,
        total: rows.len(),
    };
    info!(
        test_file = %test_file.display(),
        results = %report.results_path.display(),
        accuracy = report.accuracy(),
        "evaluation finished"
    );
    Ok(report)
}

/// Loads the configured checkpoint once, then evaluates every test file in order.
pub async fn evaluate_all<B, T>(
    backend: &B,
    tokenizer: &T,
    config: &QaConfig,
    layout: &ArtifactLayout,
) -> Result<Vec<EvaluationReport>, QaError>
where
    B: Seq2SeqBackend,
    T: TokenVocab,
{
    if let Some(checkpoint) = &config.checkpoint {
        info!(checkpoint = %checkpoint.display(), "loading checkpoint for evaluation");
        backend.load_checkpoint(&layout.resolve(checkpoint)).await?;
    }
    let mut reports = Vec::with_capacity(config.test_files.len());
    for test_file in &config.test_files {
        reports.push(test_model(backend, tokenizer, config, layout, test_file).await?);
    }
    Ok(reports)
}
