//! Task orchestration for the probe driver.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::{Config, ProbeTask};
use crate::eval::battery::{load_battery, run_mc_overgeneralization_metric, run_overgeneralization_metric};
use crate::eval::category::{category_csv_path, filter_data_by_category};
use crate::eval::grouping::{group_entities_using_wordnet, load_groups, save_groups};
use crate::eval::{EntityGroups, MetricError};
use crate::lexicon::{KnowledgeError, KnowledgeSource, WordNet, WordNetError};
use crate::model::{MaskedLmBackend, MaskedLanguageModel, ModelError};
use crate::qa::QaError;
use crate::registry::RegistryError;
use crate::report::artifacts::file_stem_for;
use crate::report::{ArtifactLayout, ReportError};
use crate::store::{EntityStore, StoreError};
use crate::tokenizer::{TokenVocab, TokenizerError};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("no categories configured")]
    NoCategories,
    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    WordNet(#[from] WordNetError),
    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Metric(#[from] MetricError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Qa(#[from] QaError),
}

pub fn groups_path(layout: &ArtifactLayout, model_name: &str, category: &str) -> PathBuf {
    layout.json(&format!("{}_{category}_groups.json", file_stem_for(model_name)))
}

/// Unions groups from several categories; entity lists are merged without
/// duplicates and the first knowledge record seen for a hypernym is kept.
pub fn merge_groups(target: &mut EntityGroups, other: EntityGroups) {
    for (hypernym, group) in other {
        match target.get_mut(&hypernym) {
            Some(existing) => {
                for entity in group.entities {
                    if !existing.entities.contains(&entity) {
                        existing.entities.push(entity);
                    }
                }
            }
            None => {
                target.insert(hypernym, group);
            }
        }
    }
}

/// Everything one probe run needs, borrowed from `main` or a test harness.
pub struct ProbeRun<'a, B, T, S, K> {
    pub config: &'a Config,
    pub model: &'a MaskedLanguageModel<B, T>,
    pub store: &'a S,
    pub knowledge: &'a K,
    pub wordnet: &'a WordNet,
    pub layout: ArtifactLayout,
}

impl<B, T, S, K> ProbeRun<'_, B, T, S, K>
where
    B: MaskedLmBackend,
    T: TokenVocab,
    S: EntityStore,
    K: KnowledgeSource,
{
    pub async fn run(&self) -> Result<(), RunError> {
        info!(task = self.config.task.as_str(), model = self.model.model_name(), "starting probe run");
        match self.config.task {
            ProbeTask::Preprocess => {
                self.preprocess().await?;
            }
            ProbeTask::CategorySweep => {
                self.category_sweep().await?;
            }
            ProbeTask::MultipleChoice => self.multiple_choice().await?,
            ProbeTask::SingleAnswer => self.single_answer().await?,
        }
        info!(task = self.config.task.as_str(), "probe run finished");
        Ok(())
    }

    /// Sweeps the configured categories and returns their accuracies.
    pub async fn category_sweep(&self) -> Result<Vec<(String, f64)>, RunError> {
        if self.config.categories.is_empty() {
            return Err(RunError::NoCategories);
        }
        let reports = filter_data_by_category(
            self.model,
            self.store,
            &self.layout,
            &self.config.categories,
            self.config.sweep_top_k,
            self.config.lookup_backoff,
        )
        .await?;
        Ok(reports.iter().map(|r| (r.category.clone(), r.accuracy())).collect())
    }

    /// Sweep followed by WordNet grouping of every category CSV the sweep wrote.
    pub async fn preprocess(&self) -> Result<EntityGroups, RunError> {
        let swept = self.category_sweep().await?;
        let mut all = EntityGroups::new();

        for (category, accuracy) in swept {
            let csv_path = category_csv_path(&self.layout, self.model.model_name(), &category);
            let (groups, stats) = group_entities_using_wordnet(
                &csv_path,
                self.wordnet,
                self.knowledge,
                self.config.lookup_backoff,
            )
            .await?;
            let path = groups_path(&self.layout, self.model.model_name(), &category);
            save_groups(&path, &groups)?;
            info!(
                category = %category,
                accuracy,
                groups = groups.len(),
                resolved = stats.resolved,
                path = %path.display(),
                "entity groups saved"
            );
            merge_groups(&mut all, groups);
        }
        Ok(all)
    }

    pub fn load_groups(&self) -> Result<EntityGroups, RunError> {
        let mut all = EntityGroups::new();
        for category in &self.config.categories {
            let path = groups_path(&self.layout, self.model.model_name(), category);
            merge_groups(&mut all, load_groups(&path)?);
        }
        if all.is_empty() {
            warn!("entity groups are empty, classes will not be expanded");
        }
        Ok(all)
    }

    pub async fn multiple_choice(&self) -> Result<(), RunError> {
        let battery = load_battery(&self.config.tests_path)?;
        let groups = self.load_groups()?;
        let written = run_mc_overgeneralization_metric(
            self.model,
            &self.layout,
            &battery,
            self.config.test_name.as_deref(),
            &groups,
        )
        .await?;
        info!(tests = written.len(), "multiple-choice battery finished");
        Ok(())
    }

    pub async fn single_answer(&self) -> Result<(), RunError> {
        let battery = load_battery(&self.config.tests_path)?;
        let log = run_overgeneralization_metric(
            self.model,
            self.wordnet,
            &self.layout,
            &battery,
            self.config.test_name.as_deref(),
            self.config.metric_top_k,
        )
        .await?;
        info!(sentences = log.len(), "single-answer battery finished");
        Ok(())
    }
}
