pub mod battery;
pub mod category;
pub mod grouping;
pub mod multiple_choice;
pub mod overgeneralization;

use thiserror::Error;

use crate::lexicon::KnowledgeError;
use crate::model::ModelError;
use crate::report::ReportError;
use crate::store::StoreError;

pub use battery::{OvergeneralizationTest, TestBattery};
pub use category::CategoryReport;
pub use grouping::{EntityGroup, EntityGroups};
pub use multiple_choice::{CombSize, McTestLog};
pub use overgeneralization::OvergeneralizationScores;

#[derive(Debug, Error)]
pub enum MetricError {
    #[error("no prediction for {sentence:?} resolved to a WordNet synset")]
    NothingResolved { sentence: String },
    #[error("invalid test battery {path}: {source}")]
    Battery {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("mask index {mask_index} outside sentence {sentence:?}")]
    MaskIndex { sentence: String, mask_index: usize },
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),
    #[error(transparent)]
    Report(#[from] ReportError),
}
