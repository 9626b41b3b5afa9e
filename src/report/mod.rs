pub mod artifacts;
pub mod heatmap;
pub mod histogram;
pub mod svg;
pub mod table;

use thiserror::Error;

pub use artifacts::ArtifactLayout;
pub use heatmap::{ColorMap, HeatmapGrid};
pub use histogram::HistogramSeries;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{path} has no column {column} (available: {available:?})")]
    MissingColumn {
        path: String,
        column: String,
        available: Vec<String>,
    },
}
