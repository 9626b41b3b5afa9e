//! On-disk artifact layout and persistence helpers.
//!
//! Every run writes under a single root using fixed subdirectories:
//! `csv/` for tabular outputs, `json/` for logs and grouped entities,
//! `graphs/` for rendered figures and `checkpoint/` for model checkpoints.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::ReportError;

pub const CSV_DIR: &str = "csv";
pub const JSON_DIR: &str = "json";
pub const GRAPHS_DIR: &str = "graphs";
pub const CHECKPOINT_DIR: &str = "checkpoint";

#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn csv(&self, file: &str) -> PathBuf {
        self.root.join(CSV_DIR).join(file)
    }

    pub fn json(&self, file: &str) -> PathBuf {
        self.root.join(JSON_DIR).join(file)
    }

    pub fn graph(&self, file: &str) -> PathBuf {
        self.root.join(GRAPHS_DIR).join(file)
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.root.join(CHECKPOINT_DIR)
    }

    /// Resolves a path given relative to the artifact root.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        let relative = relative.as_ref();
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.root.join(relative)
        }
    }
}

/// Model names may carry an organisation prefix (`google/t5-base`); keep them
/// usable as a single path component.
pub fn file_stem_for(model_name: &str) -> String {
    model_name.replace(['/', '\\'], "_")
}

pub fn ensure_parent(path: &Path) -> Result<(), ReportError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| ReportError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
    }
    Ok(())
}

fn create(path: &Path) -> Result<File, ReportError> {
    ensure_parent(path)?;
    File::create(path).map_err(|source| ReportError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ReportError> {
    let mut writer = BufWriter::new(create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush().map_err(|source| ReportError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ReportError> {
    let file = File::open(path).map_err(|source| ReportError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

pub fn write_text(path: &Path, contents: &str) -> Result<(), ReportError> {
    ensure_parent(path)?;
    std::fs::write(path, contents).map_err(|source| ReportError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Writes `header` followed by pre-rendered records.
pub fn write_csv_records(path: &Path, header: &[String], records: &[Vec<String>]) -> Result<(), ReportError> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(header)?;
    for record in records {
        writer.write_record(record)?;
    }
    writer.flush().map_err(|source| ReportError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub fn write_csv_rows<R: Serialize>(path: &Path, rows: &[R]) -> Result<(), ReportError> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush().map_err(|source| ReportError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub fn read_csv_rows<R: DeserializeOwned>(path: &Path) -> Result<Vec<R>, ReportError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// Values of one named column.
pub fn read_csv_column(path: &Path, column: &str) -> Result<Vec<String>, ReportError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let idx = headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| ReportError::MissingColumn {
            path: path.display().to_string(),
            column: column.to_string(),
            available: headers.iter().map(str::to_string).collect(),
        })?;

    let mut values = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(value) = record.get(idx) {
            values.push(value.to_string());
        }
    }
    Ok(values)
}
