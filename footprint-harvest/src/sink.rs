//! Tabular export of a run's rows
//!
//! One CSV file per run, named from the local date. The header row is
//! always written, so an all-failed run still leaves a (header-only)
//! artifact behind.

use crate::error::SinkError;
use crate::models::OutputRow;
use chrono::{Local, NaiveDate};
use std::path::{Path, PathBuf};
use tracing::info;

pub trait ResultSink: Send + Sync {
    /// Write `rows` as one artifact and return its path
    fn export(&self, rows: &[OutputRow]) -> Result<PathBuf, SinkError>;
}

/// `<prefix>_<YYYY-MM-DD>.csv`
pub fn export_file_name(prefix: &str, date: NaiveDate) -> String {
    format!("{}_{}.csv", prefix, date.format("%Y-%m-%d"))
}

pub struct CsvResultSink {
    output_dir: PathBuf,
    file_prefix: String,
}

impl CsvResultSink {
    pub fn new(output_dir: impl Into<PathBuf>, file_prefix: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            file_prefix: file_prefix.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path the export would be written to on `date`
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.output_dir.join(export_file_name(&self.file_prefix, date))
    }

    pub fn export_on(&self, rows: &[OutputRow], date: NaiveDate) -> Result<PathBuf, SinkError> {
        std::fs::create_dir_all(&self.output_dir).map_err(|source| SinkError::Io {
            path: self.output_dir.clone(),
            source,
        })?;

        let path = self.path_for(date);
        let file = std::fs::File::create(&path).map_err(|source| SinkError::Io {
            path: path.clone(),
            source,
        })?;

        // Header comes from the struct fields; written explicitly so that an
        // empty run still gets one
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(["target_id", "polygon_label", "area_sq_meters", "final_lat", "final_lng"])?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush().map_err(|source| SinkError::Io {
            path: path.clone(),
            source,
        })?;

        info!(path = %path.display(), rows = rows.len(), "Export written");
        Ok(path)
    }
}

impl ResultSink for CsvResultSink {
    fn export(&self, rows: &[OutputRow]) -> Result<PathBuf, SinkError> {
        self.export_on(rows, Local::now().date_naive())
    }
}
