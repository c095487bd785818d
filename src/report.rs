//! Report persistence: `<output dir>/<test DSM file name>_metrics.json`.

use crate::metrics::MetricsReport;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A written report and the exact text that went to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedReport {
    pub path: PathBuf,
    pub json: String,
}

pub fn report_path(output_dir: &Path, base_name: &str) -> PathBuf {
    output_dir.join(format!("{base_name}_metrics.json"))
}

/// Write the report as indented JSON.
pub fn persist(
    report: &MetricsReport,
    output_dir: &Path,
    base_name: &str,
) -> Result<PersistedReport, ReportError> {
    let json = serde_json::to_string_pretty(report)?;
    let path = report_path(output_dir, base_name);
    {
        let mut writer = BufWriter::new(File::create(&path)?);
        writer.write_all(json.as_bytes())?;
        writer.flush()?;
    }
    tracing::info!(path = %path.display(), "wrote metrics report");
    Ok(PersistedReport { path, json })
}
