use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::types::RunReport;

/// Default directory for reports
pub const DEFAULT_REPORT_DIR: &str = "reports";

/// `report_<unix-millis>.json`, with a numeric suffix if that name is taken
fn unique_report_path(dir: &Path) -> PathBuf {
    let millis = chrono::Utc::now().timestamp_millis();
    let mut path = dir.join(format!("report_{}.json", millis));
    let mut suffix = 1;
    while path.exists() {
        path = dir.join(format!("report_{}_{}.json", millis, suffix));
        suffix += 1;
    }
    path
}

/// Write the report as pretty JSON under `dir` and return the file path
pub fn write_report(report: &RunReport, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let json = serde_json::to_string_pretty(report)?;
    let path = unique_report_path(dir);
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    log::debug!("Report written to {}", path.display());
    Ok(path)
}
