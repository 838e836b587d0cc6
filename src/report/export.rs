// CSV export of a finished report
// Written to a sibling temp file and renamed into place, so readers never see a partial file

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::ReportRow;

pub const COLUMNS: [&str; 7] = [
    "Requirement ID",
    "Requirement Text",
    "Description ID",
    "Description Text",
    "Similarity Score",
    "Result",
    "Reason",
];

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

pub fn write_csv(path: &Path, rows: &[ReportRow]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let temp = temp_path(path);
    if let Err(e) = write_rows(&temp, rows) {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }

    if let Err(e) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(anyhow::Error::new(e).context(format!(
            "Failed to move report into place at {}",
            path.display()
        )));
    }

    debug!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

fn write_rows(path: &Path, rows: &[ReportRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    writer.write_record(COLUMNS)?;
    for row in rows {
        let score = row
            .similarity_score
            .map(|score| score.to_string())
            .unwrap_or_default();
        let result = row.result.to_string();
        writer.write_record([
            row.requirement_id.as_str(),
            row.requirement_text.as_str(),
            row.description_id.as_deref().unwrap_or_default(),
            row.description_text.as_deref().unwrap_or_default(),
            score.as_str(),
            result.as_str(),
            row.reason.as_deref().unwrap_or_default(),
        ])?;
    }

    writer.flush().context("Failed to flush report")?;
    Ok(())
}
