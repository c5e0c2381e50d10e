//! Export files for an analysis run.

use crate::error::ToolError;
use crate::models::AnalysisStepResult;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

fn io_error(path: &Path, source: std::io::Error) -> ToolError {
    ToolError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// File-name-safe form of a column name.
fn slug(name: &str) -> String {
    let raw: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    let collapsed = raw
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    let mut slug: String = collapsed.chars().take(40).collect();
    if slug.is_empty() {
        slug.push_str("column");
    }
    slug
}

/// Write every step result to `results_<uuid>.json`.
pub fn write_results(dir: &Path, results: &[AnalysisStepResult]) -> Result<PathBuf, ToolError> {
    std::fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
    let path = dir.join(format!("results_{}.json", Uuid::new_v4().simple()));
    let body = serde_json::to_string_pretty(results)?;
    std::fs::write(&path, body).map_err(|e| io_error(&path, e))?;
    debug!("Wrote results export {}", path.display());
    Ok(path)
}

/// Write one CSV frequency table per column of a descriptive-statistics
/// payload.
pub fn write_frequency_tables(dir: &Path, payload: &Value) -> Result<Vec<PathBuf>, ToolError> {
    let Some(columns) = payload.as_object() else {
        return Ok(Vec::new());
    };
    std::fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;

    let mut written = Vec::new();
    for (column, table) in columns {
        let path = dir.join(format!(
            "table_{}_{}.csv",
            slug(column),
            Uuid::new_v4().simple()
        ));

        let mut writer = csv::Writer::from_path(&path).map_err(|e| ToolError::Io {
            path: path.display().to_string(),
            source: e.into(),
        })?;
        let write = |writer: &mut csv::Writer<std::fs::File>, record: [String; 3]| {
            writer.write_record(&record).map_err(|e| ToolError::Io {
                path: path.display().to_string(),
                source: e.into(),
            })
        };

        write(
            &mut writer,
            [column.clone(), "count".to_string(), "percentage".to_string()],
        )?;
        if let Some(counts) = table["counts"].as_object() {
            for (value, count) in counts {
                let pct = table["percentages"][value.as_str()]
                    .as_f64()
                    .map(|p| p.to_string())
                    .unwrap_or_default();
                write(&mut writer, [value.clone(), count.to_string(), pct])?;
            }
        }
        writer.flush().map_err(|e| io_error(&path, e))?;
        written.push(path);
    }

    Ok(written)
}
