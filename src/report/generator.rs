//! Markdown and JSON report generation.
//!
//! This module renders a response envelope, together with the request it
//! answers, into a report file.

use crate::models::{ExportRef, ResponseEnvelope, StepStatus};
use anyhow::Result;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Request details shown alongside the response.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub message: String,
    pub dataset: Option<String>,
    pub model_used: String,
    pub duration_seconds: f64,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    metadata: &'a ReportMetadata,
    response: &'a ResponseEnvelope,
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(metadata: &ReportMetadata, envelope: &ResponseEnvelope) -> String {
    let mut output = String::new();

    output.push_str("# AIRA Research Report\n\n");
    output.push_str(&generate_metadata_section(metadata, envelope));
    output.push_str(&generate_response_section(&envelope.content));
    output.push_str(&generate_visuals_section(envelope));
    output.push_str(&generate_exports_section(envelope));
    output.push_str(&generate_steps_section(envelope));
    output.push_str(&generate_plan_section(envelope));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata, envelope: &ResponseEnvelope) -> String {
    let mut section = String::new();

    section.push_str("## Request\n\n");
    section.push_str(&format!("- **Message:** {}\n", metadata.message));
    if let Some(ref dataset) = metadata.dataset {
        section.push_str(&format!("- **Dataset:** `{}`\n", dataset));
    }
    section.push_str(&format!("- **Response Type:** {}\n", envelope.kind));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        envelope.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Model Used:** `{}`\n", metadata.model_used));
    section.push_str(&format!("- **Duration:** {:.1}s\n", metadata.duration_seconds));
    section.push('\n');

    section
}

fn generate_response_section(content: &str) -> String {
    if content.trim().is_empty() {
        return String::new();
    }
    format!("## Response\n\n{}\n\n", content.trim())
}

fn generate_visuals_section(envelope: &ResponseEnvelope) -> String {
    if envelope.visuals.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Visuals\n\n");
    for (label, path) in &envelope.visuals {
        section.push_str(&format!("### {}\n\n![{}]({})\n\n", label, label, path));
    }
    section
}

fn generate_exports_section(envelope: &ResponseEnvelope) -> String {
    if envelope.exports.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Exports\n\n");
    for (kind, export) in &envelope.exports {
        match export {
            ExportRef::Single(path) => section.push_str(&format!("- **{}:** `{}`\n", kind, path)),
            ExportRef::Many(paths) => {
                section.push_str(&format!("- **{}:**\n", kind));
                for path in paths {
                    section.push_str(&format!("  - `{}`\n", path));
                }
            }
        }
    }
    section.push('\n');
    section
}

/// Table of every step with its outcome.
fn generate_steps_section(envelope: &ResponseEnvelope) -> String {
    if envelope.steps.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Analysis Steps\n\n");
    section.push_str("| # | Step | Status | Columns | Detail |\n");
    section.push_str("|:---:|:---|:---:|:---|:---|\n");

    for step in &envelope.steps {
        let (status, detail) = match step.status {
            StepStatus::Ok => ("✅ ok", step.artifact_ref.clone().unwrap_or_default()),
            StepStatus::Error => ("❌ error", step.error.clone().unwrap_or_default()),
        };
        section.push_str(&format!(
            "| {} | `{}` | {} | {} | {} |\n",
            step.index + 1,
            step.key,
            status,
            step.columns.join("; ").replace('|', "\\|"),
            detail.replace('|', "\\|").replace('\n', " ")
        ));
    }
    section.push('\n');
    section
}

fn generate_plan_section(envelope: &ResponseEnvelope) -> String {
    let Some(ref plan) = envelope.plan else {
        return String::new();
    };
    match serde_json::to_string_pretty(plan) {
        Ok(json) => format!(
            "## Execution Plan\n\n<details>\n<summary>View Plan</summary>\n\n```json\n{}\n```\n</details>\n\n",
            json
        ),
        Err(_) => String::new(),
    }
}

/// Generate the report footer.
fn generate_footer() -> String {
    "---\n\n*Report generated by AIRA*\n".to_string()
}

/// Generate a JSON report.
pub fn generate_json_report(metadata: &ReportMetadata, envelope: &ResponseEnvelope) -> Result<String> {
    let report = JsonReport {
        metadata,
        response: envelope,
    };
    serde_json::to_string_pretty(&report).map_err(Into::into)
}

/// Write rendered report content to a file.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalysisStepResult, ResponseKind};
    use serde_json::Value;
    use tempfile::TempDir;

    fn metadata() -> ReportMetadata {
        ReportMetadata {
            message: "plot gender".to_string(),
            dataset: Some("survey.csv".to_string()),
            model_used: "test-model".to_string(),
            duration_seconds: 3.2,
        }
    }

    fn envelope() -> ResponseEnvelope {
        let mut envelope = ResponseEnvelope::text(ResponseKind::Analysis, "Steps:\n- done");
        envelope
            .visuals
            .insert("countplot".to_string(), "outputs/plots/countplot_a.svg".to_string());
        envelope.exports.insert(
            "tables".to_string(),
            ExportRef::Many(vec!["t1.csv".to_string(), "t2.csv".to_string()]),
        );
        envelope.steps.push(AnalysisStepResult {
            index: 0,
            key: "chi_square_test".to_string(),
            tool_id: "chi_square_test".to_string(),
            status: StepStatus::Error,
            payload: Value::Null,
            interpretation: None,
            artifact_ref: None,
            error: Some("Could not resolve outcome or predictor columns.".to_string()),
            columns: Vec::new(),
        });
        envelope
    }

    #[test]
    fn test_generate_markdown_report() {
        let markdown = generate_markdown_report(&metadata(), &envelope());

        assert!(markdown.contains("# AIRA Research Report"));
        assert!(markdown.contains("- **Dataset:** `survey.csv`"));
        assert!(markdown.contains("- **Response Type:** analysis"));
        assert!(markdown.contains("## Response"));
        assert!(markdown.contains("![countplot](outputs/plots/countplot_a.svg)"));
        assert!(markdown.contains("  - `t2.csv`"));
        assert!(markdown.contains("Could not resolve outcome or predictor columns."));
        assert!(!markdown.contains("## Execution Plan"));
    }

    #[test]
    fn test_chat_report_has_no_artifact_sections() {
        let envelope = ResponseEnvelope::text(ResponseKind::Text, "Hello!");
        let markdown = generate_markdown_report(&metadata(), &envelope);
        assert!(!markdown.contains("## Visuals"));
        assert!(!markdown.contains("## Exports"));
        assert!(!markdown.contains("## Analysis Steps"));
    }

    #[test]
    fn test_generate_json_report() {
        let json = generate_json_report(&metadata(), &envelope()).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["response"]["type"], "analysis");
        assert_eq!(value["response"]["exports"]["tables"][1], "t2.csv");
        assert_eq!(value["metadata"]["model_used"], "test-model");
    }

    #[test]
    fn test_write_report_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("reports").join("out.md");
        write_report("# hi\n", &path).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "# hi\n");
    }
}
