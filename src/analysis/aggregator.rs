//! Response aggregation.
//!
//! This module merges the outputs of the literature, analysis and
//! discussion stages into one response envelope shaped by the plan's mode.

use crate::models::{Mode, ResponseEnvelope, ResponseKind, StepReport, StepStatus};

/// Separator between sections of a full-mode response.
pub const SECTION_DELIMITER: &str = "\n\n---\n\n";

/// Whatever the stages produced. `None` means the stage did not run.
#[derive(Debug, Default)]
pub struct StageOutputs {
    pub literature: Option<String>,
    pub analysis: Option<StepReport>,
    pub discussion: Option<String>,
}

fn kind_for(mode: Mode) -> ResponseKind {
    match mode {
        Mode::Analysis => ResponseKind::Analysis,
        Mode::Full => ResponseKind::Full,
        Mode::Chat | Mode::Literature | Mode::Discussion => ResponseKind::Text,
    }
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

/// Text form of an analysis report: interpretations first, then one line
/// per step. `None` when no step ran.
pub fn analysis_text(report: &StepReport) -> Option<String> {
    if report.results.is_empty() {
        return None;
    }

    let mut blocks: Vec<String> = report.interpretations.clone();

    let lines: Vec<String> = report
        .results
        .iter()
        .map(|r| match r.status {
            StepStatus::Ok if r.columns.is_empty() => format!("- **{}**: completed", r.key),
            StepStatus::Ok => format!("- **{}**: completed ({})", r.key, r.columns.join(", ")),
            StepStatus::Error => format!(
                "- **{}**: {}",
                r.key,
                r.error.as_deref().unwrap_or("failed")
            ),
        })
        .collect();
    blocks.push(format!("Steps:\n{}", lines.join("\n")));

    Some(blocks.join("\n\n"))
}

/// Build the envelope for a mode. Stages that produced nothing are left
/// out; visuals and exports only ever come from the analysis stage.
pub fn aggregate(mode: Mode, outputs: StageOutputs) -> ResponseEnvelope {
    let StageOutputs {
        literature,
        analysis,
        discussion,
    } = outputs;
    let literature = non_blank(literature);
    let discussion = non_blank(discussion);
    let analysis_body = analysis.as_ref().and_then(analysis_text);

    let content = match mode {
        Mode::Full => {
            let sections: Vec<String> = [
                ("Literature Review", literature),
                ("Analysis", analysis_body),
                ("Discussion", discussion),
            ]
            .into_iter()
            .filter_map(|(heading, body)| body.map(|b| format!("## {}\n\n{}", heading, b)))
            .collect();
            sections.join(SECTION_DELIMITER)
        }
        Mode::Literature => literature.unwrap_or_default(),
        Mode::Discussion => discussion.unwrap_or_default(),
        Mode::Analysis => {
            analysis_body.unwrap_or_else(|| "The plan contained no analysis steps.".to_string())
        }
        Mode::Chat => String::new(),
    };

    let mut envelope = ResponseEnvelope::text(kind_for(mode), content);
    if matches!(mode, Mode::Analysis | Mode::Full) {
        if let Some(report) = analysis {
            envelope.visuals = report.visuals;
            envelope.exports = report.exports;
            envelope.steps = report.results;
        }
    }
    envelope
}

/// Conversational reply. Never carries visuals or exports.
pub fn chat(reply: impl Into<String>) -> ResponseEnvelope {
    ResponseEnvelope::text(ResponseKind::Text, reply)
}

/// Short-circuit asking the user a question.
pub fn clarification(question: impl Into<String>) -> ResponseEnvelope {
    ResponseEnvelope::text(ResponseKind::Clarification, question)
}
