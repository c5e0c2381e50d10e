//! Data models for the research pipeline.
//!
//! This module contains the plan produced by the planner, the per-step
//! results produced by the executor and the response envelope handed back
//! to the caller.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Version of the closed tool catalog advertised to the planner.
pub const CATALOG_VERSION: &str = "1";

/// Which stages a request runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Conversational reply, no stages.
    Chat,
    /// Literature review only.
    Literature,
    /// Dataset analysis only.
    Analysis,
    /// Discussion section only.
    Discussion,
    /// Literature, then analysis, then discussion.
    Full,
}

impl Mode {
    /// Parse a planner-supplied mode label. Unknown labels return `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "chat" => Some(Mode::Chat),
            "literature" => Some(Mode::Literature),
            "analysis" => Some(Mode::Analysis),
            "discussion" => Some(Mode::Discussion),
            "full" => Some(Mode::Full),
            _ => None,
        }
    }

    pub fn runs_literature(&self) -> bool {
        matches!(self, Mode::Literature | Mode::Full)
    }

    pub fn runs_analysis(&self) -> bool {
        matches!(self, Mode::Analysis | Mode::Full)
    }

    pub fn runs_discussion(&self) -> bool {
        matches!(self, Mode::Discussion | Mode::Full)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Chat => write!(f, "chat"),
            Mode::Literature => write!(f, "literature"),
            Mode::Analysis => write!(f, "analysis"),
            Mode::Discussion => write!(f, "discussion"),
            Mode::Full => write!(f, "full"),
        }
    }
}

/// Identifier of an analytical operation in the closed catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ToolId {
    DescriptiveStatistics,
    ChiSquareTest,
    CronbachAlpha,
    Countplot,
    Barplot,
    Piechart,
}

impl ToolId {
    /// Every tool in the catalog, in the order presented to the planner.
    pub const ALL: [ToolId; 6] = [
        ToolId::DescriptiveStatistics,
        ToolId::ChiSquareTest,
        ToolId::CronbachAlpha,
        ToolId::Countplot,
        ToolId::Barplot,
        ToolId::Piechart,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolId::DescriptiveStatistics => "descriptive_statistics",
            ToolId::ChiSquareTest => "chi_square_test",
            ToolId::CronbachAlpha => "cronbach_alpha",
            ToolId::Countplot => "countplot",
            ToolId::Barplot => "barplot",
            ToolId::Piechart => "piechart",
        }
    }

    /// Exact lookup against the catalog. No fuzzy coercion.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name.trim())
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A planner-supplied tool reference, validated against the catalog.
///
/// Unknown names are kept so the executor can report them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRef {
    Known(ToolId),
    Unknown(String),
}

impl ToolRef {
    pub fn from_name(name: &str) -> Self {
        match ToolId::parse(name) {
            Some(id) => ToolRef::Known(id),
            None => ToolRef::Unknown(name.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ToolRef::Known(id) => id.as_str(),
            ToolRef::Unknown(name) => name,
        }
    }
}

impl Serialize for ToolRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// One requested operation in the analysis portion of a plan.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisStep {
    pub tool: ToolRef,
    /// Planner's justification. Logged, never executed.
    pub reason: String,
    /// Attach a plain-language interpretation to the result.
    pub interpret: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LiteraturePlan {
    pub focus: Option<String>,
    pub tone: Option<String>,
    pub word_count: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscussionPlan {
    pub focus: Option<String>,
}

/// Validated execution plan. Built once per request and never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    pub mode: Mode,
    pub needs_clarification: bool,
    pub clarification_question: Option<String>,
    pub literature_plan: LiteraturePlan,
    pub analysis_plan: Vec<AnalysisStep>,
    pub discussion_plan: DiscussionPlan,
    /// Validation findings (unknown mode, unknown tools, overrides).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl ExecutionPlan {
    /// Plan used when the planner output cannot be parsed.
    pub fn chat_default() -> Self {
        Self {
            mode: Mode::Chat,
            needs_clarification: false,
            clarification_question: None,
            literature_plan: LiteraturePlan::default(),
            analysis_plan: Vec::new(),
            discussion_plan: DiscussionPlan::default(),
            notes: Vec::new(),
        }
    }
}

/// How a phrase was bound to a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMethod {
    Exact,
    Lexical,
    Semantic,
}

impl fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionMethod::Exact => write!(f, "exact"),
            ResolutionMethod::Lexical => write!(f, "lexical"),
            ResolutionMethod::Semantic => write!(f, "semantic"),
        }
    }
}

/// Outcome of resolving one phrase against a dataset's columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnResolution {
    pub phrase: String,
    /// Always a literal member of the column set when present.
    pub resolved_column: Option<String>,
    pub method: Option<ResolutionMethod>,
    pub confidence: f64,
}

impl ColumnResolution {
    pub fn unresolved(phrase: &str) -> Self {
        Self {
            phrase: phrase.to_string(),
            resolved_column: None,
            method: None,
            confidence: 0.0,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_column.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Ok,
    Error,
}

/// Result of executing one analysis step. One per input step, in order.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisStepResult {
    /// Position of the step in the plan.
    pub index: usize,
    /// Tool id, suffixed `_2`, `_3`, ... when a tool repeats in one plan.
    pub key: String,
    pub tool_id: String,
    pub status: StepStatus,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interpretation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Columns bound for this step, in argument order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
}

impl AnalysisStepResult {
    pub fn is_ok(&self) -> bool {
        self.status == StepStatus::Ok
    }
}

/// An export reference: a single file or a sequence of files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ExportRef {
    Single(String),
    Many(Vec<String>),
}

/// Everything the analysis stage produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StepReport {
    pub results: Vec<AnalysisStepResult>,
    /// Chart artifacts keyed by step key.
    pub visuals: BTreeMap<String, String>,
    pub exports: BTreeMap<String, ExportRef>,
    /// Interpretation blocks in step order, each prefixed with its step key.
    pub interpretations: Vec<String>,
}

impl StepReport {
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.is_ok()).count()
    }
}

/// Kind tag of the response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    Text,
    Analysis,
    Full,
    Clarification,
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseKind::Text => write!(f, "text"),
            ResponseKind::Analysis => write!(f, "analysis"),
            ResponseKind::Full => write!(f, "full"),
            ResponseKind::Clarification => write!(f, "clarification"),
        }
    }
}

/// The terminal artifact of a request.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseEnvelope {
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    pub content: String,
    pub visuals: BTreeMap<String, String>,
    pub exports: BTreeMap<String, ExportRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<AnalysisStepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<ExecutionPlan>,
    pub generated_at: DateTime<Utc>,
}

impl ResponseEnvelope {
    /// Plain text envelope with no visuals or exports.
    pub fn text(kind: ResponseKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            visuals: BTreeMap::new(),
            exports: BTreeMap::new(),
            steps: Vec::new(),
            plan: None,
            generated_at: Utc::now(),
        }
    }
}
