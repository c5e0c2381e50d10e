//! Plan routing.
//!
//! Asks the reasoning collaborator for an execution plan and validates the
//! answer against the closed mode and tool vocabularies. The router never
//! fails: unparsable output becomes a chat plan.

use crate::llm::{ask, json, ReasoningClient};
use crate::models::{
    AnalysisStep, DiscussionPlan, ExecutionPlan, LiteraturePlan, Mode, ToolRef, CATALOG_VERSION,
};
use crate::tools::ToolRegistry;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Phrasings that ask the user to pick or supply a dataset. Questions that
/// merely mention the dataset ("which columns in the dataset...") do not
/// match.
const DATASET_REQUESTS: &[&str] = &[
    "which dataset",
    "what dataset",
    "which data set",
    "what data set",
    "which file",
    "what file",
    "which csv",
    "which spreadsheet",
    "upload",
    "attach",
    "provide a dataset",
    "provide the dataset",
    "provide your data",
    "share your data",
    "share the dataset",
    "do you have a dataset",
    "do you have data",
];

const DEFAULT_CLARIFICATION: &str = "Could you clarify what you would like me to do?";

/// Literature defaults applied when the plan leaves them out.
#[derive(Debug, Clone)]
pub struct PlanDefaults {
    pub tone: String,
    pub word_count: u32,
}

impl Default for PlanDefaults {
    fn default() -> Self {
        Self {
            tone: "formal".to_string(),
            word_count: 500,
        }
    }
}

/// What the pipeline does with a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Stop and ask the user this question.
    Clarify(String),
    /// Conversational reply, no stages.
    Chat,
    /// Run the stages of this mode.
    Stages(Mode),
}

/// Pick the route for a validated plan. Clarification wins over every mode.
pub fn route(plan: &ExecutionPlan) -> Route {
    if plan.needs_clarification {
        let question = plan
            .clarification_question
            .clone()
            .unwrap_or_else(|| DEFAULT_CLARIFICATION.to_string());
        return Route::Clarify(question);
    }
    match plan.mode {
        Mode::Chat => Route::Chat,
        mode => Route::Stages(mode),
    }
}

/// Parse and validate raw planner output.
///
/// Returns `None` only when no JSON object can be found at all.
pub fn parse_plan(
    raw: &str,
    message: &str,
    dataset_attached: bool,
    defaults: &PlanDefaults,
) -> Option<ExecutionPlan> {
    let map = json::parse_object(raw)?;
    let mut notes = Vec::new();

    let mode = match json::str_field(&map, "mode") {
        Some(label) => Mode::from_label(&label).unwrap_or_else(|| {
            notes.push(format!("unknown mode '{}' treated as chat", label));
            Mode::Chat
        }),
        None => {
            notes.push("plan had no mode; treated as chat".to_string());
            Mode::Chat
        }
    };

    let mut needs_clarification = json::bool_field(&map, "needs_clarification").unwrap_or(false);
    let mut clarification_question = json::str_field(&map, "clarification_question");

    if needs_clarification && dataset_attached {
        let asks_for_dataset = clarification_question.as_deref().map_or(true, |q| {
            let q = q.to_lowercase();
            DATASET_REQUESTS.iter().any(|p| q.contains(p))
        });
        if asks_for_dataset {
            notes.push("dropped clarification about a dataset that is already attached".to_string());
            needs_clarification = false;
            clarification_question = None;
        }
    }

    let literature = object(&map, "literature_plan");
    let literature_plan = LiteraturePlan {
        focus: literature
            .and_then(|m| json::str_field(m, "focus"))
            .or_else(|| non_empty(message)),
        tone: literature
            .and_then(|m| json::str_field(m, "tone"))
            .or_else(|| Some(defaults.tone.clone())),
        word_count: literature
            .and_then(|m| json::f64_field(m, "word_count"))
            .filter(|n| n.is_finite() && *n >= 1.0)
            .map(|n| n.round() as u32)
            .or(Some(defaults.word_count)),
    };

    let discussion_plan = DiscussionPlan {
        focus: object(&map, "discussion_plan")
            .and_then(|m| json::str_field(m, "focus"))
            .or_else(|| non_empty(message)),
    };

    let analysis_plan = parse_steps(map.get("analysis_plan"), &mut notes);

    Some(ExecutionPlan {
        mode,
        needs_clarification,
        clarification_question,
        literature_plan,
        analysis_plan,
        discussion_plan,
        notes,
    })
}

fn object<'m>(map: &'m Map<String, Value>, key: &str) -> Option<&'m Map<String, Value>> {
    map.get(key).and_then(|v| v.as_object())
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Steps in planner order. Tools outside the catalog are kept and flagged.
fn parse_steps(value: Option<&Value>, notes: &mut Vec<String>) -> Vec<AnalysisStep> {
    let Some(items) = value.and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    items
        .iter()
        .map(|item| {
            let (name, reason, interpret) = match item {
                Value::String(name) => (name.trim().to_string(), String::new(), false),
                Value::Object(step) => (
                    json::str_field(step, "tool").unwrap_or_default(),
                    json::str_field(step, "reason").unwrap_or_default(),
                    json::bool_field(step, "interpret").unwrap_or(false),
                ),
                other => (other.to_string(), String::new(), false),
            };
            let tool = ToolRef::from_name(&name);
            if let ToolRef::Unknown(ref unknown) = tool {
                notes.push(format!("tool '{}' is not in the catalog", unknown));
            }
            AnalysisStep {
                tool,
                reason,
                interpret,
            }
        })
        .collect()
}

/// Produces validated plans from user messages.
pub struct PlanRouter<'a> {
    client: &'a dyn ReasoningClient,
    registry: &'a ToolRegistry,
    defaults: PlanDefaults,
    timeout: Duration,
}

impl<'a> PlanRouter<'a> {
    pub fn new(
        client: &'a dyn ReasoningClient,
        registry: &'a ToolRegistry,
        defaults: PlanDefaults,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            registry,
            defaults,
            timeout,
        }
    }

    /// Plan a request. Never fails; falls back to a chat plan.
    pub async fn plan(&self, message: &str, dataset_attached: bool) -> ExecutionPlan {
        let prompt = self.build_prompt(message, dataset_attached);

        let raw = match ask(self.client, &prompt, self.timeout).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Planner call failed, defaulting to chat: {}", e);
                return fallback(format!("planner unavailable: {}", e));
            }
        };
        debug!("Raw plan: {}", raw);

        match parse_plan(&raw, message, dataset_attached, &self.defaults) {
            Some(plan) => {
                for note in &plan.notes {
                    info!("Plan note: {}", note);
                }
                info!(
                    "Planned mode {} with {} analysis step(s)",
                    plan.mode,
                    plan.analysis_plan.len()
                );
                plan
            }
            None => {
                warn!("Planner output was not JSON, defaulting to chat");
                fallback("planner output could not be parsed".to_string())
            }
        }
    }

    fn build_prompt(&self, message: &str, dataset_attached: bool) -> String {
        let dataset_context = if dataset_attached {
            "- A dataset HAS already been provided to the system.\n\
             - Do NOT ask which dataset to use."
        } else {
            "- No dataset has been provided."
        };

        format!(
            r#"You are AIRA, a conversational research planner.

User message:
{message}

System context:
{dataset_context}
- Only ask for clarification if the intent is truly ambiguous.
- Greetings and general questions use mode "chat".

Available analysis tools (catalog v{CATALOG_VERSION}):
{tools}

Return STRICT JSON only:
{{
  "needs_clarification": boolean,
  "clarification_question": string | null,
  "mode": "chat" | "literature" | "analysis" | "discussion" | "full",
  "literature_plan": {{"focus": string | null, "tone": string | null, "word_count": number | null}},
  "analysis_plan": [{{"tool": string, "reason": string, "interpret": boolean}}],
  "discussion_plan": {{"focus": string | null}}
}}"#,
            tools = self.registry.describe(),
        )
    }
}

fn fallback(note: String) -> ExecutionPlan {
    let mut plan = ExecutionPlan::chat_default();
    plan.notes.push(note);
    plan
}
