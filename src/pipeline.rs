//! Request pipeline.
//!
//! One entry point takes a message, an optional dataset and debug flags and
//! always returns a well-formed response envelope. The tool registry, the
//! collaborator handle and the literature sources are fixed when the
//! pipeline is built and shared read-only by every request.

use crate::analysis::aggregator::{self, analysis_text, StageOutputs};
use crate::analysis::{ExecutorSettings, StepExecutor};
use crate::config::Config;
use crate::dataset::Dataset;
use crate::error::PipelineError;
use crate::llm::ReasoningClient;
use crate::models::{ExecutionPlan, Mode, ResponseEnvelope, ResponseKind};
use crate::planner::{route, PlanDefaults, PlanRouter, Route};
use crate::stages::{ChatResponder, DiscussionRunner, LiteratureRunner, LiteratureSource};
use crate::tools::ToolRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Per-request debug switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugFlags {
    /// Log the validated plan and attach it to the envelope.
    pub include_plan: bool,
}

/// Settings the pipeline reads from configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub timeout: Duration,
    pub confidence_threshold: f64,
    pub output_dir: PathBuf,
    pub plan_defaults: PlanDefaults,
    pub max_results: usize,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: Duration::from_secs(config.model.timeout_seconds),
            confidence_threshold: config.resolver.confidence_threshold,
            output_dir: PathBuf::from(&config.general.output_dir),
            plan_defaults: PlanDefaults {
                tone: config.literature.default_tone.clone(),
                word_count: config.literature.default_word_count,
            },
            max_results: config.literature.max_results,
        }
    }
}

pub struct Pipeline {
    client: Arc<dyn ReasoningClient>,
    registry: ToolRegistry,
    sources: Vec<Box<dyn LiteratureSource>>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        client: Arc<dyn ReasoningClient>,
        sources: Vec<Box<dyn LiteratureSource>>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            client,
            registry: ToolRegistry::standard(),
            sources,
            settings,
        }
    }

    /// Handle one request. Never fails: every problem is rendered as text
    /// in the envelope.
    pub async fn run(
        &self,
        message: &str,
        dataset: Option<&Dataset>,
        debug: DebugFlags,
    ) -> ResponseEnvelope {
        let client = self.client.as_ref();
        let router = PlanRouter::new(
            client,
            &self.registry,
            self.settings.plan_defaults.clone(),
            self.settings.timeout,
        );
        let plan = router.plan(message, dataset.is_some()).await;

        if debug.include_plan {
            match serde_json::to_string_pretty(&plan) {
                Ok(text) => info!("Execution plan:\n{}", text),
                Err(e) => warn!("Could not render plan: {}", e),
            }
        }

        let mut envelope = match route(&plan) {
            Route::Clarify(question) => {
                info!("Planner asked for clarification");
                aggregator::clarification(question)
            }
            Route::Chat => {
                let reply = ChatResponder::new(client, self.settings.timeout)
                    .reply(message)
                    .await;
                aggregator::chat(reply)
            }
            Route::Stages(mode) => self.run_stages(mode, &plan, message, dataset).await,
        };

        if debug.include_plan {
            envelope.plan = Some(plan);
        }
        envelope
    }

    async fn run_stages(
        &self,
        mode: Mode,
        plan: &ExecutionPlan,
        message: &str,
        dataset: Option<&Dataset>,
    ) -> ResponseEnvelope {
        if mode.runs_analysis() && dataset.is_none() {
            warn!("Mode {} requested without a dataset", mode);
            return ResponseEnvelope::text(
                ResponseKind::Text,
                PipelineError::DatasetRequired.to_string(),
            );
        }

        let client = self.client.as_ref();
        let timeout = self.settings.timeout;
        let defaults = &self.settings.plan_defaults;
        let word_count = plan
            .literature_plan
            .word_count
            .unwrap_or(defaults.word_count);
        let mut outputs = StageOutputs::default();

        if mode.runs_literature() {
            let focus = plan.literature_plan.focus.as_deref().unwrap_or(message);
            let tone = plan
                .literature_plan
                .tone
                .as_deref()
                .unwrap_or(&defaults.tone);
            info!("Running literature review on '{}'", focus);
            let runner =
                LiteratureRunner::new(client, &self.sources, self.settings.max_results, timeout);
            let review = runner.review(focus, tone, word_count).await;
            info!("Literature review drew on {} articles", review.articles.len());
            outputs.literature = Some(review.text);
        }

        if let (true, Some(dataset)) = (mode.runs_analysis(), dataset) {
            let settings = ExecutorSettings {
                confidence_threshold: self.settings.confidence_threshold,
                timeout,
                output_dir: self.settings.output_dir.clone(),
            };
            let executor = StepExecutor::new(client, &self.registry, &settings);
            outputs.analysis = Some(executor.execute(&plan.analysis_plan, dataset, message).await);
        }

        if mode.runs_discussion() {
            let focus = plan.discussion_plan.focus.as_deref().unwrap_or(message);
            let findings = outputs.analysis.as_ref().and_then(analysis_text);
            let runner = DiscussionRunner::new(client, timeout);
            outputs.discussion = Some(
                runner
                    .discuss(
                        focus,
                        findings.as_deref(),
                        outputs.literature.as_deref(),
                        word_count,
                    )
                    .await,
            );
        }

        aggregator::aggregate(mode, outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregator::SECTION_DELIMITER;
    use crate::error::SourceError;
    use crate::llm::testing::ScriptedClient;
    use crate::stages::literature::Article;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct OneArticle;

    #[async_trait]
    impl LiteratureSource for OneArticle {
        fn name(&self) -> &str {
            "One"
        }

        async fn search(&self, _query: &str, _max: usize) -> Result<Vec<Article>, SourceError> {
            Ok(vec![Article {
                title: "Bookkeeping habits of informal traders".to_string(),
                authors: vec!["Okafor C".to_string()],
                year: Some("2020".to_string()),
                journal: None,
                doi: None,
                url: "https://pubmed.ncbi.nlm.nih.gov/1/".to_string(),
                source: "PubMed".to_string(),
            }])
        }
    }

    const SURVEY: &str = "Gender,Age\nF,30\nM,41\nF,35\nF,29\n";

    fn pipeline(client: &Arc<ScriptedClient>, dir: &TempDir) -> Pipeline {
        let client: Arc<dyn ReasoningClient> = client.clone();
        let mut config = Config::default();
        config.general.output_dir = dir.path().display().to_string();
        config.model.timeout_seconds = 2;
        Pipeline::new(
            client,
            vec![Box::new(OneArticle)],
            PipelineSettings::from_config(&config),
        )
    }

    fn stage_calls(client: &ScriptedClient) -> usize {
        ["Respond naturally", "rigorous literature review", "Extract the variables", "DISCUSSION"]
            .iter()
            .map(|n| client.calls_containing(n))
            .sum()
    }

    #[tokio::test]
    async fn test_chat_mode_has_no_artifacts() {
        let temp_dir = TempDir::new().unwrap();
        let client = Arc::new(
            ScriptedClient::new()
                .on("research planner", r#"{"mode": "chat"}"#)
                .on("Respond naturally", "Hello! I am AIRA."),
        );
        let envelope = pipeline(&client, &temp_dir)
            .run("hi", None, DebugFlags::default())
            .await;
        assert_eq!(envelope.kind, ResponseKind::Text);
        assert_eq!(envelope.content, "Hello! I am AIRA.");
        assert!(envelope.visuals.is_empty());
        assert!(envelope.exports.is_empty());
        assert!(envelope.plan.is_none());
    }

    #[tokio::test]
    async fn test_unparsable_plan_defaults_to_chat() {
        let temp_dir = TempDir::new().unwrap();
        let client = Arc::new(
            ScriptedClient::new()
                .on("research planner", "Sure! I'd love to help.")
                .on("Respond naturally", "Hi."),
        );
        let envelope = pipeline(&client, &temp_dir)
            .run("hi", None, DebugFlags::default())
            .await;
        assert_eq!(envelope.content, "Hi.");
    }

    #[tokio::test]
    async fn test_clarification_short_circuits() {
        let temp_dir = TempDir::new().unwrap();
        let client = Arc::new(ScriptedClient::new().on(
            "research planner",
            r#"{"mode": "full", "needs_clarification": true,
                "clarification_question": "Which outcome interests you?"}"#,
        ));
        let envelope = pipeline(&client, &temp_dir)
            .run("study this", None, DebugFlags::default())
            .await;
        assert_eq!(envelope.kind, ResponseKind::Clarification);
        assert_eq!(envelope.content, "Which outcome interests you?");
        assert_eq!(stage_calls(&client), 0);
    }

    #[tokio::test]
    async fn test_analysis_without_dataset_is_refused() {
        let temp_dir = TempDir::new().unwrap();
        let client = Arc::new(ScriptedClient::new().on(
            "research planner",
            r#"{"mode": "analysis", "analysis_plan": [{"tool": "countplot"}]}"#,
        ));
        let envelope = pipeline(&client, &temp_dir)
            .run("plot gender", None, DebugFlags::default())
            .await;
        assert_eq!(envelope.content, PipelineError::DatasetRequired.to_string());
        assert_eq!(stage_calls(&client), 0);
    }

    #[tokio::test]
    async fn test_full_mode_without_dataset_is_refused() {
        let temp_dir = TempDir::new().unwrap();
        let client = Arc::new(
            ScriptedClient::new()
                .on(
                    "research planner",
                    r#"{"mode": "full", "literature_plan": {"focus": "bookkeeping"},
                        "analysis_plan": [{"tool": "countplot"}]}"#,
                )
                .on("rigorous literature review", r#"{"theme_summary": "Traders rarely keep books."}"#)
                .on("DISCUSSION", r#"{"discussion_body": "This matters."}"#),
        );
        let envelope = pipeline(&client, &temp_dir)
            .run("write a paper on bookkeeping", None, DebugFlags::default())
            .await;

        assert_eq!(envelope.kind, ResponseKind::Text);
        assert_eq!(envelope.content, PipelineError::DatasetRequired.to_string());
        assert!(envelope.visuals.is_empty());
        assert!(envelope.exports.is_empty());
        assert_eq!(stage_calls(&client), 0);
    }

    #[tokio::test]
    async fn test_literature_and_discussion_share_findings() {
        let temp_dir = TempDir::new().unwrap();
        let client = Arc::new(
            ScriptedClient::new()
                .on(
                    "research planner",
                    r#"{"mode": "full", "analysis_plan": [{"tool": "countplot"}]}"#,
                )
                .on("rigorous literature review", r#"{"theme_summary": "Traders rarely keep books."}"#)
                .on("Extract the variables", r#"{"phrase_1": "gender"}"#)
                .on("DISCUSSION", r#"{"discussion_body": "This matters."}"#),
        );
        let dataset = Dataset::from_csv_bytes("survey.csv", SURVEY.as_bytes()).unwrap();
        pipeline(&client, &temp_dir)
            .run("plot gender", Some(&dataset), DebugFlags::default())
            .await;

        let discussion_prompt = client
            .prompts()
            .into_iter()
            .find(|p| p.contains("DISCUSSION"))
            .unwrap();
        assert!(discussion_prompt.contains("Traders rarely keep books."));
        assert!(discussion_prompt.contains("countplot"));
    }

    #[tokio::test]
    async fn test_full_mode_with_dataset() {
        let temp_dir = TempDir::new().unwrap();
        let client = Arc::new(
            ScriptedClient::new()
                .on(
                    "research planner",
                    r#"```json
{"mode": "full", "analysis_plan": [
    {"tool": "countplot", "reason": "show gender", "interpret": false},
    {"tool": "descriptive_statistics", "reason": "overview", "interpret": true}
]}
```"#,
                )
                .on("rigorous literature review", "Prose review.")
                .on("Extract the variables", r#"{"phrase_1": "gender", "phrase_2": null}"#)
                .on("Interpret the following", "Most respondents are women.")
                .on("DISCUSSION", "Prose discussion."),
        );
        let dataset = Dataset::from_csv_bytes("survey.csv", SURVEY.as_bytes()).unwrap();
        let envelope = pipeline(&client, &temp_dir)
            .run(
                "plot gender",
                Some(&dataset),
                DebugFlags { include_plan: true },
            )
            .await;

        let sections: Vec<&str> = envelope.content.split(SECTION_DELIMITER).collect();
        assert_eq!(sections.len(), 3);
        assert!(sections[1].contains("Most respondents are women."));
        assert_eq!(envelope.steps.len(), 2);
        assert!(envelope.visuals.contains_key("countplot"));
        assert!(envelope.exports.contains_key("results"));
        assert!(envelope.exports.contains_key("tables"));
        assert_eq!(envelope.plan.map(|p| p.mode), Some(Mode::Full));
    }
}
