//! Analysis step execution.
//!
//! Runs every step of the analysis plan against the loaded dataset. Column
//! bindings are computed here from the user's message, never taken from the
//! planner. Each step is isolated: its failure is recorded in its own result
//! and the next step runs.

use super::exports;
use crate::dataset::Dataset;
use crate::error::{PipelineError, ToolError};
use crate::llm::{ask, json, ReasoningClient};
use crate::models::{
    AnalysisStep, AnalysisStepResult, ExportRef, StepReport, StepStatus, ToolId, ToolRef,
};
use crate::resolver::{ColumnResolver, PhraseExtractor, Phrases};
use crate::tools::charts::ChartTarget;
use crate::tools::{Operation, ToolCategory, ToolRegistry, ToolSpec};
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const PAIR_FAILURE: &str = "Could not resolve outcome or predictor columns.";

/// Executor settings taken from configuration.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub confidence_threshold: f64,
    pub timeout: Duration,
    /// Root of `plots/` and `exports/`.
    pub output_dir: PathBuf,
}

/// Successful output of one step.
struct StepOutput {
    payload: Value,
    columns: Vec<String>,
    produces_artifact: bool,
}

/// Runs analysis plans.
pub struct StepExecutor<'a> {
    client: &'a dyn ReasoningClient,
    registry: &'a ToolRegistry,
    resolver: ColumnResolver<'a>,
    extractor: PhraseExtractor<'a>,
    charts: ChartTarget,
    exports_dir: PathBuf,
    timeout: Duration,
}

impl<'a> StepExecutor<'a> {
    pub fn new(
        client: &'a dyn ReasoningClient,
        registry: &'a ToolRegistry,
        settings: &ExecutorSettings,
    ) -> Self {
        Self {
            client,
            registry,
            resolver: ColumnResolver::new(client, settings.confidence_threshold, settings.timeout),
            extractor: PhraseExtractor::new(client, settings.timeout),
            charts: ChartTarget::new(settings.output_dir.join("plots")),
            exports_dir: settings.output_dir.join("exports"),
            timeout: settings.timeout,
        }
    }

    /// Execute `steps` in order. The report holds exactly one result per
    /// step, failures included.
    pub async fn execute(
        &self,
        steps: &[AnalysisStep],
        dataset: &Dataset,
        message: &str,
    ) -> StepReport {
        let mut report = StepReport::default();
        if steps.is_empty() {
            return report;
        }

        let phrases = if steps.iter().any(|s| self.needs_columns(&s.tool)) {
            Some(self.extractor.extract(message, dataset.columns()).await)
        } else {
            None
        };

        let mut taken: HashSet<String> = HashSet::new();

        for (index, step) in steps.iter().enumerate() {
            let tool_name = step.tool.name().to_string();
            let key = unique_key(&tool_name, &mut taken);

            info!("Step {} ({}): {}", index + 1, key, step.reason);

            let result = match self.run_step(step, dataset, message, phrases.as_ref()).await {
                Ok(output) => {
                    let artifact_ref = if output.produces_artifact {
                        output.payload["file"].as_str().map(String::from)
                    } else {
                        None
                    };
                    let interpretation = if step.interpret && !output.produces_artifact {
                        self.interpret(&key, &output.payload).await
                    } else {
                        None
                    };
                    debug!("Step {} finished", key);
                    AnalysisStepResult {
                        index,
                        key,
                        tool_id: tool_name,
                        status: StepStatus::Ok,
                        payload: output.payload,
                        interpretation,
                        artifact_ref,
                        error: None,
                        columns: output.columns,
                    }
                }
                Err(e) => {
                    error!("Step {} failed: {}", key, e);
                    AnalysisStepResult {
                        index,
                        key,
                        tool_id: tool_name,
                        status: StepStatus::Error,
                        payload: Value::Null,
                        interpretation: None,
                        artifact_ref: None,
                        error: Some(e.to_string()),
                        columns: Vec::new(),
                    }
                }
            };

            if let Some(artifact) = &result.artifact_ref {
                report.visuals.insert(result.key.clone(), artifact.clone());
            }
            if let Some(text) = &result.interpretation {
                report
                    .interpretations
                    .push(format!("### {}\n{}", result.key, text));
            }
            report.results.push(result);
        }

        self.write_exports(&mut report);
        info!(
            "Analysis finished: {} step(s), {} failed",
            report.results.len(),
            report.failed_count()
        );
        report
    }

    fn needs_columns(&self, tool: &ToolRef) -> bool {
        match tool {
            ToolRef::Known(id) => self
                .registry
                .get(*id)
                .map_or(false, |spec| spec.category() != ToolCategory::WholeDataset),
            ToolRef::Unknown(_) => false,
        }
    }

    async fn run_step(
        &self,
        step: &AnalysisStep,
        dataset: &Dataset,
        message: &str,
        phrases: Option<&Phrases>,
    ) -> Result<StepOutput, PipelineError> {
        let spec = match &step.tool {
            ToolRef::Known(id) => self.registry.get(*id),
            ToolRef::Unknown(_) => None,
        }
        .ok_or_else(|| PipelineError::UnknownTool(step.tool.name().to_string()))?;

        let fallback = Phrases::whole_message(message);
        let phrases = phrases.unwrap_or(&fallback);
        let failed = |source: ToolError| PipelineError::ToolExecution {
            tool: spec.id.to_string(),
            source,
        };

        match spec.operation {
            Operation::WholeDataset(op) => Ok(StepOutput {
                payload: op(dataset, &self.charts).map_err(failed)?,
                columns: Vec::new(),
                produces_artifact: spec.produces_artifact,
            }),
            Operation::SingleVariable(op) => {
                let column = self.resolve_single(spec, phrases, message, dataset).await?;
                Ok(StepOutput {
                    payload: op(dataset, &column, &self.charts).map_err(failed)?,
                    columns: vec![column],
                    produces_artifact: spec.produces_artifact,
                })
            }
            Operation::TwoVariable(op) => {
                let (first, second) = self.resolve_pair(phrases, message, dataset).await?;
                Ok(StepOutput {
                    payload: op(dataset, &first, &second, &self.charts).map_err(failed)?,
                    columns: vec![first, second],
                    produces_artifact: spec.produces_artifact,
                })
            }
        }
    }

    /// One column from the first phrase, retrying once with the raw message.
    async fn resolve_single(
        &self,
        spec: &ToolSpec,
        phrases: &Phrases,
        message: &str,
        dataset: &Dataset,
    ) -> Result<String, PipelineError> {
        let columns = dataset.columns();
        let first = self.resolver.resolve(&phrases.first, columns).await;
        if let Some(column) = first.resolved_column {
            return Ok(column);
        }

        if message.trim() != phrases.first.trim() {
            debug!("Retrying {} resolution with the full message", spec.id);
            if let Some(column) = self.resolver.resolve(message, columns).await.resolved_column {
                return Ok(column);
            }
        }

        Err(PipelineError::ColumnResolution(format!(
            "Could not resolve a column for {} from '{}'.",
            spec.id, phrases.first
        )))
    }

    /// Two distinct columns. Falls back to asking the collaborator for a
    /// column pair when the extracted phrases do not bind.
    async fn resolve_pair(
        &self,
        phrases: &Phrases,
        message: &str,
        dataset: &Dataset,
    ) -> Result<(String, String), PipelineError> {
        let columns = dataset.columns();

        if let Some(second) = &phrases.second {
            let a = self.resolver.resolve(&phrases.first, columns).await;
            let b = self.resolver.resolve(second, columns).await;
            if let (Some(a), Some(b)) = (a.resolved_column, b.resolved_column) {
                if a != b {
                    return Ok((a, b));
                }
                debug!("Both phrases resolved to '{}'", a);
            }
        }

        info!("Asking collaborator for a column pair");
        let names = self.suggest_pair(message, columns).await;
        if let [a, b] = names.as_slice() {
            let a = self.resolver.resolve(a, columns).await.resolved_column;
            let b = self.resolver.resolve(b, columns).await.resolved_column;
            if let (Some(a), Some(b)) = (a, b) {
                if a != b {
                    return Ok((a, b));
                }
            }
        }

        Err(PipelineError::ColumnResolution(PAIR_FAILURE.to_string()))
    }

    async fn suggest_pair(&self, message: &str, columns: &[String]) -> Vec<String> {
        let listing = columns
            .iter()
            .map(|c| format!("- {}", c))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            r#"Name the two dataset columns the user wants to compare.

Columns:
{listing}

User request:
"{message}"

Reply with the two column names only, one per line, copied exactly."#
        );

        match ask(self.client, &prompt, self.timeout).await {
            Ok(reply) => split_column_names(&reply),
            Err(e) => {
                warn!("Column pair suggestion failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Plain-language reading of a numeric or tabular payload.
    async fn interpret(&self, key: &str, payload: &Value) -> Option<String> {
        let body = serde_json::to_string_pretty(payload).ok()?;
        let prompt = format!(
            r#"Interpret the following statistical output in clear, simple language.
Avoid technical jargon and explain what it means practically.

{body}"#
        );

        match ask(self.client, &prompt, self.timeout).await {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => {
                warn!("Interpretation for {} was empty", key);
                None
            }
            Err(e) => {
                warn!("Interpretation for {} failed: {}", key, e);
                None
            }
        }
    }

    fn write_exports(&self, report: &mut StepReport) {
        match exports::write_results(&self.exports_dir, &report.results) {
            Ok(path) => {
                report
                    .exports
                    .insert("results".to_string(), ExportRef::Single(path.display().to_string()));
            }
            Err(e) => warn!("Could not write results export: {}", e),
        }

        let mut tables = Vec::new();
        for result in &report.results {
            if result.is_ok() && result.tool_id == ToolId::DescriptiveStatistics.as_str() {
                match exports::write_frequency_tables(&self.exports_dir, &result.payload) {
                    Ok(paths) => tables.extend(paths.into_iter().map(|p| p.display().to_string())),
                    Err(e) => warn!("Could not write frequency tables: {}", e),
                }
            }
        }
        if !tables.is_empty() {
            report
                .exports
                .insert("tables".to_string(), ExportRef::Many(tables));
        }
    }
}

/// Result key for a step: the tool name, or the first free `_2`, `_3`, ...
/// suffix when that key is already in use.
fn unique_key(name: &str, taken: &mut HashSet<String>) -> String {
    let mut key = name.to_string();
    let mut n = 1;
    while taken.contains(&key) {
        n += 1;
        key = format!("{}_{}", name, n);
    }
    taken.insert(key.clone());
    key
}

/// Clean a free-form list of column names: fences, bullets, numbering and
/// quotes are removed. A single line is split on `vs` or `|`.
pub fn split_column_names(reply: &str) -> Vec<String> {
    let body = json::strip_fences(reply);
    let clean = |line: &str| -> String {
        let line = line.trim().trim_start_matches(['-', '*', '•']).trim_start();
        let line = match line.split_once(['.', ')']) {
            Some((n, rest)) if !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) => rest,
            _ => line,
        };
        line.trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
            .trim()
            .to_string()
    };

    let mut names: Vec<String> = body
        .lines()
        .map(clean)
        .filter(|l| !l.is_empty())
        .collect();

    if names.len() == 1 {
        let line = names.remove(0);
        names = line
            .split(" vs ")
            .flat_map(|part| part.split(" | "))
            .map(clean)
            .filter(|l| !l.is_empty())
            .collect();
    }

    names.truncate(2);
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedClient;
    use crate::models::ToolId;
    use tempfile::TempDir;

    const SURVEY: &str = "\
How do you track income and expenses?,How many people work in your business?,Gender,Age
Notebook,1,F,30
App,3,M,41
Notebook,2,F,35
Nothing,1,F,29
App,5,M,50
Notebook,1,M,33
";

    fn survey() -> Dataset {
        Dataset::from_csv_bytes("survey.csv", SURVEY.as_bytes()).unwrap()
    }

    fn step(tool: &str, interpret: bool) -> AnalysisStep {
        AnalysisStep {
            tool: ToolRef::from_name(tool),
            reason: "test".to_string(),
            interpret,
        }
    }

    fn settings(dir: &TempDir) -> ExecutorSettings {
        ExecutorSettings {
            confidence_threshold: 0.65,
            timeout: Duration::from_secs(1),
            output_dir: dir.path().to_path_buf(),
        }
    }

    #[test]
    fn test_split_column_names() {
        assert_eq!(
            split_column_names("1. \"Gender\"\n2. Age\n"),
            vec!["Gender", "Age"]
        );
        assert_eq!(split_column_names("- Gender\n- Age"), vec!["Gender", "Age"]);
        assert_eq!(split_column_names("Gender vs Age"), vec!["Gender", "Age"]);
        assert!(split_column_names("").is_empty());
    }

    #[tokio::test]
    async fn test_one_result_per_step_with_failures_isolated() {
        let temp_dir = TempDir::new().unwrap();
        let registry = ToolRegistry::standard();
        let client = ScriptedClient::new()
            .on("Extract the variables", r#"{"phrase_1": "gender", "phrase_2": null}"#);
        let executor = StepExecutor::new(&client, &registry, &settings(&temp_dir));

        let steps = vec![
            step("regression", false),
            step("descriptive_statistics", false),
            step("chi_square_test", false),
            step("countplot", false),
        ];
        let report = executor.execute(&steps, &survey(), "plot gender").await;

        assert_eq!(report.results.len(), 4);
        let status: Vec<bool> = report.results.iter().map(|r| r.is_ok()).collect();
        assert_eq!(status, vec![false, true, false, true]);
        assert_eq!(report.results[0].error.as_deref(), Some("Unknown tool: regression"));
        assert_eq!(report.results[2].error.as_deref(), Some(PAIR_FAILURE));
        assert_eq!(report.results[3].columns, vec!["Gender"]);
        for (i, result) in report.results.iter().enumerate() {
            assert_eq!(result.index, i);
        }
        assert!(matches!(report.exports.get("results"), Some(ExportRef::Single(_))));
        match report.exports.get("tables") {
            Some(ExportRef::Many(tables)) => assert_eq!(tables.len(), 4),
            other => panic!("unexpected tables export: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_repeated_chart_steps_get_distinct_artifacts() {
        let temp_dir = TempDir::new().unwrap();
        let registry = ToolRegistry::standard();
        let client = ScriptedClient::new()
            .on("Extract the variables", r#"{"phrase_1": "Gender", "phrase_2": null}"#);
        let executor = StepExecutor::new(&client, &registry, &settings(&temp_dir));

        let steps = vec![step("countplot", false), step("countplot", false)];
        let report = executor.execute(&steps, &survey(), "plot gender").await;

        assert_eq!(report.results[0].key, "countplot");
        assert_eq!(report.results[1].key, "countplot_2");
        let a = report.visuals.get("countplot").unwrap();
        let b = report.visuals.get("countplot_2").unwrap();
        assert_ne!(a, b);
        assert!(std::path::Path::new(a).exists());
        assert!(std::path::Path::new(b).exists());
    }

    #[test]
    fn test_unique_key_never_reuses_a_key() {
        let mut taken = HashSet::new();
        let keys: Vec<String> = ["countplot", "countplot", "countplot_2"]
            .iter()
            .map(|name| unique_key(name, &mut taken))
            .collect();
        assert_eq!(keys, vec!["countplot", "countplot_2", "countplot_2_2"]);
    }

    #[tokio::test]
    async fn test_literal_suffixed_tool_name_gets_its_own_key() {
        let temp_dir = TempDir::new().unwrap();
        let registry = ToolRegistry::standard();
        let client = ScriptedClient::new()
            .on("Extract the variables", r#"{"phrase_1": "Gender", "phrase_2": null}"#);
        let executor = StepExecutor::new(&client, &registry, &settings(&temp_dir));

        let steps = vec![
            step("countplot", false),
            step("countplot", false),
            step("countplot_2", false),
        ];
        let report = executor.execute(&steps, &survey(), "plot gender").await;

        let keys: HashSet<&str> = report.results.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys.len(), 3);
        assert_eq!(report.results[2].error.as_deref(), Some("Unknown tool: countplot_2"));
        assert_eq!(report.visuals.len(), 2);
    }

    #[tokio::test]
    async fn test_chart_steps_are_never_interpreted() {
        let temp_dir = TempDir::new().unwrap();
        let registry = ToolRegistry::standard();
        let client = ScriptedClient::new()
            .on("Extract the variables", r#"{"phrase_1": "Gender", "phrase_2": null}"#)
            .on("Interpret the following", "Mostly women.");
        let executor = StepExecutor::new(&client, &registry, &settings(&temp_dir));

        let steps = vec![step("piechart", true), step("descriptive_statistics", true)];
        let report = executor.execute(&steps, &survey(), "plot gender").await;

        assert!(report.results[0].artifact_ref.is_some());
        assert_eq!(report.results[0].interpretation, None);
        assert_eq!(report.results[1].artifact_ref, None);
        assert_eq!(report.results[1].interpretation.as_deref(), Some("Mostly women."));
        assert_eq!(client.calls_containing("Interpret the following"), 1);
    }

    #[tokio::test]
    async fn test_semantic_pair_resolution_for_chi_square() {
        let temp_dir = TempDir::new().unwrap();
        let registry = ToolRegistry::standard();
        let client = ScriptedClient::new()
            .on(
                "Extract the variables",
                r#"{"phrase_1": "business income", "phrase_2": "team size"}"#,
            )
            .on(
                "\"business income\"",
                r#"{"best_column": "How do you track income and expenses?", "confidence": 0.8}"#,
            )
            .on(
                "\"team size\"",
                r#"{"best_column": "How many people work in your business?", "confidence": 0.9}"#,
            )
            .on("Interpret the following", "The two answers are not clearly related.");
        let executor = StepExecutor::new(&client, &registry, &settings(&temp_dir));

        let report = executor
            .execute(
                &[step("chi_square_test", true)],
                &survey(),
                "business income vs team size",
            )
            .await;

        let result = &report.results[0];
        assert!(result.is_ok(), "{:?}", result.error);
        assert_eq!(
            result.columns,
            vec![
                "How do you track income and expenses?",
                "How many people work in your business?"
            ]
        );
        assert_eq!(
            result.interpretation.as_deref(),
            Some("The two answers are not clearly related.")
        );
        assert!(report.interpretations[0].starts_with("### chi_square_test"));
    }

    #[tokio::test]
    async fn test_low_confidence_pair_fails_with_resolution_error() {
        let temp_dir = TempDir::new().unwrap();
        let registry = ToolRegistry::standard();
        let client = ScriptedClient::new()
            .on(
                "Extract the variables",
                r#"{"phrase_1": "business income", "phrase_2": "team size"}"#,
            )
            .on("User wants", r#"{"best_column": "Gender", "confidence": 0.3}"#)
            .fail_on("Name the two dataset columns");
        let executor = StepExecutor::new(&client, &registry, &settings(&temp_dir));

        let report = executor
            .execute(&[step("chi_square_test", false)], &survey(), "business income vs team size")
            .await;
        assert_eq!(report.results[0].status, StepStatus::Error);
        assert_eq!(report.results[0].error.as_deref(), Some(PAIR_FAILURE));
    }

    #[tokio::test]
    async fn test_pair_suggestion_rescues_missing_second_phrase() {
        let temp_dir = TempDir::new().unwrap();
        let registry = ToolRegistry::standard();
        let client = ScriptedClient::new()
            .on("Extract the variables", r#"{"phrase_1": "gender", "phrase_2": null}"#)
            .on("Name the two dataset columns", "1. Gender\n2. Age");
        let executor = StepExecutor::new(&client, &registry, &settings(&temp_dir));

        let report = executor
            .execute(&[step("barplot", false)], &survey(), "gender split by age")
            .await;
        let result = &report.results[0];
        assert!(result.is_ok(), "{:?}", result.error);
        assert_eq!(result.columns, vec!["Gender", "Age"]);
        assert!(report.visuals.contains_key("barplot"));
    }

    #[tokio::test]
    async fn test_single_variable_retries_with_message() {
        let temp_dir = TempDir::new().unwrap();
        let registry = ToolRegistry::standard();
        let client = ScriptedClient::new()
            .on("Extract the variables", r#"{"phrase_1": "sex of owner", "phrase_2": null}"#);
        let executor = StepExecutor::new(&client, &registry, &settings(&temp_dir));

        let report = executor
            .execute(&[step("piechart", false)], &survey(), "Gender")
            .await;
        assert_eq!(report.results[0].columns, vec!["Gender"]);
    }

    #[tokio::test]
    async fn test_interpretation_failure_keeps_step_ok() {
        let temp_dir = TempDir::new().unwrap();
        let registry = ToolRegistry::standard();
        let client = ScriptedClient::new().fail_on("Interpret the following");
        let executor = StepExecutor::new(&client, &registry, &settings(&temp_dir));

        let report = executor
            .execute(&[step("descriptive_statistics", true)], &survey(), "describe")
            .await;
        assert!(report.results[0].is_ok());
        assert!(report.results[0].interpretation.is_none());
        assert!(report.interpretations.is_empty());
        assert_eq!(client.calls_containing("Extract the variables"), 0);
    }

    #[tokio::test]
    async fn test_reruns_classify_steps_identically() {
        let temp_dir = TempDir::new().unwrap();
        let registry = ToolRegistry::standard();
        let client = ScriptedClient::new()
            .on("Extract the variables", r#"{"phrase_1": "age", "phrase_2": "gender"}"#);
        let executor = StepExecutor::new(&client, &registry, &settings(&temp_dir));
        let steps = vec![
            step("chi_square_test", false),
            step("cronbach_alpha", false),
            step("piechart", false),
            step("unknown", false),
        ];

        let summary = |r: &StepReport| -> Vec<(String, bool)> {
            r.results.iter().map(|x| (x.key.clone(), x.is_ok())).collect()
        };
        let first = executor.execute(&steps, &survey(), "age vs gender").await;
        let second = executor.execute(&steps, &survey(), "age vs gender").await;
        assert_eq!(summary(&first), summary(&second));
        assert_eq!(first.results[0].tool_id, ToolId::ChiSquareTest.as_str());
    }
}
