//! Binding free-text phrases to dataset columns.
//!
//! Resolution runs an ordered chain of phases and stops at the first one
//! that yields a confident answer:
//!
//! 1. exact match on normalised text,
//! 2. lexical similarity (Sørensen–Dice over character bigrams),
//! 3. semantic match by the reasoning collaborator.
//!
//! Whatever phase answers, the returned column is always a literal member
//! of the supplied column list.

use crate::llm::{ask, json, ReasoningClient};
use crate::models::{ColumnResolution, ResolutionMethod};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Minimum score for a non-exact match.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.65;

/// Case-fold, collapse every whitespace run (tabs, newlines, non-breaking
/// spaces) to a single space, and trim.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalised text with punctuation folded to spaces, for scoring.
fn scoring_form(text: &str) -> String {
    let folded: String = normalize(text)
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    normalize(&folded)
}

/// Similarity in `[0, 1]` between a phrase and a column name.
pub fn lexical_score(phrase: &str, column: &str) -> f64 {
    strsim::sorensen_dice(&scoring_form(phrase), &scoring_form(column))
}

/// Phase 1: equal normalised forms. First matching column wins.
pub fn exact_match(phrase: &str, columns: &[String]) -> Option<ColumnResolution> {
    let target = normalize(phrase);
    if target.is_empty() {
        return None;
    }
    columns
        .iter()
        .find(|c| normalize(c) == target)
        .map(|c| ColumnResolution {
            phrase: phrase.to_string(),
            resolved_column: Some(c.clone()),
            method: Some(ResolutionMethod::Exact),
            confidence: 1.0,
        })
}

/// Best-scoring column by lexical similarity. Ties keep the earlier column.
pub fn best_lexical(phrase: &str, columns: &[String]) -> Option<(String, f64)> {
    let mut best: Option<(String, f64)> = None;
    for column in columns {
        let score = lexical_score(phrase, column);
        if best.as_ref().map_or(true, |(_, s)| score > *s) {
            best = Some((column.clone(), score));
        }
    }
    best
}

/// Phase 2: arg-max lexical similarity, accepted at or above `threshold`.
pub fn lexical_match(phrase: &str, columns: &[String], threshold: f64) -> Option<ColumnResolution> {
    let (column, score) = best_lexical(phrase, columns)?;
    debug!("Lexical best for '{}': '{}' ({:.3})", phrase, column, score);
    (score >= threshold).then(|| ColumnResolution {
        phrase: phrase.to_string(),
        resolved_column: Some(column),
        method: Some(ResolutionMethod::Lexical),
        confidence: score,
    })
}

/// Validate a semantic answer: confident enough and literally one of the
/// columns. Anything else is rejected.
pub fn accept_semantic(
    phrase: &str,
    response: &str,
    columns: &[String],
    threshold: f64,
) -> Option<ColumnResolution> {
    let map = json::parse_object(response)?;
    let column = json::str_field(&map, "best_column").or_else(|| json::str_field(&map, "column"))?;
    let confidence = json::f64_field(&map, "confidence")
        .filter(|c| c.is_finite())
        .unwrap_or(0.0);

    if confidence < threshold {
        debug!(
            "Semantic match '{}' below threshold ({:.2} < {:.2})",
            column, confidence, threshold
        );
        return None;
    }

    // Compare against the raw reply too: str_field trims, but a column
    // name may legitimately carry surrounding whitespace.
    let raw = map.get("best_column").or_else(|| map.get("column")).and_then(|v| v.as_str());
    let literal = columns
        .iter()
        .find(|c| Some(c.as_str()) == raw || **c == column);

    match literal {
        Some(c) => Some(ColumnResolution {
            phrase: phrase.to_string(),
            resolved_column: Some(c.clone()),
            method: Some(ResolutionMethod::Semantic),
            confidence: confidence.min(1.0),
        }),
        None => {
            warn!("Semantic match returned unknown column '{}'", column);
            None
        }
    }
}

/// Resolution phases, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Exact,
    Lexical,
    Semantic,
}

const RESOLUTION_CHAIN: [Phase; 3] = [Phase::Exact, Phase::Lexical, Phase::Semantic];

/// Resolves phrases against a column set.
pub struct ColumnResolver<'a> {
    client: &'a dyn ReasoningClient,
    threshold: f64,
    timeout: Duration,
}

impl<'a> ColumnResolver<'a> {
    pub fn new(client: &'a dyn ReasoningClient, threshold: f64, timeout: Duration) -> Self {
        Self {
            client,
            threshold,
            timeout,
        }
    }

    /// Resolve one phrase. Unresolved is a terminal answer; callers must not
    /// substitute a default column.
    pub async fn resolve(&self, phrase: &str, columns: &[String]) -> ColumnResolution {
        if phrase.trim().is_empty() || columns.is_empty() {
            return ColumnResolution::unresolved(phrase);
        }

        for phase in RESOLUTION_CHAIN {
            let outcome = match phase {
                Phase::Exact => exact_match(phrase, columns),
                Phase::Lexical => lexical_match(phrase, columns, self.threshold),
                Phase::Semantic => self.semantic_match(phrase, columns).await,
            };
            if let Some(resolution) = outcome {
                info!(
                    "Resolved '{}' -> '{}' ({}, {:.2})",
                    phrase,
                    resolution.resolved_column.as_deref().unwrap_or_default(),
                    resolution
                        .method
                        .map(|m| m.to_string())
                        .unwrap_or_default(),
                    resolution.confidence
                );
                return resolution;
            }
        }

        info!("Could not resolve '{}' to a column", phrase);
        ColumnResolution::unresolved(phrase)
    }

    async fn semantic_match(&self, phrase: &str, columns: &[String]) -> Option<ColumnResolution> {
        let listing = serde_json::to_string_pretty(columns).ok()?;
        let prompt = format!(
            r#"You are given dataset columns:

{listing}

User wants:
"{phrase}"

Return STRICT JSON only:
{{
  "best_column": string | null,
  "confidence": number between 0 and 1
}}

Rules:
- Choose only from the provided columns and copy the name exactly
- Return null if uncertain"#
        );

        match ask(self.client, &prompt, self.timeout).await {
            Ok(response) => accept_semantic(phrase, &response, columns, self.threshold),
            Err(e) => {
                warn!("Semantic column match failed for '{}': {}", phrase, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedClient;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn survey_columns() -> Vec<String> {
        cols(&[
            "How do you track income and expenses?",
            "How many people work in your business?",
            "Gender\u{a0}",
            "Age  Group",
        ])
    }

    #[test]
    fn test_normalize_collapses_all_whitespace() {
        assert_eq!(normalize("  Age\t\nGroup\u{a0} "), "age group");
        assert_eq!(normalize("GENDER"), "gender");
    }

    #[tokio::test]
    async fn test_exact_match_wins_for_every_threshold() {
        let client = ScriptedClient::new();
        let columns = survey_columns();
        for tau in [0.0, 0.3, 0.65, 0.99, 1.0] {
            let resolver = ColumnResolver::new(&client, tau, Duration::from_secs(1));
            let r = resolver.resolve("age group", &columns).await;
            assert_eq!(r.resolved_column.as_deref(), Some("Age  Group"));
            assert_eq!(r.method, Some(ResolutionMethod::Exact));
            assert_eq!(r.confidence, 1.0);
        }
        assert_eq!(client.prompts().len(), 0);
    }

    #[tokio::test]
    async fn test_exact_match_handles_nbsp_headers() {
        let client = ScriptedClient::new();
        let resolver = ColumnResolver::new(&client, 0.65, Duration::from_secs(1));
        let r = resolver.resolve("gender", &survey_columns()).await;
        assert_eq!(r.resolved_column.as_deref(), Some("Gender\u{a0}"));
    }

    #[tokio::test]
    async fn test_lexical_match_ignores_punctuation() {
        let client = ScriptedClient::new();
        let columns = cols(&["Age Group?", "Region"]);
        let resolver = ColumnResolver::new(&client, 0.65, Duration::from_secs(1));
        let r = resolver.resolve("age group", &columns).await;
        assert_eq!(r.resolved_column.as_deref(), Some("Age Group?"));
        assert_eq!(r.method, Some(ResolutionMethod::Lexical));
        assert!(r.confidence >= 0.65);
        assert_eq!(client.prompts().len(), 0);
    }

    #[tokio::test]
    async fn test_semantic_fallback_accepts_confident_literal_column() {
        let client = ScriptedClient::new().on(
            "\"business income\"",
            r#"```json
{"best_column": "How do you track income and expenses?", "confidence": 0.82}
```"#,
        );
        let resolver = ColumnResolver::new(&client, 0.65, Duration::from_secs(1));
        let r = resolver.resolve("business income", &survey_columns()).await;
        assert_eq!(
            r.resolved_column.as_deref(),
            Some("How do you track income and expenses?")
        );
        assert_eq!(r.method, Some(ResolutionMethod::Semantic));
    }

    #[tokio::test]
    async fn test_semantic_low_confidence_is_unresolved() {
        let client = ScriptedClient::new().on(
            "User wants",
            r#"{"best_column": "How many people work in your business?", "confidence": 0.4}"#,
        );
        let resolver = ColumnResolver::new(&client, 0.65, Duration::from_secs(1));
        let r = resolver.resolve("team size", &survey_columns()).await;
        assert!(!r.is_resolved());
        assert_eq!(r.method, None);
    }

    #[test]
    fn test_semantic_non_finite_confidence_is_rejected() {
        let columns = vec!["Gender".to_string(), "Age".to_string()];
        for reply in [
            r#"{"best_column": "Gender", "confidence": "NaN"}"#,
            r#"{"best_column": "Gender", "confidence": "inf"}"#,
        ] {
            assert_eq!(accept_semantic("sex", reply, &columns, 0.65), None);
        }
    }

    #[tokio::test]
    async fn test_semantic_fabricated_column_is_rejected() {
        let client = ScriptedClient::new().on(
            "User wants",
            r#"{"best_column": "Team Size", "confidence": 0.99}"#,
        );
        let resolver = ColumnResolver::new(&client, 0.65, Duration::from_secs(1));
        let r = resolver.resolve("team size", &survey_columns()).await;
        assert!(!r.is_resolved());
    }

    #[tokio::test]
    async fn test_collaborator_failure_is_unresolved() {
        let client = ScriptedClient::new().fail_on("User wants");
        let resolver = ColumnResolver::new(&client, 0.65, Duration::from_secs(1));
        let r = resolver.resolve("favourite colour", &survey_columns()).await;
        assert!(!r.is_resolved());
    }

    #[tokio::test]
    async fn test_resolution_is_monotonic_in_threshold() {
        let client = ScriptedClient::new();
        let columns = cols(&["Monthly Income (NGN)", "Years in business", "Region"]);
        let phrases = ["monthly income", "income", "years business", "region", "yrs", "zzz"];
        let thresholds = [0.2, 0.4, 0.6, 0.8, 1.0];

        let mut previous: Option<Vec<bool>> = None;
        for tau in thresholds {
            let resolver = ColumnResolver::new(&client, tau, Duration::from_secs(1));
            let mut resolved = Vec::new();
            for p in phrases {
                resolved.push(resolver.resolve(p, &columns).await.is_resolved());
            }
            if let Some(prev) = &previous {
                for (now, before) in resolved.iter().zip(prev) {
                    assert!(!now || *before, "resolution grew when threshold rose to {}", tau);
                }
            }
            previous = Some(resolved);
        }
    }

    #[tokio::test]
    async fn test_never_returns_column_outside_set() {
        let client = ScriptedClient::new().on(
            "User wants",
            r#"{"best_column": "Invented", "confidence": 1.0}"#,
        );
        let columns = cols(&["alpha", "beta"]);
        let resolver = ColumnResolver::new(&client, 0.65, Duration::from_secs(1));
        for phrase in ["alpha", "ALPHA ", "alph", "gamma", "Invented"] {
            let r = resolver.resolve(phrase, &columns).await;
            if let Some(col) = r.resolved_column {
                assert!(columns.contains(&col));
            }
        }
    }

    #[tokio::test]
    async fn test_empty_phrase_is_unresolved() {
        let client = ScriptedClient::new();
        let resolver = ColumnResolver::new(&client, 0.65, Duration::from_secs(1));
        assert!(!resolver.resolve("   ", &survey_columns()).await.is_resolved());
    }
}
