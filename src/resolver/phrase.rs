//! Pulling variable phrases out of a user message.

use crate::llm::{ask, json, ReasoningClient};
use std::time::Duration;
use tracing::{debug, warn};

/// Leading words that name an action rather than a variable.
const ACTION_WORDS: &[&str] = &[
    "plot",
    "show",
    "test",
    "compare",
    "visualize",
    "visualise",
    "draw",
    "display",
    "analyze",
    "analyse",
    "run",
    "create",
    "make",
    "generate",
    "calculate",
    "compute",
    "give",
    "me",
    "please",
    "a",
    "an",
    "the",
];

/// Up to two variable phrases mentioned in a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phrases {
    pub first: String,
    pub second: Option<String>,
}

impl Phrases {
    /// The whole message as the only phrase.
    pub fn whole_message(message: &str) -> Self {
        Self {
            first: message.trim().to_string(),
            second: None,
        }
    }
}

/// Drop leading action and filler words. Returns the input unchanged if
/// nothing would be left.
pub fn strip_action_words(phrase: &str) -> String {
    let words: Vec<&str> = phrase.split_whitespace().collect();
    let skip = words
        .iter()
        .take_while(|w| {
            let bare = w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            ACTION_WORDS.contains(&bare.as_str())
        })
        .count();

    if skip == words.len() {
        phrase.trim().to_string()
    } else {
        words[skip..].join(" ")
    }
}

fn clean(raw: Option<String>) -> Option<String> {
    raw.map(|p| strip_action_words(p.trim_matches(|c: char| c == '"' || c == '\'')))
        .filter(|p| !p.is_empty())
}

/// Read phrases from a collaborator reply: a JSON object with
/// `phrase_1`/`phrase_2` (or `x`/`y`), or `key: value` lines.
pub fn parse_phrases(response: &str) -> Option<Phrases> {
    let (first, second) = match json::parse_object(response) {
        Some(map) => (
            json::str_field(&map, "phrase_1").or_else(|| json::str_field(&map, "x")),
            json::str_field(&map, "phrase_2").or_else(|| json::str_field(&map, "y")),
        ),
        None => {
            let mut first = None;
            let mut second = None;
            for line in response.lines() {
                let Some((key, value)) = line.split_once(':') else {
                    continue;
                };
                let value = value.trim();
                if value.is_empty() || value.eq_ignore_ascii_case("null") {
                    continue;
                }
                match key.trim().trim_start_matches(['-', '*', ' ']).to_lowercase().as_str() {
                    "phrase_1" | "x" => first = Some(value.to_string()),
                    "phrase_2" | "y" => second = Some(value.to_string()),
                    _ => {}
                }
            }
            (first, second)
        }
    };

    let first = clean(first)?;
    let second = clean(second).filter(|s| !s.eq_ignore_ascii_case(&first));
    Some(Phrases { first, second })
}

/// Extracts variable phrases with the reasoning collaborator. Never fails:
/// any problem degrades to the whole message as a single phrase.
pub struct PhraseExtractor<'a> {
    client: &'a dyn ReasoningClient,
    timeout: Duration,
}

impl<'a> PhraseExtractor<'a> {
    pub fn new(client: &'a dyn ReasoningClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub async fn extract(&self, message: &str, columns: &[String]) -> Phrases {
        let listing = columns
            .iter()
            .map(|c| format!("- {}", c))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            r#"Extract the variables the user is asking about.

Dataset columns:
{listing}

User request:
"{message}"

Return STRICT JSON only:
{{"phrase_1": "first variable", "phrase_2": "second variable or null"}}

Rules:
- Use the exact column wording when the user clearly refers to a column
- Leave out actions such as plot, show, test or compare
- Use null for phrase_2 when only one variable is mentioned"#
        );

        match ask(self.client, &prompt, self.timeout).await {
            Ok(response) => match parse_phrases(&response) {
                Some(phrases) => {
                    debug!("Extracted phrases: {:?}", phrases);
                    phrases
                }
                None => {
                    warn!("Phrase extraction returned nothing usable");
                    Phrases::whole_message(message)
                }
            },
            Err(e) => {
                warn!("Phrase extraction failed: {}", e);
                Phrases::whole_message(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedClient;

    #[test]
    fn test_strip_action_words() {
        assert_eq!(strip_action_words("plot the gender"), "gender");
        assert_eq!(strip_action_words("Show me: age group"), "age group");
        assert_eq!(strip_action_words("business income"), "business income");
        assert_eq!(strip_action_words("test"), "test");
    }

    #[test]
    fn test_parse_json_phrases() {
        let p = parse_phrases(r#"{"phrase_1": "business income", "phrase_2": "team size"}"#).unwrap();
        assert_eq!(p.first, "business income");
        assert_eq!(p.second.as_deref(), Some("team size"));
    }

    #[test]
    fn test_parse_xy_keys_and_null() {
        let p = parse_phrases("```json\n{\"x\": \"plot gender\", \"y\": null}\n```").unwrap();
        assert_eq!(p.first, "gender");
        assert_eq!(p.second, None);
    }

    #[test]
    fn test_parse_key_value_lines() {
        let p = parse_phrases("x: region\ny: monthly income").unwrap();
        assert_eq!(p.first, "region");
        assert_eq!(p.second.as_deref(), Some("monthly income"));
    }

    #[test]
    fn test_duplicate_second_phrase_dropped() {
        let p = parse_phrases(r#"{"phrase_1": "age", "phrase_2": "Age"}"#).unwrap();
        assert_eq!(p.second, None);
    }

    #[test]
    fn test_unusable_reply() {
        assert!(parse_phrases("I am not sure what you mean").is_none());
        assert!(parse_phrases(r#"{"phrase_1": ""}"#).is_none());
    }

    #[tokio::test]
    async fn test_extract_degrades_to_whole_message() {
        let client = ScriptedClient::new().fail_on("Extract the variables");
        let extractor = PhraseExtractor::new(&client, Duration::from_secs(1));
        let p = extractor
            .extract("  compare business income vs team size ", &["a".to_string()])
            .await;
        assert_eq!(p, Phrases::whole_message("compare business income vs team size"));
    }

    #[tokio::test]
    async fn test_extract_lists_columns_in_prompt() {
        let client = ScriptedClient::new().on(
            "Extract the variables",
            r#"{"phrase_1": "Gender", "phrase_2": null}"#,
        );
        let extractor = PhraseExtractor::new(&client, Duration::from_secs(1));
        let columns = vec!["Gender".to_string(), "Age".to_string()];
        let p = extractor.extract("plot gender", &columns).await;
        assert_eq!(p.first, "Gender");
        assert!(client.prompts()[0].contains("- Age"));
    }
}
