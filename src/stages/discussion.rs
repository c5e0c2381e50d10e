//! Discussion stage: relates analysis findings to the literature.

use super::push_list;
use crate::llm::{ask, json, ReasoningClient};
use std::time::Duration;
use tracing::warn;

pub const DISCUSSION_UNAVAILABLE: &str =
    "The discussion section could not be generated at this time. Please try again.";

/// Render a discussion reply. Non-JSON replies are used as they are.
pub fn render_discussion(reply: &str) -> String {
    let Some(map) = json::parse_object(reply) else {
        return reply.trim().to_string();
    };

    let mut out = json::str_field(&map, "discussion_body").unwrap_or_default();
    for (key, heading) in [
        ("implications", "Implications"),
        ("limitations", "Limitations"),
        ("recommendations", "Recommendations"),
        ("references", "References"),
    ] {
        push_list(&mut out, heading, &json::str_list(&map, key));
    }
    out
}

pub struct DiscussionRunner<'a> {
    client: &'a dyn ReasoningClient,
    timeout: Duration,
}

impl<'a> DiscussionRunner<'a> {
    pub fn new(client: &'a dyn ReasoningClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Write the discussion. Missing findings or literature are stated in
    /// the prompt rather than invented.
    pub async fn discuss(
        &self,
        focus: &str,
        findings: Option<&str>,
        literature: Option<&str>,
        word_count: u32,
    ) -> String {
        let findings = findings.unwrap_or("No analysis findings are available.");
        let literature = literature.unwrap_or("No external literature is available.");

        let prompt = format!(
            r#"You are a senior research scientist writing the DISCUSSION section of a journal article.

Focus: {focus}

Analysis Findings:
{findings}

External Literature:
{literature}

Discuss each finding against the literature, citing in (Author, Year) format,
and explain what it implies. Aim for approximately {word_count} words.

OUTPUT FORMAT (STRICT JSON):
{{
  "discussion_body": "structured academic text with headings",
  "implications": ["..."],
  "limitations": ["..."],
  "recommendations": ["..."],
  "references": ["APA 7th edition reference"]
}}"#
        );

        match ask(self.client, &prompt, self.timeout).await {
            Ok(reply) => {
                let text = render_discussion(&reply);
                if text.is_empty() {
                    DISCUSSION_UNAVAILABLE.to_string()
                } else {
                    text
                }
            }
            Err(e) => {
                warn!("Discussion generation failed: {}", e);
                DISCUSSION_UNAVAILABLE.to_string()
            }
        }
    }
}
