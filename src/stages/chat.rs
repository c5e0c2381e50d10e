//! Conversational replies for messages that are not research requests.

use crate::llm::{ask, ReasoningClient};
use std::time::Duration;
use tracing::warn;

pub const CAPABILITIES: &str = "Hello! I'm AIRA, your AI research assistant. I can help with:
- Literature reviews (PubMed)
- Statistical analysis (chi-square, Cronbach's alpha, descriptive statistics)
- Data visualizations (count plots, bar plots, pie charts)

Attach a CSV dataset and tell me what you would like to explore.";

pub struct ChatResponder<'a> {
    client: &'a dyn ReasoningClient,
    timeout: Duration,
}

impl<'a> ChatResponder<'a> {
    pub fn new(client: &'a dyn ReasoningClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub async fn reply(&self, message: &str) -> String {
        let prompt = format!(
            r#"You are AIRA (AI Research Assistant): professional, warm and knowledgeable.
Respond naturally to the user message below. If appropriate, mention that you
can help with literature reviews, statistical analysis (chi-square, Cronbach's
alpha, descriptive statistics) and data visualizations.

User message:
{message}"#
        );

        match ask(self.client, &prompt, self.timeout).await {
            Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(_) => CAPABILITIES.to_string(),
            Err(e) => {
                warn!("Chat reply failed: {}", e);
                CAPABILITIES.to_string()
            }
        }
    }
}
