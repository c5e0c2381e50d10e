//! Literature review stage.
//!
//! Queries every configured source concurrently, then asks the reasoning
//! collaborator to synthesise the retrieved articles. Citations are
//! formatted in APA style.

use super::push_list;
use crate::error::SourceError;
use crate::llm::{ask, json, ReasoningClient};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const NO_ARTICLES: &str = "No articles found for this topic.";

/// One retrieved article.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Article {
    pub title: String,
    /// Author names as the source reports them.
    pub authors: Vec<String>,
    pub year: Option<String>,
    pub journal: Option<String>,
    pub doi: Option<String>,
    pub url: String,
    pub source: String,
}

/// A searchable bibliographic database.
#[async_trait]
pub trait LiteratureSource: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Article>, SourceError>;
}

/// Split a name into (last name, given-name parts). Handles both
/// "Jane A. Smith" and PubMed's "Smith JA".
fn split_name(name: &str) -> (String, Vec<String>) {
    let parts: Vec<&str> = name.split_whitespace().collect();
    match parts.as_slice() {
        [] => (String::new(), Vec::new()),
        [only] => (only.to_string(), Vec::new()),
        [first @ .., last] => {
            let is_initials =
                last.len() <= 3 && last.chars().all(|c| c.is_ascii_uppercase());
            if is_initials {
                let given = last.chars().map(|c| c.to_string()).collect();
                (first.join(" "), given)
            } else {
                let given = first.iter().map(|p| p.to_string()).collect();
                (last.to_string(), given)
            }
        }
    }
}

fn last_name(name: &str) -> String {
    split_name(name).0
}

/// "Smith, J. A."
pub fn format_author(name: &str) -> String {
    let (last, given) = split_name(name);
    if given.is_empty() {
        return last;
    }
    let initials: Vec<String> = given
        .iter()
        .filter_map(|g| g.chars().next())
        .map(|c| format!("{}.", c))
        .collect();
    format!("{}, {}", last, initials.join(" "))
}

/// Reference-list author string: "A", "A & B", "A, B, & C".
pub fn format_authors(authors: &[String]) -> String {
    let formatted: Vec<String> = authors.iter().map(|a| format_author(a)).collect();
    match formatted.as_slice() {
        [] => String::new(),
        [one] => one.clone(),
        [a, b] => format!("{} & {}", a, b),
        [rest @ .., last] => format!("{}, & {}", rest.join(", "), last),
    }
}

/// "(Smith, 2021)", "(Smith & Jones, 2021)", "(Smith et al., 2021)".
pub fn in_text_citation(authors: &[String], year: Option<&str>) -> String {
    let year = year.unwrap_or("n.d.");
    match authors {
        [] => format!("({})", year),
        [one] => format!("({}, {})", last_name(one), year),
        [a, b] => format!("({} & {}, {})", last_name(a), last_name(b), year),
        [a, ..] => format!("({} et al., {})", last_name(a), year),
    }
}

/// APA 7th reference entry.
pub fn apa_reference(article: &Article) -> String {
    let authors = if article.authors.is_empty() {
        "Unknown".to_string()
    } else {
        format_authors(&article.authors)
    };
    let mut citation = format!(
        "{} ({}). {}.",
        authors,
        article.year.as_deref().unwrap_or("n.d."),
        article.title.trim_end_matches('.')
    );
    if let Some(journal) = &article.journal {
        citation.push_str(&format!(" {}.", journal));
    }
    match &article.doi {
        Some(doi) => citation.push_str(&format!(" https://doi.org/{}", doi)),
        None if !article.url.is_empty() => citation.push_str(&format!(" {}", article.url)),
        None => {}
    }
    citation
}

/// NCBI E-utilities (esearch + esummary, JSON mode).
pub struct PubMedSource {
    base_url: String,
    http_client: reqwest::Client,
}

impl PubMedSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SourceError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Request {
                source_name: "PubMed".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    async fn get_json(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value, SourceError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .http_client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| SourceError::Request {
                source_name: self.name().to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(SourceError::Status {
                source_name: self.name().to_string(),
                status: response.status().as_u16(),
            });
        }

        response.json().await.map_err(|e| SourceError::Decode {
            source_name: self.name().to_string(),
            message: e.to_string(),
        })
    }
}

/// PMIDs from an esearch reply.
pub fn parse_esearch(value: &Value) -> Vec<String> {
    value["esearchresult"]["idlist"]
        .as_array()
        .map(|ids| {
            ids.iter()
                .filter_map(|id| id.as_str())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Articles from an esummary reply, in `uids` order.
pub fn parse_esummary(value: &Value) -> Vec<Article> {
    let result = &value["result"];
    let Some(uids) = result["uids"].as_array() else {
        return Vec::new();
    };

    uids.iter()
        .filter_map(|uid| uid.as_str())
        .filter_map(|uid| {
            let doc = &result[uid];
            let title = doc["title"].as_str()?.trim().to_string();
            if title.is_empty() {
                return None;
            }
            let authors = doc["authors"]
                .as_array()
                .map(|list| {
                    list.iter()
                        .filter_map(|a| a["name"].as_str())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default();
            let year = doc["pubdate"]
                .as_str()
                .and_then(|d| d.split_whitespace().next())
                .filter(|y| y.len() == 4 && y.chars().all(|c| c.is_ascii_digit()))
                .map(String::from);
            let journal = doc["fulljournalname"]
                .as_str()
                .or_else(|| doc["source"].as_str())
                .filter(|j| !j.is_empty())
                .map(String::from);
            let doi = doc["articleids"].as_array().and_then(|ids| {
                ids.iter()
                    .find(|id| id["idtype"] == "doi")
                    .and_then(|id| id["value"].as_str())
                    .map(String::from)
            });

            Some(Article {
                title,
                authors,
                year,
                journal,
                doi,
                url: format!("https://pubmed.ncbi.nlm.nih.gov/{}/", uid),
                source: "PubMed".to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl LiteratureSource for PubMedSource {
    fn name(&self) -> &str {
        "PubMed"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Article>, SourceError> {
        let search = self
            .get_json(
                "esearch.fcgi",
                &[
                    ("db", "pubmed".to_string()),
                    ("term", query.to_string()),
                    ("retmax", max_results.to_string()),
                    ("retmode", "json".to_string()),
                ],
            )
            .await?;

        let ids = parse_esearch(&search);
        debug!("PubMed returned {} id(s) for '{}'", ids.len(), query);
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let summary = self
            .get_json(
                "esummary.fcgi",
                &[
                    ("db", "pubmed".to_string()),
                    ("id", ids.join(",")),
                    ("retmode", "json".to_string()),
                ],
            )
            .await?;
        Ok(parse_esummary(&summary))
    }
}

/// Output of the literature stage.
#[derive(Debug, Clone)]
pub struct LiteratureReview {
    pub text: String,
    pub articles: Vec<Article>,
}

/// Turn the synthesis reply into narrative text. Non-JSON replies are used
/// as they are.
pub fn render_review(reply: &str, articles: &[Article]) -> String {
    let Some(map) = json::parse_object(reply) else {
        return reply.trim().to_string();
    };

    let mut out = json::str_field(&map, "theme_summary").unwrap_or_default();
    push_list(&mut out, "Key findings", &json::str_list(&map, "key_findings"));
    push_list(&mut out, "Research gaps", &json::str_list(&map, "research_gaps"));

    let mut references = json::str_list(&map, "references");
    if references.is_empty() {
        references = articles.iter().map(apa_reference).collect();
    }
    push_list(&mut out, "References", &references);
    out
}

pub struct LiteratureRunner<'a> {
    client: &'a dyn ReasoningClient,
    sources: &'a [Box<dyn LiteratureSource>],
    max_results: usize,
    timeout: Duration,
}

impl<'a> LiteratureRunner<'a> {
    pub fn new(
        client: &'a dyn ReasoningClient,
        sources: &'a [Box<dyn LiteratureSource>],
        max_results: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            sources,
            max_results,
            timeout,
        }
    }

    /// Search all sources at once and merge their articles in source order.
    /// A failing source is logged and skipped.
    pub async fn gather(&self, topic: &str) -> Vec<Article> {
        let searches = self
            .sources
            .iter()
            .map(|source| source.search(topic, self.max_results));
        let outcomes = join_all(searches).await;

        let mut articles = Vec::new();
        for (source, outcome) in self.sources.iter().zip(outcomes) {
            match outcome {
                Ok(found) => {
                    info!("{}: {} article(s)", source.name(), found.len());
                    articles.extend(found);
                }
                Err(e) => warn!("Literature source failed: {}", e),
            }
        }
        articles
    }

    pub async fn review(&self, topic: &str, tone: &str, word_count: u32) -> LiteratureReview {
        let articles = self.gather(topic).await;
        if articles.is_empty() {
            return LiteratureReview {
                text: NO_ARTICLES.to_string(),
                articles,
            };
        }

        let listing: Vec<Value> = articles
            .iter()
            .map(|a| {
                serde_json::json!({
                    "title": a.title,
                    "citation": in_text_citation(&a.authors, a.year.as_deref()),
                    "reference": apa_reference(a),
                    "journal": a.journal,
                    "source": a.source,
                })
            })
            .collect();
        let listing = serde_json::to_string_pretty(&listing).unwrap_or_default();

        let prompt = format!(
            r#"You are an academic researcher conducting a rigorous literature review on "{topic}".

Synthesize the retrieved articles below: identify themes, compare findings and
note gaps. Base every claim on these articles only and cite them in APA style
using the given in-text citations.

Tone: {tone}
Target length: approximately {word_count} words

Articles:
{listing}

Output MUST be valid JSON only:
{{
  "theme_summary": "synthesized overview",
  "key_findings": ["..."],
  "research_gaps": ["..."],
  "references": ["APA citation", "..."]
}}"#
        );

        let text = match ask(self.client, &prompt, self.timeout).await {
            Ok(reply) => render_review(&reply, &articles),
            Err(e) => {
                warn!("Literature synthesis failed: {}", e);
                let mut out =
                    "A synthesis could not be generated right now. Retrieved articles:".to_string();
                let refs: Vec<String> = articles.iter().map(apa_reference).collect();
                push_list(&mut out, "References", &refs);
                out
            }
        };

        LiteratureReview { text, articles }
    }
}
