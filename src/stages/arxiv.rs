//! arXiv export API source (Atom feed).

use super::literature::{Article, LiteratureSource};
use crate::error::SourceError;
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::time::Duration;
use tracing::debug;

const SOURCE_NAME: &str = "arXiv";

/// Queries `export.arxiv.org/api/query` and reads the Atom reply.
pub struct ArxivSource {
    api_url: String,
    http_client: reqwest::Client,
}

impl ArxivSource {
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self, SourceError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Request {
                source_name: SOURCE_NAME.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            api_url: api_url.to_string(),
            http_client,
        })
    }
}

/// `all:` terms joined with AND, so every word must appear somewhere.
pub fn search_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|word| format!("all:{}", word))
        .collect::<Vec<_>>()
        .join(" AND ")
}

#[derive(Default)]
struct Entry {
    id: String,
    title: String,
    published: String,
    authors: Vec<String>,
    doi: String,
    journal_ref: String,
}

impl Entry {
    fn push_text(&mut self, field: &str, text: &str) {
        let target = match field {
            "id" => &mut self.id,
            "title" => &mut self.title,
            "published" => &mut self.published,
            "doi" => &mut self.doi,
            "journal_ref" => &mut self.journal_ref,
            "name" => match self.authors.last_mut() {
                Some(author) => author,
                None => return,
            },
            _ => return,
        };
        target.push_str(text);
    }

    fn into_article(self) -> Option<Article> {
        let title = collapse(&self.title);
        if title.is_empty() {
            return None;
        }
        let year = self
            .published
            .trim()
            .get(..4)
            .filter(|y| y.chars().all(|c| c.is_ascii_digit()))
            .map(String::from);

        Some(Article {
            title,
            authors: self
                .authors
                .iter()
                .map(|a| collapse(a))
                .filter(|a| !a.is_empty())
                .collect(),
            year,
            journal: non_empty(&self.journal_ref),
            doi: non_empty(&self.doi),
            url: self.id.trim().replacen("http://", "https://", 1),
            source: SOURCE_NAME.to_string(),
        })
    }
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(text: &str) -> Option<String> {
    let text = collapse(text);
    (!text.is_empty()).then_some(text)
}

/// Articles from an Atom feed, in feed order. Feed-level elements such as
/// the feed title are ignored.
pub fn parse_atom(xml: &str) -> Result<Vec<Article>, SourceError> {
    let mut reader = Reader::from_str(xml);
    let mut path: Vec<String> = Vec::new();
    let mut entry: Option<Entry> = None;
    let mut articles = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "entry" {
                    entry = Some(Entry::default());
                } else if let (true, Some(current)) = (name == "name", entry.as_mut()) {
                    current.authors.push(String::new());
                }
                path.push(name);
            }
            Ok(Event::End(_)) => {
                if path.pop().as_deref() == Some("entry") {
                    if let Some(article) = entry.take().and_then(Entry::into_article) {
                        articles.push(article);
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(current), Some(field)) = (entry.as_mut(), path.last()) {
                    let text = t.unescape().map_err(|e| SourceError::Decode {
                        source_name: SOURCE_NAME.to_string(),
                        message: e.to_string(),
                    })?;
                    current.push_text(field, &text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SourceError::Decode {
                    source_name: SOURCE_NAME.to_string(),
                    message: format!("at byte {}: {}", reader.buffer_position(), e),
                })
            }
            _ => {}
        }
    }

    Ok(articles)
}

#[async_trait]
impl LiteratureSource for ArxivSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Article>, SourceError> {
        let response = self
            .http_client
            .get(&self.api_url)
            .query(&[
                ("search_query", search_query(query)),
                ("start", "0".to_string()),
                ("max_results", max_results.to_string()),
            ])
            .send()
            .await
            .map_err(|e| SourceError::Request {
                source_name: SOURCE_NAME.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(SourceError::Status {
                source_name: SOURCE_NAME.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| SourceError::Decode {
            source_name: SOURCE_NAME.to_string(),
            message: e.to_string(),
        })?;
        let articles = parse_atom(&body)?;
        debug!("arXiv returned {} article(s) for '{}'", articles.len(), query);
        Ok(articles)
    }
}
