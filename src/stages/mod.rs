//! Narrative stages around the analysis: literature review, discussion and
//! the conversational reply.

pub mod arxiv;
pub mod chat;
pub mod discussion;
pub mod literature;

pub use arxiv::ArxivSource;
pub use chat::ChatResponder;
pub use discussion::DiscussionRunner;
pub use literature::{LiteratureRunner, LiteratureSource, PubMedSource};

/// Append a bold-headed bullet list to `out`. Empty lists are skipped.
pub(crate) fn push_list(out: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    if !out.is_empty() {
        out.push_str("\n\n");
    }
    out.push_str(&format!("**{}**\n", heading));
    let lines: Vec<String> = items.iter().map(|i| format!("- {}", i)).collect();
    out.push_str(&lines.join("\n"));
}
