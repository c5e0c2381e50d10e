//! Phrase extraction and column resolution.

pub mod column;
pub mod phrase;

pub use column::{ColumnResolver, DEFAULT_CONFIDENCE_THRESHOLD};
pub use phrase::{PhraseExtractor, Phrases};
