use serde::{Deserialize, Serialize};

/// Selector value that stands for the whole document rather than one chapter.
pub const ALL_CHAPTERS: &str = "ALL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub label: String,
    pub text: String,
}

/// The last uploaded book and everything derived from it. Replaced wholesale
/// on the next upload.
#[derive(Debug, Clone, Default)]
pub struct Book {
    pub file_name: String,
    pub raw: Vec<u8>,
    pub full_text: String,
    pub chapters: Vec<Chapter>,
}

impl Book {
    /// Resolves a chapter selector to its text. `ALL` maps to the full
    /// document text, anything else must match a chapter label exactly.
    pub fn text_for(&self, selection: &str) -> Option<&str> {
        if selection == ALL_CHAPTERS {
            return Some(&self.full_text);
        }
        self.chapters
            .iter()
            .find(|c| c.label == selection)
            .map(|c| c.text.as_str())
    }
}

/// Outcome of one extraction request, as shown to the user.
#[derive(Debug, Clone)]
pub enum Extraction {
    /// Markdown pulled from between the response's `<markdown>` tags.
    Lessons(String),
    /// The model answered but the tags were missing.
    NoResult,
    /// The call itself failed; the raw error string is surfaced.
    Failed(String),
}
