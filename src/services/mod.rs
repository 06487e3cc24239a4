pub mod chapterizer;
pub mod document;
pub mod llm;
