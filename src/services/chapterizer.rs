use crate::models::Chapter;

/// The literal marker chapters are split on. Case- and format-sensitive on
/// purpose: "Chapter 1" or "CHAPTER1" are not boundaries.
pub const CHAPTER_MARKER: &str = "CHAPTER ";

/// Splits the full document text into chapters on the literal marker.
///
/// The segment before the first marker (front matter, preamble) is discarded.
/// Each remaining segment is trimmed and re-prefixed with the marker so the
/// heading survives the split. Labels are numbered by split position, so a
/// segment that trims to nothing is dropped but still consumes its number.
pub fn split_chapters(full_text: &str) -> Vec<Chapter> {
    let mut chapters = Vec::new();

    for (i, segment) in full_text.split(CHAPTER_MARKER).skip(1).enumerate() {
        let trimmed = segment.trim();
        if trimmed.is_empty() {
            continue;
        }
        chapters.push(Chapter {
            label: format!("CHAPTER {}", i + 1),
            text: format!("{CHAPTER_MARKER}{trimmed}"),
        });
    }

    chapters
}
