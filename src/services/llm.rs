use anyhow::{Result, anyhow};
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

/// Gemini generateContent endpoint used when `GEMINI_API_URL` is not set.
pub const DEFAULT_API_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-pro:generateContent";

/// Token in the prompt template that gets replaced with the selected text.
pub const PROMPT_PLACEHOLDER: &str = "{book_text}";

/// The prompt a fresh session starts with. Users may edit it freely; the
/// `{book_text}` placeholder and the `<markdown>` output tags are what the
/// extraction step relies on.
pub const DEFAULT_PROMPT: &str = r#"# Mission

You are an expert teacher extracting key concepts, lessons and actionable frameworks from book chapters. Your job is to provide a comprehensive, accurate and detailed summary of the content with a focus on practical application. This should replace needing to read the original content.

# Rules

Read through the text carefully. Extract a comprehensive, accurate and detailed summary of the content and present it in well-organized markdown.

Look specifically for:
- Practical concepts and lessons
- Specific anecdotes or stories that help explain a concept or lesson
- Specific actionable steps, how-tos or frameworks

# Expected Input

You will receive the full text from the file.

<book_text>
{book_text}
</book_text>

# Output Format (in markdown)

1. Summary: a high-level executive summary of the content including the overall topics, purpose and expected outcomes.
2. Topics: the key topics, concepts and lessons in concise bullet points, including specific outcomes for the learner.
3. Content: a comprehensive, accurate and detailed summary of ALL content with a focus on practical application, including the anecdotes or stories that support each concept.
4. Action Items: a list of specific action items, how-to steps or frameworks for applying the knowledge.

IMPORTANT: output your response within <markdown></markdown> tags.

<markdown>

*Summary:*
...

*Topics:*
- ...

*Content:*
- ...

*Action items:*
- ...

</markdown>
"#;

// Wire shape of a generateContent reply; only the text path is kept.
#[derive(Deserialize, Debug)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Debug)]
struct CandidatePart {
    text: String,
}

pub struct LlmClient {
    client: reqwest::Client,
    api_url: String,
}

impl LlmClient {
    pub fn new() -> Result<Self> {
        let api_url =
            std::env::var("GEMINI_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        Self::with_api_url(api_url)
    }

    pub fn with_api_url(api_url: String) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(LlmClient { client, api_url })
    }

    /// Substitutes the selected text into the prompt template, calls the
    /// model once with no timeout or retry, and pulls the `<markdown>`
    /// section out of the reply. `Ok(None)` means the model answered but the
    /// tags were missing; any transport or API failure is an `Err` with the
    /// raw error string.
    pub async fn extract_lessons(
        &self,
        book_text: &str,
        api_key: &str,
        prompt_template: &str,
    ) -> Result<Option<String>> {
        let prompt = prompt_template.replace(PROMPT_PLACEHOLDER, book_text);

        let response = self
            .client
            .post(&self.api_url)
            .query(&[("key", api_key)])
            .json(&json!({
                "contents": [{
                    "parts": [{ "text": prompt }]
                }]
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("model API returned {status}: {body}"));
        }

        let parsed: GeminiResponse = response.json().await?;
        let raw = parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .unwrap_or_default();

        extract_markdown(&raw)
    }
}

/// Returns the trimmed text between the first `<markdown>...</markdown>`
/// pair, matched case-insensitively across lines, or `None` when absent.
pub fn extract_markdown(raw: &str) -> Result<Option<String>> {
    let re = Regex::new(r"(?is)<markdown>(.*?)</markdown>")?;
    Ok(re
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string()))
}
