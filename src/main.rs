mod models;
mod services;

use std::sync::Arc;

use axum::{
    Form, Router,
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::{Html, Redirect},
    routing::{get, post},
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{EnvFilter, fmt};

use models::{ALL_CHAPTERS, Book, Extraction};
use services::llm::{DEFAULT_PROMPT, LlmClient};

/// In-memory session fields: API key, current prompt, last uploaded book.
/// Lives as long as the process, nothing is persisted.
#[derive(Debug)]
struct Session {
    api_key: String,
    prompt: String,
    book: Option<Book>,
}

impl Default for Session {
    fn default() -> Self {
        Session {
            api_key: String::new(),
            prompt: DEFAULT_PROMPT.to_string(),
            book: None,
        }
    }
}

#[derive(Clone)]
struct AppState {
    llm_client: Arc<LlmClient>,
    session: Arc<RwLock<Session>>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let llm_client = Arc::new(LlmClient::new()?);

    let app_state = AppState {
        llm_client,
        session: Arc::new(RwLock::new(Session::default())),
    };

    let app = Router::new()
        .route("/", get(home))
        .route("/upload", post(upload_pdf))
        .route("/api-key", post(save_api_key))
        .route("/extract", post(extract))
        .route("/prompt", get(prompt_page).post(save_prompt))
        .route("/health", get(health_check))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::AllowMethods::any())
                .allow_headers(tower_http::cors::AllowHeaders::any()),
        );

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

#[derive(Deserialize)]
struct HomeQuery {
    chapter: Option<String>,
    err: Option<String>,
}

async fn home(State(state): State<AppState>, Query(query): Query<HomeQuery>) -> Html<String> {
    let session = state.session.read().await;
    render_home(&session, query.chapter.as_deref(), None, query.err.as_deref())
}

async fn upload_pdf(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Redirect, StatusCode> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        if field.name() != Some("pdf_file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload.pdf").to_string();
        let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
        let raw = data.to_vec();

        // A parse failure still counts as an upload: the book is kept with
        // empty text and the user gets a generic notice.
        let (full_text, load_failed) = match services::document::load_text(&raw) {
            Ok(text) => (text, false),
            Err(e) => {
                tracing::warn!("upload of {file_name} failed to parse: {e}");
                (String::new(), true)
            }
        };
        let chapters = services::chapterizer::split_chapters(&full_text);
        tracing::info!(
            "loaded {file_name}: {} chars, {} chapters",
            full_text.len(),
            chapters.len()
        );

        state.session.write().await.book = Some(Book {
            file_name,
            raw,
            full_text,
            chapters,
        });
        return Ok(Redirect::to(if load_failed { "/?err=pdf" } else { "/" }));
    }

    Err(StatusCode::BAD_REQUEST)
}

#[derive(Deserialize)]
struct ApiKeyForm {
    api_key: String,
}

async fn save_api_key(State(state): State<AppState>, Form(form): Form<ApiKeyForm>) -> Redirect {
    state.session.write().await.api_key = form.api_key.trim().to_string();
    Redirect::to("/")
}

#[derive(Deserialize)]
struct ExtractForm {
    chapter: String,
}

async fn extract(State(state): State<AppState>, Form(form): Form<ExtractForm>) -> Html<String> {
    let (text, api_key, prompt) = {
        let session = state.session.read().await;
        let Some(book) = session.book.as_ref() else {
            return render_home(&session, None, None, Some("no_book"));
        };
        let Some(text) = book.text_for(&form.chapter) else {
            return render_home(&session, None, None, Some("no_chapter"));
        };
        (text.to_string(), session.api_key.clone(), session.prompt.clone())
    };

    // The remote call runs without the session lock held. It has no timeout,
    // so this request blocks for as long as the model takes.
    let extraction = match state
        .llm_client
        .extract_lessons(&text, &api_key, &prompt)
        .await
    {
        Ok(Some(md)) => Extraction::Lessons(md),
        Ok(None) => Extraction::NoResult,
        Err(e) => {
            tracing::warn!("extraction failed: {e}");
            Extraction::Failed(e.to_string())
        }
    };

    let session = state.session.read().await;
    render_home(&session, Some(&form.chapter), Some(&extraction), None)
}

#[derive(Deserialize)]
struct PromptQuery {
    saved: Option<u8>,
}

async fn prompt_page(
    State(state): State<AppState>,
    Query(query): Query<PromptQuery>,
) -> Html<String> {
    let session = state.session.read().await;
    render_prompt(&session, query.saved.is_some())
}

#[derive(Deserialize)]
struct PromptForm {
    prompt: String,
}

async fn save_prompt(State(state): State<AppState>, Form(form): Form<PromptForm>) -> Redirect {
    state.session.write().await.prompt = form.prompt;
    Redirect::to("/prompt?saved=1")
}

const PAGE_STYLE: &str = "\
    body { font-family: Arial, sans-serif; margin: 40px; } \
    nav { margin-bottom: 20px; } \
    .panel { background-color: #f0f8ff; padding: 20px; border-radius: 8px; margin: 20px 0; } \
    .panel form { margin: 10px 0; } \
    .preview { background-color: #f5f5f5; padding: 15px; border-radius: 4px; white-space: pre-wrap; margin-top: 20px; } \
    .warning { background-color: #fff8dc; padding: 15px; border-radius: 4px; margin: 20px 0; } \
    .error { background-color: #ffe4e1; padding: 10px; border-radius: 4px; margin: 10px 0; } \
    .success { background-color: #e0ffe0; padding: 10px; border-radius: 4px; margin: 10px 0; } \
    textarea { width: 100%; font-family: monospace; }";

fn page(title: &str, body: String) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<title>{title}</title>\n\
         <meta charset=\"utf-8\">\n<style>{PAGE_STYLE}</style>\n</head>\n<body>\n\
         <h1>Book Lesson Extractor</h1>\n\
         <nav><a href=\"/\">Home</a> | <a href=\"/prompt\">Prompt</a></nav>\n\
         {body}\n</body>\n</html>"
    ))
}

fn render_home(
    session: &Session,
    selected: Option<&str>,
    extraction: Option<&Extraction>,
    notice: Option<&str>,
) -> Html<String> {
    let mut body = String::new();

    if let Some(code) = notice {
        let message = match code {
            "pdf" => "Could not read the PDF file. No text was extracted.",
            "no_book" => "Please upload a PDF file first.",
            "no_chapter" => "That chapter is not in the current book.",
            _ => "Something went wrong.",
        };
        body.push_str(&format!("<div class=\"error\">{message}</div>"));
    }

    body.push_str(
        "<div class=\"panel\">\
         <form method=\"post\" action=\"/upload\" enctype=\"multipart/form-data\">\
         <label>Upload a PDF file</label> \
         <input type=\"file\" name=\"pdf_file\" accept=\".pdf\"> \
         <button type=\"submit\">Upload</button></form>",
    );
    body.push_str(&format!(
        "<form method=\"post\" action=\"/api-key\">\
         <label>Google Gemini API key</label> \
         <input type=\"password\" name=\"api_key\" value=\"{}\"> \
         <button type=\"submit\">Save key</button></form></div>",
        html_escape::encode_double_quoted_attribute(&session.api_key)
    ));

    match &session.book {
        None => body.push_str("<p>Please upload a PDF file to get started.</p>"),
        Some(book) => {
            body.push_str(&format!(
                "<p>Loaded <b>{}</b> ({} bytes): {} chapters found.</p>",
                html_escape::encode_text(&book.file_name),
                book.raw.len(),
                book.chapters.len()
            ));

            let selection = selected.unwrap_or(ALL_CHAPTERS);
            let mut options = String::new();
            for label in
                std::iter::once(ALL_CHAPTERS).chain(book.chapters.iter().map(|c| c.label.as_str()))
            {
                let flag = if label == selection { " selected" } else { "" };
                options.push_str(&format!(
                    "<option value=\"{0}\"{flag}>{0}</option>",
                    html_escape::encode_double_quoted_attribute(label)
                ));
            }
            body.push_str(&format!(
                "<form method=\"get\" action=\"/\">\
                 <label>Select chapter</label> \
                 <select name=\"chapter\" onchange=\"this.form.submit()\">{options}</select> \
                 <noscript><button type=\"submit\">Show</button></noscript></form>"
            ));
            body.push_str(&format!(
                "<form method=\"post\" action=\"/extract\">\
                 <input type=\"hidden\" name=\"chapter\" value=\"{}\">\
                 <button type=\"submit\">Extract Lessons</button></form>",
                html_escape::encode_double_quoted_attribute(selection)
            ));

            match extraction {
                Some(Extraction::Lessons(md)) => {
                    body.push_str("<div class=\"success\">Key lessons extracted!</div>");
                    // The markdown source travels escaped; textContent undoes
                    // the escaping before marked renders it.
                    body.push_str(&format!(
                        "<div id=\"lessons-src\" hidden>{}</div>\
                         <div id=\"lessons\"></div>\
                         <script src=\"https://cdn.jsdelivr.net/npm/marked/marked.min.js\"></script>\
                         <script>document.getElementById('lessons').innerHTML = \
                         marked.parse(document.getElementById('lessons-src').textContent);</script>",
                        html_escape::encode_text(md)
                    ));
                }
                Some(Extraction::NoResult) => {
                    body.push_str("<div class=\"error\">Could not extract the lessons.</div>");
                }
                Some(Extraction::Failed(e)) => {
                    body.push_str(&format!(
                        "<div class=\"error\">Error in model call: {}</div>",
                        html_escape::encode_text(e)
                    ));
                }
                None => {
                    if let Some(text) = book.text_for(selection) {
                        body.push_str(&format!(
                            "<div class=\"preview\">{}</div>",
                            html_escape::encode_text(text)
                        ));
                    }
                }
            }
        }
    }

    page("Book Lesson Extractor", body)
}

fn render_prompt(session: &Session, saved: bool) -> Html<String> {
    let mut body = String::new();

    if saved {
        body.push_str("<div class=\"success\">Prompt saved!</div>");
    }
    body.push_str(
        "<div class=\"warning\"><b>Warning:</b> the prompt must keep the \
         <code>{book_text}</code> placeholder and instruct the model to wrap its \
         answer in <code>&lt;markdown&gt;&lt;/markdown&gt;</code> tags, or extraction \
         will come back empty. Press Save to apply changes.</div>",
    );
    body.push_str(&format!(
        "<form method=\"post\" action=\"/prompt\">\
         <textarea name=\"prompt\" rows=\"24\" cols=\"100\">{}</textarea><br>\
         <button type=\"submit\">Save</button></form>",
        html_escape::encode_text(&session.prompt)
    ));

    page("Edit Prompt", body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::Chapter;

    fn test_state() -> AppState {
        AppState {
            llm_client: Arc::new(
                LlmClient::with_api_url("http://127.0.0.1:0/generate".into()).unwrap(),
            ),
            session: Arc::new(RwLock::new(Session::default())),
        }
    }

    #[tokio::test]
    async fn fresh_session_starts_with_default_prompt() {
        let session = Session::default();
        assert_eq!(session.prompt, DEFAULT_PROMPT);
        assert!(session.api_key.is_empty());
        assert!(session.book.is_none());
    }

    #[tokio::test]
    async fn navigation_keeps_api_key_and_prompt() {
        let state = test_state();
        save_api_key(
            State(state.clone()),
            Form(ApiKeyForm {
                api_key: "  secret-key ".into(),
            }),
        )
        .await;
        save_prompt(
            State(state.clone()),
            Form(PromptForm {
                prompt: "my prompt {book_text}".into(),
            }),
        )
        .await;

        let home_page = home(
            State(state.clone()),
            Query(HomeQuery {
                chapter: None,
                err: None,
            }),
        )
        .await;
        assert!(home_page.0.contains("secret-key"));

        let prompt_html = prompt_page(State(state.clone()), Query(PromptQuery { saved: None })).await;
        assert!(prompt_html.0.contains("my prompt {book_text}"));

        let session = state.session.read().await;
        assert_eq!(session.api_key, "secret-key");
        assert_eq!(session.prompt, "my prompt {book_text}");
    }

    #[tokio::test]
    async fn home_without_book_shows_upload_hint() {
        let state = test_state();
        let html = home(
            State(state),
            Query(HomeQuery {
                chapter: None,
                err: None,
            }),
        )
        .await;
        assert!(html.0.contains("Please upload a PDF file"));
    }

    #[tokio::test]
    async fn extract_without_book_reports_instead_of_calling_out() {
        let state = test_state();
        let html = extract(
            State(state),
            Form(ExtractForm {
                chapter: ALL_CHAPTERS.into(),
            }),
        )
        .await;
        assert!(html.0.contains("Please upload a PDF file first."));
    }

    #[tokio::test]
    async fn selected_chapter_preview_is_escaped_text() {
        let state = test_state();
        {
            let mut session = state.session.write().await;
            session.book = Some(Book {
                file_name: "book.pdf".into(),
                raw: vec![1, 2, 3],
                full_text: "intro CHAPTER 1 a < b".into(),
                chapters: vec![Chapter {
                    label: "CHAPTER 1".into(),
                    text: "CHAPTER 1 a < b".into(),
                }],
            });
        }
        let html = home(
            State(state),
            Query(HomeQuery {
                chapter: Some("CHAPTER 1".into()),
                err: None,
            }),
        )
        .await;
        assert!(html.0.contains("CHAPTER 1 a &lt; b"));
    }

    #[tokio::test]
    async fn unknown_chapter_selection_is_reported() {
        let state = test_state();
        state.session.write().await.book = Some(Book {
            file_name: "book.pdf".into(),
            raw: Vec::new(),
            full_text: "no markers here".into(),
            chapters: Vec::new(),
        });
        let html = extract(
            State(state),
            Form(ExtractForm {
                chapter: "CHAPTER 7".into(),
            }),
        )
        .await;
        assert!(html.0.contains("That chapter is not in the current book."));
    }
}
