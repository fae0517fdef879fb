//! Commentary proxy: prompt building, the completion backend, and HTML
//! formatting of replies.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::CommentarySettings;
use crate::error::Error;
use crate::sequencer::RequestSequencer;
use crate::service::BibleService;

/// Error reason for passage requests without usable verses.
pub const INVALID_VERSES: &str = "Invalid verses format";

/// Longest backend error body kept in an error message.
const MAX_ERROR_BODY: usize = 300;

/// What the reader asks the backend for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CommentaryKind {
    /// Meaning and themes of a passage.
    Analyze,
    /// Author, audience, and setting of a passage.
    HistoricalContext,
    /// A free-form question, optionally about a passage.
    Question,
    /// Doctrinal reading of a passage.
    TheologicalInsights,
}

impl CommentaryKind {
    /// URL path segment and CLI spelling.
    pub const fn slug(self) -> &'static str {
        return match self {
            Self::Analyze => "analyze",
            Self::HistoricalContext => "historical-context",
            Self::Question => "question",
            Self::TheologicalInsights => "theological-insights",
        };
    }

    /// Opening instruction of the prompt.
    const fn instruction(self) -> &'static str {
        return match self {
            Self::Analyze => {
                "Provide a clear analysis of the following Bible passage. Explain its meaning, \
                 its key themes, and how it fits its immediate context."
            },
            Self::HistoricalContext => {
                "Describe the historical and cultural context of the following Bible passage: \
                 who wrote it, to whom, when, and the circumstances that shape its meaning."
            },
            Self::Question => "Answer the reader's question about the Bible clearly and cite the passages you rely on.",
            Self::TheologicalInsights => {
                "Offer theological insights on the following Bible passage. Note the doctrines it \
                 bears on and how Christian traditions have read it."
            },
        };
    }

    /// Whether the kind is meaningless without verses.
    const fn needs_passage(self) -> bool {
        return !matches!(self, Self::Question);
    }
}

/// One commentary request before it reaches the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentaryRequest {
    /// Kind of commentary.
    pub kind: CommentaryKind,
    /// The question (for `Question`) or a reader's note (for the other kinds).
    pub note: Option<String>,
    /// References of the passage, in any accepted spelling.
    pub verses: Vec<String>,
}

/// Build the backend prompt, resolving every reference to its text.
///
/// # Errors
///
/// Returns `Error::InvalidRequest` when a passage kind has no verses or a
/// question has no text, and lookup errors for references that don't resolve.
pub fn build_prompt(service: &BibleService, request: &CommentaryRequest) -> Result<String, Error> {
    let verses: Vec<&str> = request.verses.iter().map(|v| return v.trim()).filter(|v| return !v.is_empty()).collect();
    if request.kind.needs_passage() && verses.is_empty() {
        return Err(Error::InvalidRequest { reason: INVALID_VERSES.to_string() });
    }
    let note = request.note.as_deref().map(str::trim).filter(|n| return !n.is_empty());
    if request.kind == CommentaryKind::Question && note.is_none() {
        return Err(Error::InvalidRequest { reason: "a question needs a prompt".to_string() });
    }

    let mut prompt = request.kind.instruction().to_string();
    if !verses.is_empty() {
        prompt.push_str("\n\nPassage:\n");
        for reference in verses {
            for found in service.get_verse(reference)? {
                let _ = writeln!(prompt, "{}: {}", found.reference, found.verse.text);
            }
        }
    }
    if let Some(note) = note {
        let label = if request.kind == CommentaryKind::Question { "Reader's question" } else { "Reader's note" };
        let _ = write!(prompt, "\n{label}: {note}\n");
    }
    return Ok(prompt);
}

/// Format a plain-text reply as an HTML fragment: blank lines separate
/// paragraphs, single newlines become `<br>`, and all text is escaped.
pub fn format_html(reply: &str) -> String {
    let normalized = reply.replace("\r\n", "\n");
    let mut html = String::new();
    let mut paragraph: Vec<&str> = Vec::new();

    for line in normalized.split('\n').chain(std::iter::once("")) {
        if !line.trim().is_empty() {
            paragraph.push(line);
            continue;
        }
        if paragraph.is_empty() {
            continue;
        }
        let escaped: Vec<String> = paragraph
            .iter()
            .map(|l| return html_escape::encode_text(l.trim_end()).into_owned())
            .collect();
        html.push_str("<p>");
        html.push_str(&escaped.join("<br>"));
        html.push_str("</p>");
        paragraph.clear();
    }
    return html;
}

/// Text-in, text-out completion backend.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send one prompt and return the reply text.
    ///
    /// # Errors
    ///
    /// Returns `Error::Backend` if the backend can't be reached or answers
    /// with a failure.
    async fn complete(&self, prompt: &str) -> Result<String, Error>;
}

/// OpenAI-compatible chat-completion client.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    /// Bearer token.
    api_key: String,
    /// Chat-completion URL.
    endpoint: String,
    /// Shared connection pool, with the configured timeout.
    http: reqwest::Client,
    /// Model name.
    model: String,
}

impl OpenAiClient {
    /// Client for the configured backend. The key is read from the environment now.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingApiKey` if the key variable is unset, or
    /// `Error::Backend` if the HTTP client can't be built.
    pub fn new(settings: &CommentarySettings) -> Result<Self, Error> {
        let api_key = settings.api_key()?;
        let http = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| return Error::Backend { reason: e.to_string(), status: None })?;
        return Ok(Self {
            api_key,
            endpoint: settings.endpoint.clone(),
            http,
            model: settings.model.clone(),
        });
    }

    /// JSON body for one prompt.
    pub fn request_body(&self, prompt: &str) -> Value {
        return json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<String, Error> {
        tracing::info!(endpoint = %self.endpoint, model = %self.model, chars = prompt.len(), "completion request");
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| {
                return Error::Backend {
                    reason: e.to_string(),
                    status: e.status().map(|s| return s.as_u16()),
                };
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason: String = body.chars().take(MAX_ERROR_BODY).collect();
            tracing::warn!(status = status.as_u16(), "completion backend returned an error");
            return Err(Error::Backend { reason, status: Some(status.as_u16()) });
        }

        let payload: Value = response.json().await.map_err(|e| {
            return Error::Backend { reason: format!("unreadable response: {e}"), status: Some(status.as_u16()) };
        })?;
        return extract_completion(&payload);
    }
}

/// Stand-in backend when no API key is configured; every request fails
/// with `Error::MissingApiKey` so the rest of the server keeps working.
#[derive(Debug, Clone)]
pub struct Unconfigured {
    /// Environment variable the key was expected in.
    var: String,
}

#[async_trait]
impl CompletionClient for Unconfigured {
    async fn complete(&self, _prompt: &str) -> Result<String, Error> {
        return Err(Error::MissingApiKey { var: self.var.clone() });
    }
}

/// Backend for the configured settings, or `Unconfigured` when the key is
/// missing.
///
/// # Errors
///
/// Returns `Error::Backend` if the HTTP client can't be built.
pub fn client_for(settings: &CommentarySettings) -> Result<Arc<dyn CompletionClient>, Error> {
    return match OpenAiClient::new(settings) {
        Ok(client) => Ok(Arc::new(client)),
        Err(Error::MissingApiKey { var }) => {
            tracing::warn!(var = %var, "no commentary API key; commentary endpoints will fail");
            Ok(Arc::new(Unconfigured { var }))
        },
        Err(e) => Err(e),
    };
}

/// Reply text from a chat-completion response.
///
/// # Errors
///
/// Returns `Error::Backend` if `choices[0].message.content` is missing.
pub fn extract_completion(payload: &Value) -> Result<String, Error> {
    return payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| {
            return Error::Backend { reason: "invalid API response structure".to_string(), status: None };
        });
}

/// Formatted reply for one commentary request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    /// HTML fragment.
    pub html: String,
    /// Sequence number the request ran under, when it belonged to a session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
}

/// Sends prompts to the backend, ordering requests per session.
pub struct Commentator {
    /// Completion backend.
    client: Arc<dyn CompletionClient>,
    /// Per-session ordering.
    sequencer: RequestSequencer,
}

impl Commentator {
    /// Commentator over a backend.
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        return Self { client, sequencer: RequestSequencer::default() };
    }

    /// Send a prompt and format the reply. With a session, a newer request
    /// on the same session supersedes this one; `sequence` is then taken as
    /// given or assigned. Without a session, `sequence` is ignored.
    ///
    /// # Errors
    ///
    /// Returns `Error::Superseded` if a newer request on the session won, or
    /// `Error::Backend` if the backend failed.
    pub async fn respond(&self, prompt: &str, session: Option<&str>, sequence: Option<u64>) -> Result<Reply, Error> {
        let Some(session) = session else {
            let text = self.client.complete(prompt).await?;
            return Ok(Reply { html: format_html(&text), sequence: None });
        };

        let ticket = self.sequencer.begin(session, sequence)?;
        let assigned = ticket.sequence();
        let text = ticket.run(self.client.complete(prompt)).await?;
        return Ok(Reply { html: format_html(&text), sequence: Some(assigned) });
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "test code")]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::service::tests::service;

    /// Backend that answers with a fixed reply and records prompts.
    pub(crate) struct StubClient {
        /// Prompts received, in order.
        pub(crate) prompts: Mutex<Vec<String>>,
        /// Reply text.
        pub(crate) reply: String,
    }

    impl StubClient {
        pub(crate) fn new(reply: &str) -> Arc<Self> {
            return Arc::new(Self { prompts: Mutex::new(Vec::new()), reply: reply.to_string() });
        }
    }

    #[async_trait]
    impl CompletionClient for StubClient {
        async fn complete(&self, prompt: &str) -> Result<String, Error> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            return Ok(self.reply.clone());
        }
    }

    fn request(kind: CommentaryKind, verses: &[&str], note: Option<&str>) -> CommentaryRequest {
        return CommentaryRequest {
            kind,
            note: note.map(String::from),
            verses: verses.iter().map(|v| (*v).to_string()).collect(),
        };
    }

    #[test]
    fn prompt_lists_resolved_verses_and_note() {
        let svc = service();
        let prompt = build_prompt(&svc, &request(CommentaryKind::Analyze, &["Matt 5:3-4"], Some("focus on comfort")))
            .unwrap();
        assert!(prompt.starts_with("Provide a clear analysis"));
        assert!(prompt.contains("Matthew 5:3: Blessed are the poor in spirit"));
        assert!(prompt.contains("Matthew 5:4: Blessed are they that mourn"));
        assert!(prompt.ends_with("Reader's note: focus on comfort\n"));
    }

    #[test]
    fn passage_kinds_need_verses() {
        let svc = service();
        for kind in [CommentaryKind::Analyze, CommentaryKind::HistoricalContext, CommentaryKind::TheologicalInsights] {
            match build_prompt(&svc, &request(kind, &[" "], None)) {
                Err(Error::InvalidRequest { reason }) => assert_eq!(reason, INVALID_VERSES),
                other => panic!("expected InvalidRequest for {kind:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn question_needs_text_but_not_verses() {
        let svc = service();
        assert!(matches!(
            build_prompt(&svc, &request(CommentaryKind::Question, &[], None)),
            Err(Error::InvalidRequest { .. })
        ));
        let prompt = build_prompt(&svc, &request(CommentaryKind::Question, &[], Some("Who wrote Romans?"))).unwrap();
        assert!(!prompt.contains("Passage:"));
        assert!(prompt.contains("Reader's question: Who wrote Romans?"));
    }

    #[test]
    fn unresolvable_verse_fails_the_prompt() {
        let svc = service();
        let err = build_prompt(&svc, &request(CommentaryKind::Analyze, &["Genesis 9:9"], None)).unwrap_err();
        assert!(matches!(err, Error::ChapterNotFound { .. }));
    }

    #[test]
    fn html_paragraphs_breaks_and_escaping() {
        let reply = "First line\r\nsecond <line>\r\n\r\n\r\nNext & last\n\n  \n";
        assert_eq!(format_html(reply), "<p>First line<br>second &lt;line&gt;</p><p>Next &amp; last</p>");
        assert_eq!(format_html(""), "");
        assert_eq!(format_html("\n\n"), "");
    }

    #[test]
    fn extract_reads_first_choice() {
        let payload = json!({"choices": [{"message": {"role": "assistant", "content": "Grace."}}]});
        assert_eq!(extract_completion(&payload).unwrap(), "Grace.");
        assert!(matches!(extract_completion(&json!({"choices": []})), Err(Error::Backend { .. })));
    }

    #[test]
    fn request_body_has_model_and_single_user_message() {
        let settings = CommentarySettings { api_key_env: "VERSEREF_TEST_UNSET_KEY".into(), ..Default::default() };
        assert!(matches!(OpenAiClient::new(&settings), Err(Error::MissingApiKey { .. })));

        let client = OpenAiClient {
            api_key: "k".into(),
            endpoint: settings.endpoint.clone(),
            http: reqwest::Client::new(),
            model: "gpt-3.5-turbo".into(),
        };
        let body = client.request_body("hello");
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hello");
    }

    #[test]
    fn kind_slugs_match_serde() {
        for kind in [
            CommentaryKind::Analyze,
            CommentaryKind::HistoricalContext,
            CommentaryKind::Question,
            CommentaryKind::TheologicalInsights,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.slug());
        }
    }

    #[tokio::test]
    async fn respond_formats_and_sequences() {
        let stub = StubClient::new("One.\n\nTwo.");
        let commentator = Commentator::new(Arc::clone(&stub) as Arc<dyn CompletionClient>);

        let plain = commentator.respond("p", None, Some(9)).await.unwrap();
        assert_eq!(plain, Reply { html: "<p>One.</p><p>Two.</p>".into(), sequence: None });

        let first = commentator.respond("p", Some("s"), None).await.unwrap();
        let second = commentator.respond("p", Some("s"), None).await.unwrap();
        assert_eq!((first.sequence, second.sequence), (Some(1), Some(2)));

        let stale = commentator.respond("p", Some("s"), Some(1)).await;
        assert!(matches!(stale, Err(Error::Superseded { .. })));
        assert_eq!(stub.prompts.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn missing_key_falls_back_to_unconfigured() {
        let settings = CommentarySettings { api_key_env: "VERSEREF_TEST_UNSET_KEY".into(), ..Default::default() };
        let client = client_for(&settings).unwrap();
        match client.complete("p").await {
            Err(Error::MissingApiKey { var }) => assert_eq!(var, "VERSEREF_TEST_UNSET_KEY"),
            other => panic!("expected MissingApiKey, got {other:?}"),
        }
    }
}
