//! HTTP surface.
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/api/verse?reference=` | GET | Verses a reference names |
//! | `/api/chapter/:book/:chapter?highlight=1,2` | GET | Chapter view with highlights and neighbours |
//! | `/api/search?q=` | GET | Case-insensitive text search |
//! | `/api/related?reference=` | GET | Verses sharing keywords with a reference |
//! | `/api/books` | GET | Books in dataset order with their chapters |
//! | `/api/gpt/:kind` | POST | Commentary: `analyze`, `historical-context`, `theological-insights`, `question` |

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::commentary::{self, CommentaryKind, CommentaryRequest, Commentator, INVALID_VERSES, Reply};
use crate::error::Error;
use crate::navigation::{self, DisplayChapter, Selection};
use crate::service::SharedBible;

/// Shared state for every route.
#[derive(Clone)]
pub struct AppState {
    /// Lazily loaded Bible service.
    pub bible: Arc<SharedBible>,
    /// Commentary backend with per-session ordering.
    pub commentator: Arc<Commentator>,
}

/// Build the router with CORS and request tracing.
pub fn router(state: AppState) -> Router {
    return Router::new()
        .route("/api/verse", get(verse))
        .route("/api/chapter/:book/:chapter", get(chapter))
        .route("/api/search", get(search))
        .route("/api/related", get(related))
        .route("/api/books", get(books))
        .route("/api/gpt/:kind", post(commentary))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);
}

/// Listen on all interfaces until the process is stopped.
///
/// # Errors
///
/// Returns `Error::Io` if the port can't be bound or the server fails.
pub async fn serve(state: AppState, port: u16) -> Result<(), Error> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "listening");
    axum::serve(listener, router(state)).await?;
    return Ok(());
}

// ── Errors ────────────────────────────────────────────────────────────

/// An error rendered as a JSON response.
#[derive(Debug)]
pub struct ApiError(
    /// The underlying error.
    Error,
);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        return Self(error);
    }
}

/// JSON error body.
#[derive(Serialize)]
struct ErrorBody {
    /// Short message.
    error: String,
    /// Longer description, for server-side failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    /// Book names resembling an unknown one.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    suggestions: Vec<String>,
}

/// HTTP status for an error.
const fn status_for(error: &Error) -> StatusCode {
    return match error {
        Error::InvalidAlias { .. } | Error::InvalidReferenceFormat { .. } | Error::InvalidRequest { .. } => {
            StatusCode::BAD_REQUEST
        },
        Error::AliasNotFound { .. }
        | Error::BookNotFound { .. }
        | Error::ChapterNotFound { .. }
        | Error::VerseNotFound { .. } => StatusCode::NOT_FOUND,
        Error::Superseded { .. } => StatusCode::CONFLICT,
        Error::Backend { .. } => StatusCode::BAD_GATEWAY,
        Error::DatasetLoad { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let body = match self.0 {
            Error::InvalidRequest { reason } => ErrorBody { error: reason, details: None, suggestions: Vec::new() },
            Error::BookNotFound { book, suggestions } => ErrorBody {
                error: format!("book not found: `{book}`"),
                details: None,
                suggestions,
            },
            other if status.is_server_error() => {
                tracing::warn!(status = status.as_u16(), error = %other, "request failed");
                let error = status.canonical_reason().unwrap_or("Internal Server Error").to_string();
                ErrorBody { error, details: Some(other.to_string()), suggestions: Vec::new() }
            },
            other => ErrorBody { error: other.to_string(), details: None, suggestions: Vec::new() },
        };
        return (status, Json(body)).into_response();
    }
}

// ── Query routes ──────────────────────────────────────────────────────

/// `?reference=`
#[derive(Deserialize)]
struct ReferenceParams {
    /// Reference in any accepted spelling.
    reference: String,
}

/// `?q=`
#[derive(Deserialize)]
struct SearchParams {
    /// Search text.
    #[serde(default)]
    q: String,
}

/// `?highlight=1,2`
#[derive(Deserialize)]
struct ChapterParams {
    /// Comma-separated verse numbers.
    #[serde(default)]
    highlight: Option<String>,
}

/// `GET /api/verse`
///
/// # Errors
///
/// Returns parse and lookup errors as 400/404.
async fn verse(State(state): State<AppState>, Query(params): Query<ReferenceParams>) -> Result<Json<Value>, ApiError> {
    let service = state.bible.get()?;
    let verses = service.get_verse(&params.reference)?;
    return Ok(Json(serde_json::json!({ "reference": params.reference, "verses": verses })));
}

/// `GET /api/chapter/:book/:chapter`
///
/// # Errors
///
/// Returns lookup errors as 404 and a malformed highlight list as 400.
async fn chapter(
    State(state): State<AppState>,
    Path((book, chapter)): Path<(String, u32)>,
    Query(params): Query<ChapterParams>,
) -> Result<Json<Value>, ApiError> {
    let highlight_verses = parse_highlight(params.highlight.as_deref())?;
    let service = state.bible.get()?;
    let request = DisplayChapter { book, chapter, highlight_verses };
    let view = navigation::chapter_view(&service, &request, &Selection::default())?;
    return Ok(Json(serde_json::to_value(view).map_err(Error::from)?));
}

/// `GET /api/search`
///
/// # Errors
///
/// Returns dataset load failures as 503.
async fn search(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<Value>, ApiError> {
    let service = state.bible.get()?;
    let verses = service.search_verses(&params.q);
    return Ok(Json(serde_json::json!({ "query": params.q, "verses": verses })));
}

/// `GET /api/related`
///
/// # Errors
///
/// Returns parse and lookup errors for the source reference.
async fn related(State(state): State<AppState>, Query(params): Query<ReferenceParams>) -> Result<Json<Value>, ApiError> {
    let service = state.bible.get()?;
    let related = service.find_related_verses(&params.reference)?;
    return Ok(Json(serde_json::json!({ "reference": params.reference, "related": related })));
}

/// `GET /api/books`
///
/// # Errors
///
/// Returns dataset load failures as 503.
async fn books(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let service = state.bible.get()?;
    let books: Vec<Value> = service
        .index()
        .books()
        .iter()
        .map(|b| return serde_json::json!({ "name": b.name, "chapters": b.chapters }))
        .collect();
    return Ok(Json(serde_json::json!({ "books": books, "translation": service.translation() })));
}

/// Split `1,2, 5` into verse numbers.
///
/// # Errors
///
/// Returns `Error::InvalidRequest` for anything that isn't a positive number.
fn parse_highlight(raw: Option<&str>) -> Result<Vec<u32>, Error> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    return raw
        .split(',')
        .map(str::trim)
        .filter(|part| return !part.is_empty())
        .map(|part| {
            return part.parse::<u32>().ok().filter(|n| return *n > 0).ok_or_else(|| {
                return Error::InvalidRequest { reason: format!("invalid highlight verse `{part}`") };
            });
        })
        .collect();
}

// ── Commentary route ──────────────────────────────────────────────────

/// Body of a commentary request.
#[derive(Deserialize)]
struct CommentaryBody {
    /// Question or reader's note.
    #[serde(default)]
    prompt: Option<String>,
    /// Client-chosen sequence number within the session.
    #[serde(default)]
    sequence: Option<u64>,
    /// Client-chosen session identifier.
    #[serde(default)]
    session: Option<String>,
    /// References; kept loose so a wrong shape gets the documented 400.
    #[serde(default)]
    verses: Option<Value>,
}

/// `POST /api/gpt/:kind`
///
/// # Errors
///
/// Returns 400 for a bad body, 404 for unknown verses, 409 when superseded,
/// and 502 when the backend fails.
async fn commentary(
    State(state): State<AppState>,
    Path(kind): Path<CommentaryKind>,
    Json(body): Json<CommentaryBody>,
) -> Result<Json<Reply>, ApiError> {
    let verses = verse_list(body.verses.as_ref())?;
    let prompt = {
        let service = state.bible.get()?;
        commentary::build_prompt(&service, &CommentaryRequest { kind, note: body.prompt, verses })?
    };
    tracing::debug!(kind = kind.slug(), session = ?body.session, sequence = ?body.sequence, "commentary request");
    let reply = state.commentator.respond(&prompt, body.session.as_deref(), body.sequence).await?;
    return Ok(Json(reply));
}

/// The `verses` field as a list of references. Absent means none.
///
/// # Errors
///
/// Returns `Error::InvalidRequest` unless the field is an array of strings.
fn verse_list(value: Option<&Value>) -> Result<Vec<String>, Error> {
    let invalid = || return Error::InvalidRequest { reason: INVALID_VERSES.to_string() };
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let items = value.as_array().ok_or_else(invalid)?;
    return items.iter().map(|item| return item.as_str().map(String::from).ok_or_else(invalid)).collect();
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "test code")]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tokio::sync::Notify;
    use tower::ServiceExt;

    use super::*;
    use crate::books::BookNormalizer;
    use crate::commentary::CompletionClient;
    use crate::commentary::tests::StubClient;
    use crate::related::RelatedSettings;
    use crate::service::tests::service;

    fn app_with(client: Arc<dyn CompletionClient>) -> Router {
        return router(AppState {
            bible: Arc::new(SharedBible::ready(service())),
            commentator: Arc::new(Commentator::new(client)),
        });
    }

    fn app() -> Router {
        return app_with(StubClient::new("Line one\nline two\n\nSecond paragraph"));
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        return (status, json);
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        return send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await;
    }

    async fn post_json(app: Router, uri: &'static str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        return send(app, request).await;
    }

    #[tokio::test]
    async fn verse_lookup() {
        let (status, json) = get_json(app(), "/api/verse?reference=1%20John%201:1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["verses"][0]["reference"], "1 John 1:1");
        assert_eq!(json["verses"][0]["highlighted"], true);
        assert_eq!(json["verses"][0]["verse"]["book_name"], "I John");
    }

    #[tokio::test]
    async fn lookup_errors_map_to_statuses() {
        let (status, json) = get_json(app(), "/api/verse?reference=Genisis%201:1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["suggestions"][0], "Genesis");

        let (status, _) = get_json(app(), "/api/verse?reference=3:16").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get_json(app(), "/api/verse?reference=John%203:99").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn chapter_view_with_highlights() {
        let (status, json) = get_json(app(), "/api/chapter/Matt/5?highlight=3,5").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["location"]["book"], "Matthew");
        let flags: Vec<bool> = json["verses"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["highlighted"].as_bool().unwrap())
            .collect();
        assert_eq!(flags, vec![true, false, true, false]);
        assert_eq!(json["next"]["book"], "John");

        let (status, _) = get_json(app(), "/api/chapter/Matthew/5?highlight=x").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn search_related_and_books() {
        let (_, json) = get_json(app(), "/api/search?q=LOVE").await;
        assert_eq!(json["verses"].as_array().unwrap().len(), 3);

        let (_, json) = get_json(app(), "/api/search?q=").await;
        assert!(json["verses"].as_array().unwrap().is_empty());

        let (status, json) = get_json(app(), "/api/related?reference=Genesis%201:1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["related"][0]["reference"], "Genesis 2:1");

        let (_, json) = get_json(app(), "/api/books").await;
        assert_eq!(json["books"][0]["name"], "Genesis");
        assert_eq!(json["books"][0]["chapters"], serde_json::json!([1, 2]));
        assert_eq!(json["translation"], "ASV");
    }

    #[tokio::test]
    async fn commentary_returns_html() {
        let body = serde_json::json!({ "verses": ["John 3:16"] });
        let (status, json) = post_json(app(), "/api/gpt/historical-context", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["html"], "<p>Line one<br>line two</p><p>Second paragraph</p>");
        assert!(json.get("sequence").is_none());
    }

    #[tokio::test]
    async fn commentary_validates_verses() {
        for body in [serde_json::json!({}), serde_json::json!({ "verses": "John 3:16" }), serde_json::json!({ "verses": [] })] {
            let (status, json) = post_json(app(), "/api/gpt/analyze", body.clone()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
            assert_eq!(json["error"], "Invalid verses format");
        }

        let (status, _) = post_json(app(), "/api/gpt/question", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = post_json(app(), "/api/gpt/question", serde_json::json!({ "prompt": "Why?" })).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn dataset_failure_is_503_every_time() {
        let shared = SharedBible::from_path(PathBuf::from("no/such/file.json"), BookNormalizer::new(), RelatedSettings::default());
        let app = router(AppState {
            bible: Arc::new(shared),
            commentator: Arc::new(Commentator::new(StubClient::new("x"))),
        });
        for _ in 0..2 {
            let (status, json) = get_json(app.clone(), "/api/books").await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            assert!(json["details"].as_str().unwrap().contains("file not found"));
        }
    }

    /// Backend that holds any prompt containing "hold" until the test ends.
    struct HoldingClient {
        /// Signalled when a held request has started.
        started: Notify,
    }

    #[async_trait]
    impl CompletionClient for HoldingClient {
        async fn complete(&self, prompt: &str) -> Result<String, Error> {
            if prompt.contains("hold") {
                self.started.notify_one();
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            return Ok("done".to_string());
        }
    }

    #[tokio::test]
    async fn newer_commentary_request_supersedes_older() {
        let client = Arc::new(HoldingClient { started: Notify::new() });
        let app = app_with(Arc::clone(&client) as Arc<dyn CompletionClient>);

        let older = serde_json::json!({ "verses": ["John 3:16"], "prompt": "hold", "session": "reader", "sequence": 1 });
        let first = tokio::spawn(post_json(app.clone(), "/api/gpt/analyze", older.clone()));
        client.started.notified().await;

        let newer = serde_json::json!({ "verses": ["John 3:16"], "session": "reader", "sequence": 2 });
        let (status, json) = post_json(app.clone(), "/api/gpt/analyze", newer).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["sequence"], 2);

        let (status, _) = tokio::time::timeout(Duration::from_secs(5), first).await.unwrap().unwrap();
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = post_json(app, "/api/gpt/analyze", older).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
