//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness, `{"ok": true}` |
//! | `POST` | `/search` | Course search, `{"results": [...], "took_ms"}` |
//! | `POST` | `/recommend` | Whitelisted recommendations, `{"recommendations": [...], "took_ms"}` |
//! | `GET`  | `/__routes` | Plain-text route listing |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Missing or invalid 'query' field" }, "took_ms": 0 }
//! ```
//!
//! | Code | Status | Cause |
//! |------|--------|-------|
//! | `bad_request` | 400 | Body is not a JSON object, or a required field is missing |
//! | `invalid_field` | 422 | A field is well-formed but out of range (`k`) |
//! | `configuration_error` | 500 | Missing database URL, API key or provider |
//! | `upstream_error` | 500 | Store or model provider call failed |
//! | `internal` | 500 | Anything else; the message is generic |
//!
//! Request bodies are read as raw bytes and validated field by field, so a
//! wrong content type or a non-JSON body is a named `bad_request`, never an
//! extractor rejection.
//!
//! A panic below a handler is caught and answered with the `internal` body.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use std::any::Any as PanicPayload;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::error::{AdvisorError, ValidationKind};
use crate::models::{Candidate, RecommendationItem};
use crate::recommend::{CandidateSource, Recommender};
use crate::retrieve::{Retriever, Strategy};
use crate::search::{self, SearchResult};
use crate::services::Services;

pub const DEFAULT_TOP_K: i64 = 5;

const ROUTES: &[(&str, &str, &str)] = &[
    ("GET", "/health", "liveness"),
    ("POST", "/search", "course search (q|query, k)"),
    ("POST", "/recommend", "recommendations (q|query|profession+goal, top_k, courses|results)"),
    ("GET", "/__routes", "this listing"),
];

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    retriever: Retriever,
    recommender: Arc<Recommender>,
}

/// Connect the configured store and providers, then serve until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = Services::from_config(config).await?;
    run_server_with_services(config, services).await
}

/// Serve with pre-built clients.
///
/// Used by tests to run the real router over an in-memory store and
/// scripted providers.
pub async fn run_server_with_services(config: &Config, services: Services) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(config, services);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "listening");
    println!("Course Compass listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(config: &Config, services: Services) -> Router {
    let state = AppState {
        config: Arc::new(config.clone()),
        retriever: services.retriever(config),
        recommender: Arc::new(services.recommender(config)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/search", post(handle_search))
        .route("/recommend", post(handle_recommend))
        .route("/__routes", get(handle_routes))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
    took_ms: u64,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    took_ms: u64,
}

impl AppError {
    fn from_advisor(err: AdvisorError, started: Instant) -> Self {
        let took_ms = elapsed_ms(started);
        let (status, code, message) = match &err {
            AdvisorError::Validation {
                kind: ValidationKind::OutOfRange,
                ..
            } => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_field", err.to_string()),
            AdvisorError::Validation { .. } => {
                (StatusCode::BAD_REQUEST, "bad_request", err.to_string())
            }
            AdvisorError::Configuration(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration_error",
                err.to_string(),
            ),
            AdvisorError::Upstream { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "upstream_error",
                err.to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "Internal server error".to_string(),
            ),
        };
        if status.is_server_error() {
            error!(category = err.category(), error = %err, took_ms, "request failed");
        }
        Self {
            status,
            code,
            message,
            took_ms,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
            took_ms: self.took_ms,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Response for a handler that panicked. Timing is lost with the task.
fn handle_panic(payload: Box<dyn PanicPayload + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("non-string panic payload");
    error!(category = "internal", panic = detail, "handler panicked");

    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: "Internal server error".to_string(),
        took_ms: 0,
    }
    .into_response()
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

// ============ Request validation ============

/// Parse a raw body into a JSON object.
fn parse_object(body: &Bytes) -> Result<Map<String, Value>, AdvisorError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(AdvisorError::malformed(
            "body",
            "Request body must be a JSON object",
        )),
    }
}

/// Trimmed, non-empty string under the first present key of `keys`.
fn text_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| map.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn strategy_field(map: &Map<String, Value>) -> Result<Option<Strategy>, AdvisorError> {
    match map.get("strategy") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => s.parse().map(Some),
        Some(_) => Err(AdvisorError::malformed(
            "strategy",
            "'strategy' must be a string",
        )),
    }
}

#[derive(Debug, PartialEq)]
struct SearchRequest {
    query: String,
    k: i64,
    strategy: Option<Strategy>,
}

impl SearchRequest {
    fn from_json(map: &Map<String, Value>) -> Result<Self, AdvisorError> {
        let query = text_field(map, &["q", "query"]).ok_or_else(|| {
            AdvisorError::missing("query", "Missing or invalid 'query' field")
        })?;
        let k = match map.get("k") {
            None | Some(Value::Null) => search::DEFAULT_K,
            Some(v) => v.as_i64().ok_or_else(|| {
                AdvisorError::out_of_range("k", "Invalid 'k' value (must be 1-25)")
            })?,
        };
        Ok(Self {
            query,
            k,
            strategy: strategy_field(map)?,
        })
    }
}

#[derive(Debug)]
struct RecommendRequest {
    intent: String,
    top_k: i64,
    candidates: Option<Vec<Candidate>>,
    course_ids: Option<Vec<String>>,
    strategy: Option<Strategy>,
}

impl RecommendRequest {
    fn from_json(map: &Map<String, Value>) -> Result<Self, AdvisorError> {
        let intent = match text_field(map, &["q", "query"]) {
            Some(q) => q,
            None => compose_intent(map).ok_or_else(|| {
                AdvisorError::missing(
                    "intent",
                    "Missing intent: provide 'q', 'query' or 'profession'",
                )
            })?,
        };

        Ok(Self {
            intent,
            top_k: lenient_int(map.get("top_k")).unwrap_or(DEFAULT_TOP_K),
            candidates: supplied_results(map.get("results"))?,
            course_ids: supplied_ids(map.get("courses"))?,
            strategy: strategy_field(map)?,
        })
    }
}

/// `profession` plus optional `goal` as one intent string.
fn compose_intent(map: &Map<String, Value>) -> Option<String> {
    let profession = text_field(map, &["profession"])?;
    Some(match text_field(map, &["goal"]) {
        Some(goal) => format!("I am a {}. My goal: {}", profession, goal),
        None => format!("I am a {}.", profession),
    })
}

/// `top_k` is clamped later, so any numeric shape is accepted here.
fn lenient_int(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    }
}

fn supplied_results(value: Option<&Value>) -> Result<Option<Vec<Candidate>>, AdvisorError> {
    let items = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(AdvisorError::malformed(
                "results",
                "'results' must be an array of course objects",
            ))
        }
    };

    let mut candidates = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let id = item
            .get("course_id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                AdvisorError::malformed(
                    "results",
                    format!("'results[{}]' needs a non-empty string 'course_id'", i),
                )
            })?;
        let title = item
            .get("title")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(id);
        let mut candidate = Candidate::new(id, title);
        if let Some(meta) = item.get("metadata").filter(|m| m.is_object()) {
            candidate = candidate.with_metadata(meta.clone());
        }
        candidates.push(candidate);
    }
    Ok(Some(candidates))
}

fn supplied_ids(value: Option<&Value>) -> Result<Option<Vec<String>>, AdvisorError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => Ok(Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )),
        Some(_) => Err(AdvisorError::malformed(
            "courses",
            "'courses' must be an array of course ids",
        )),
    }
}

// ============ GET /health ============

async fn handle_health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

// ============ GET /__routes ============

async fn handle_routes() -> String {
    ROUTES
        .iter()
        .map(|(method, path, what)| format!("{:<5} {:<11} {}\n", method, path, what))
        .collect()
}

// ============ POST /search ============

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
    took_ms: u64,
}

async fn handle_search(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SearchResponse>, AppError> {
    let started = Instant::now();
    let fail = |e| AppError::from_advisor(e, started);

    let map = parse_object(&body).map_err(fail)?;
    let req = SearchRequest::from_json(&map).map_err(fail)?;
    let strategy = req
        .strategy
        .unwrap_or_else(|| state.config.retrieval.search_strategy());

    let results = search::search(&state.retriever, &req.query, req.k, strategy)
        .await
        .map_err(fail)?;

    let took_ms = elapsed_ms(started);
    info!(strategy = %strategy, count = results.len(), took_ms, "search");
    Ok(Json(SearchResponse { results, took_ms }))
}

// ============ POST /recommend ============

#[derive(Serialize)]
struct RecommendResponse {
    recommendations: Vec<RecommendationItem>,
    took_ms: u64,
}

async fn handle_recommend(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<RecommendResponse>, AppError> {
    let started = Instant::now();
    let fail = |e| AppError::from_advisor(e, started);

    let map = parse_object(&body).map_err(fail)?;
    let req = RecommendRequest::from_json(&map).map_err(fail)?;

    let source = match (req.candidates, req.course_ids) {
        (Some(candidates), _) => CandidateSource::Supplied(candidates),
        (None, Some(ids)) => {
            let titles = state
                .retriever
                .store()
                .titles_for(&ids)
                .await
                .map_err(fail)?;
            CandidateSource::Supplied(
                ids.into_iter()
                    .map(|id| {
                        let title = titles.get(&id).cloned().unwrap_or_else(|| id.clone());
                        Candidate::new(id, title)
                    })
                    .collect(),
            )
        }
        (None, None) => CandidateSource::Retrieve(
            req.strategy
                .unwrap_or_else(|| state.config.retrieval.recommend_strategy()),
        ),
    };

    let recommendations = state
        .recommender
        .recommend(&req.intent, req.top_k, source)
        .await
        .map_err(fail)?;

    let took_ms = elapsed_ms(started);
    info!(count = recommendations.len(), took_ms, "recommend");
    Ok(Json(RecommendResponse {
        recommendations,
        took_ms,
    }))
}
