//! Core library for Sentio.  This module holds the data model, wires the
//! analysis pipeline to its collaborators and exposes the HTTP handlers.
//!
//! A request flows through the envelope normalizer, the sentiment
//! classifier, the result shaper and the history store before it is turned
//! into a transport response at the boundary.

mod config;
pub mod classifier;
pub mod envelope;
pub mod error;
pub mod history;
pub mod metrics;
pub mod pipeline;
pub mod response;
pub mod util;

pub use config::AppConfig;
pub use error::{AnalysisError, ClassifyError, ErrorKind, HistoryError};
pub use pipeline::{Analysis, Analyzer};
pub use response::InvocationResponse;

use axum::body::Bytes;
use axum::extract::{
    rejection::{BytesRejection, FailedToBufferBody},
    DefaultBodyLimit, State,
};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{routing::post, Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::classifier::{HttpClassifier, SentimentClassifier};
use crate::history::{FileHistoryStore, HistoryStore, MemoryHistoryStore};
use crate::metrics::Metrics;
use crate::util::decimal_to_f64;

/// Canonical request produced by the envelope normalizer. The text is
/// guaranteed to be non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    text: String,
}

impl AnalysisRequest {
    pub fn new(text: impl Into<String>) -> Result<Self, AnalysisError> {
        let text = text.into();
        if text.is_empty() {
            return Err(AnalysisError::EmptyInput);
        }
        Ok(Self { text })
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Per-label probabilities reported by the classifier, held as exact
/// decimals. Labels are kept exactly as the classifier names them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SentimentScores(BTreeMap<String, Decimal>);

impl SentimentScores {
    pub fn get(&self, label: &str) -> Option<&Decimal> {
        self.0.get(label)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Decimal)> {
        self.0.iter()
    }

    /// Highest probability in the mapping.
    pub fn max(&self) -> Option<Decimal> {
        self.0.values().copied().max()
    }

    /// Label carrying the highest probability. Ties resolve to the
    /// lexicographically first label.
    pub fn argmax(&self) -> Option<&str> {
        let max = self.max()?;
        self.0
            .iter()
            .find(|(_, v)| **v == max)
            .map(|(k, _)| k.as_str())
    }

    pub fn to_f64_map(&self) -> BTreeMap<String, f64> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), decimal_to_f64(v)))
            .collect()
    }
}

impl From<BTreeMap<String, Decimal>> for SentimentScores {
    fn from(map: BTreeMap<String, Decimal>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Decimal)> for SentimentScores {
    fn from_iter<I: IntoIterator<Item = (String, Decimal)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Shaped result handed back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    /// Label chosen by the classifier.
    pub sentiment: String,
    /// Maximum value in `scores`.
    pub confidence: Decimal,
    pub scores: SentimentScores,
}

#[derive(Serialize)]
struct AnalysisResultBody<'a> {
    sentiment: &'a str,
    confidence: f64,
    scores: BTreeMap<String, f64>,
}

// Callers receive plain JSON numbers; only the history keeps exact decimals.
impl Serialize for AnalysisResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        AnalysisResultBody {
            sentiment: &self.sentiment,
            confidence: decimal_to_f64(&self.confidence),
            scores: self.scores.to_f64_map(),
        }
        .serialize(serializer)
    }
}

/// Immutable audit entry written once per successful classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    /// Seconds since the Unix epoch, captured when the record is written.
    pub timestamp: i64,
    pub request_text: String,
    pub sentiment: String,
    pub confidence: Decimal,
    pub scores: SentimentScores,
}

/// Internal application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<Analyzer>,
    pub metrics: Arc<Metrics>,
    /// Maximum accepted raw request body size in bytes (None => axum default)
    pub max_request_bytes: Option<usize>,
    /// Replace upstream error text with a fixed message in 500 responses.
    pub redact_errors: bool,
}

impl AppState {
    pub fn new(analyzer: Analyzer, max_request_bytes: Option<usize>, redact_errors: bool) -> Self {
        Self {
            analyzer: Arc::new(analyzer),
            metrics: Arc::new(Metrics::new()),
            max_request_bytes,
            redact_errors,
        }
    }

    /// Run one invocation event through the pipeline and build its
    /// transport response.
    pub async fn invoke(&self, event: serde_json::Value) -> InvocationResponse {
        let start = Instant::now();
        let result = self.analyzer.process(event).await;
        self.finish(result, start)
    }

    fn finish(&self, result: Result<Analysis, AnalysisError>, start: Instant) -> InvocationResponse {
        let latency_ms = start.elapsed().as_millis() as u64;
        self.metrics.record(&result, latency_ms);
        match &result {
            Ok(analysis) => {
                tracing::info!(
                    record_id = %analysis.record_id,
                    sentiment = %analysis.result.sentiment,
                    confidence = %analysis.result.confidence,
                    latency_ms,
                    "analysis recorded"
                );
            }
            Err(err) if err.kind() == ErrorKind::Validation => {
                tracing::debug!(error = %err, "invocation rejected");
            }
            Err(err) => {
                tracing::error!(stage = err.stage(), error = %err, latency_ms, "analysis failed");
            }
        }
        InvocationResponse::from_result(&result, self.redact_errors)
    }
}

/// Build state from environment variables. See [`AppConfig::from_env`] for
/// the variables read.
pub async fn build_state_from_env() -> anyhow::Result<AppState> {
    let config = AppConfig::from_env()?;
    build_state(config)
}

/// Construct the classifier and history store described by `config` and
/// wrap them in an [`AppState`].
pub fn build_state(config: AppConfig) -> anyhow::Result<AppState> {
    use anyhow::Context;

    let AppConfig {
        classifier,
        language_code,
        history_file,
        rotation,
        history_fsync,
        max_request_bytes,
        redact_errors,
    } = config;

    let url = classifier.url.clone();
    let classifier: Arc<dyn SentimentClassifier> = Arc::new(
        HttpClassifier::new(classifier)
            .with_context(|| format!("Failed to build classifier client for {}", url))?,
    );

    let history: Arc<dyn HistoryStore> = match history_file.as_deref() {
        Some(path) => Arc::new(
            FileHistoryStore::open(path, rotation, history_fsync).with_context(|| {
                format!("Failed to open HISTORY_FILE '{}'", path.display())
            })?,
        ),
        None => {
            tracing::warn!("HISTORY_FILE not set; history records are kept in memory only");
            Arc::new(MemoryHistoryStore::new())
        }
    };

    tracing::info!(classifier_url = %url, language_code = %language_code, history = history.name(), "sentio configured");
    let analyzer = Analyzer::new(classifier, history, language_code);
    Ok(AppState::new(analyzer, max_request_bytes, redact_errors))
}

/// Build the Axum router and attach handlers.
pub fn app(state: AppState) -> Router {
    let max_request_bytes = state.max_request_bytes;

    let router = Router::new()
        .route("/analyze", post(analyze_handler))
        .route("/invoke", post(invoke_handler))
        .route("/healthz", axum::routing::get(healthz_handler))
        .route("/metrics", axum::routing::get(metrics_handler));

    let router = if let Some(limit) = max_request_bytes {
        router.layer(DefaultBodyLimit::max(limit))
    } else {
        router
    };

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

fn request_too_large(limit: Option<usize>, declared: Option<usize>) -> axum::response::Response {
    let message = match (declared, limit) {
        (Some(len), Some(limit)) => {
            format!("Request too large ({} bytes > limit {} bytes)", len, limit)
        }
        (None, Some(limit)) => format!("Request too large (body exceeded limit {} bytes)", limit),
        _ => "Request too large".to_string(),
    };
    InvocationResponse::error(StatusCode::PAYLOAD_TOO_LARGE.as_u16(), &message).into_response()
}

/// Turn the raw request body into an invocation event. An empty body is the
/// empty event; anything that is not JSON is rejected.
fn read_event(
    state: &AppState,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<serde_json::Value, axum::response::Response> {
    // Size guard: rely on Content-Length header if provided.
    if let Some(limit) = state.max_request_bytes {
        let declared = headers
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if let Some(len) = declared.filter(|len| *len > limit) {
            tracing::warn!(limit, declared = len, "request body exceeds configured limit");
            return Err(request_too_large(Some(limit), Some(len)));
        }
    }

    let bytes = match body {
        Ok(bytes) => bytes,
        Err(BytesRejection::FailedToBufferBody(FailedToBufferBody::LengthLimitError(_))) => {
            tracing::warn!(limit = ?state.max_request_bytes, "request body exceeded limit");
            return Err(request_too_large(state.max_request_bytes, None));
        }
        Err(other) => return Err(other.into_response()),
    };

    if bytes.is_empty() {
        return Ok(serde_json::Value::Object(serde_json::Map::new()));
    }
    serde_json::from_slice(&bytes).map_err(|e| {
        let start = Instant::now();
        state
            .finish(Err(AnalysisError::MalformedBody(e.to_string())), start)
            .into_response()
    })
}

/// Handler for `/analyze`.  The request body is the invocation payload and
/// the invocation response is returned as the HTTP response itself.
async fn analyze_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> axum::response::Response {
    let event = match read_event(&state, &headers, body) {
        Ok(event) => event,
        Err(resp) => return resp,
    };
    state.invoke(event).await.into_response()
}

/// Handler for `/invoke`.  Emulates a function proxy: the invocation
/// response is serialized as `{statusCode, headers, body}` and always
/// delivered with HTTP 200.
async fn invoke_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> axum::response::Response {
    let event = match read_event(&state, &headers, body) {
        Ok(event) => event,
        Err(resp) => return resp,
    };
    let response = state.invoke(event).await;
    (StatusCode::OK, Json(response)).into_response()
}

/// Simple health endpoint for container readiness / liveness checks.
async fn healthz_handler(State(state): State<AppState>) -> axum::response::Response {
    let json = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "classifier": state.analyzer.classifier().name(),
        "history": state.analyzer.history().name(),
        "languageCode": state.analyzer.language_code(),
    });
    (StatusCode::OK, Json(json)).into_response()
}

/// Prometheus-style metrics exposition.
async fn metrics_handler(State(state): State<AppState>) -> axum::response::Response {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        state.metrics.render(),
    )
        .into_response()
}
