#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{routing::post, Json, Router};
use sentio::classifier::{ClassifierDefinition, HttpClassifier};
use sentio::history::MemoryHistoryStore;
use sentio::{Analyzer, AppState};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Tracks environment variable mutations and restores originals on drop.
pub struct EnvGuard {
    originals: HashMap<String, Option<String>>,
}

impl EnvGuard {
    pub fn new() -> Self {
        Self {
            originals: HashMap::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.capture(key);
        std::env::set_var(key, value);
    }

    pub fn set_many(&mut self, entries: &[(&str, &str)]) {
        for (key, value) in entries {
            self.set(key, value);
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.capture(key);
        std::env::remove_var(key);
    }

    fn capture(&mut self, key: &str) {
        if self.originals.contains_key(key) {
            return;
        }
        let original = std::env::var(key).ok();
        self.originals.insert(key.to_string(), original);
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, original) in self.originals.drain() {
            match original {
                Some(value) => std::env::set_var(&key, value),
                None => std::env::remove_var(&key),
            }
        }
    }
}

#[derive(Clone, Default)]
struct MockState {
    calls: Arc<AtomicUsize>,
    last: Arc<Mutex<Option<(Option<String>, Value)>>>,
}

/// A stand-in for the external classifier. Decides on keywords in `Text`:
/// "love" is positive, "hate" negative, "fail" answers 503, "garbage"
/// answers with a non-JSON body, "slow" sleeps before a neutral answer.
pub struct MockClassifier {
    pub url: String,
    state: MockState,
    handle: JoinHandle<()>,
}

impl MockClassifier {
    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    /// Authorization header and JSON body of the most recent request.
    pub fn last_request(&self) -> Option<(Option<String>, Value)> {
        self.state.last.lock().unwrap().clone()
    }
}

impl Drop for MockClassifier {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn positive_scores() -> Value {
    json!({"POSITIVE": 0.95, "NEGATIVE": 0.01, "NEUTRAL": 0.03, "MIXED": 0.01})
}

async fn detect(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(v): Json<Value>,
) -> axum::response::Response {
    state.calls.fetch_add(1, Ordering::SeqCst);
    let auth = headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    *state.last.lock().unwrap() = Some((auth, v.clone()));

    let text = v.get("Text").and_then(Value::as_str).unwrap_or("");
    if text.contains("fail") {
        return (StatusCode::SERVICE_UNAVAILABLE, "throttled").into_response();
    }
    if text.contains("garbage") {
        return (StatusCode::OK, "not json").into_response();
    }
    if text.contains("slow") {
        tokio::time::sleep(Duration::from_millis(300)).await;
    }
    let (label, scores) = if text.contains("love") {
        ("POSITIVE", positive_scores())
    } else if text.contains("hate") {
        (
            "NEGATIVE",
            json!({"POSITIVE": 0.02, "NEGATIVE": 0.9, "NEUTRAL": 0.05, "MIXED": 0.03}),
        )
    } else {
        (
            "NEUTRAL",
            json!({"POSITIVE": 0.1, "NEGATIVE": 0.1, "NEUTRAL": 0.7, "MIXED": 0.1}),
        )
    };
    Json(json!({"Sentiment": label, "SentimentScore": scores})).into_response()
}

pub async fn start_mock_classifier() -> MockClassifier {
    let state = MockState::default();
    let app = Router::new()
        .route("/detect", post(detect))
        .with_state(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    MockClassifier {
        url: format!("http://{}/detect", addr),
        state,
        handle,
    }
}

pub fn definition_for(url: &str) -> ClassifierDefinition {
    ClassifierDefinition {
        url: url.to_string(),
        ..ClassifierDefinition::default()
    }
}

/// App state wired to the classifier at `url` with an inspectable in-memory store.
pub fn memory_state(url: &str) -> (AppState, Arc<MemoryHistoryStore>) {
    let store = Arc::new(MemoryHistoryStore::new());
    let classifier = Arc::new(HttpClassifier::new(definition_for(url)).unwrap());
    let analyzer = Analyzer::new(classifier, store.clone(), "en");
    (AppState::new(analyzer, None, false), store)
}

pub async fn spawn_app(state: AppState) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = sentio::app(state);
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), handle)
}
