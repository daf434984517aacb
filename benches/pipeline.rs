use std::sync::Arc;

use async_trait::async_trait;
use axum::{routing::post, Json, Router};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sentio::classifier::{
    Classification, ClassifierDefinition, HttpClassifier, SentimentClassifier,
};
use sentio::envelope::normalize;
use sentio::history::MemoryHistoryStore;
use sentio::{Analyzer, AppState, ClassifyError, SentimentScores};
use serde_json::json;
use std::str::FromStr;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;

struct FixedClassifier {
    scores: SentimentScores,
}

#[async_trait]
impl SentimentClassifier for FixedClassifier {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn classify(&self, _text: &str, _lang: &str) -> Result<Classification, ClassifyError> {
        Ok(Classification {
            label: "POSITIVE".into(),
            scores: self.scores.clone(),
        })
    }
}

fn fixed_scores() -> SentimentScores {
    let d = |s: &str| rust_decimal::Decimal::from_str(s).unwrap();
    SentimentScores::from_iter([
        ("POSITIVE".to_string(), d("0.95")),
        ("NEGATIVE".to_string(), d("0.01")),
        ("NEUTRAL".to_string(), d("0.03")),
        ("MIXED".to_string(), d("0.01")),
    ])
}

fn bench_scenarios(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let serialized = json!({"text": "I love this product"}).to_string();
    c.bench_function("normalize_wrapped", |b| {
        b.iter(|| {
            let event = json!({ "body": serialized.clone() });
            black_box(normalize(event).unwrap());
        })
    });

    let in_process = AppState::new(
        Analyzer::new(
            Arc::new(FixedClassifier {
                scores: fixed_scores(),
            }),
            Arc::new(MemoryHistoryStore::new()),
            "en",
        ),
        None,
        false,
    );
    c.bench_function("invoke_in_process", |b| {
        b.iter(|| {
            let out = rt.block_on(in_process.invoke(json!({"text": "I love this product"})));
            black_box(out);
        })
    });

    let url = rt.block_on(async {
        async fn detect(Json(_v): Json<serde_json::Value>) -> Json<serde_json::Value> {
            Json(json!({
                "Sentiment": "POSITIVE",
                "SentimentScore": {"POSITIVE": 0.95, "NEGATIVE": 0.01, "NEUTRAL": 0.03, "MIXED": 0.01}
            }))
        }
        let app = Router::new().route("/detect", post(detect));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/detect", addr)
    });
    let over_http = AppState::new(
        Analyzer::new(
            Arc::new(
                HttpClassifier::new(ClassifierDefinition {
                    url,
                    ..ClassifierDefinition::default()
                })
                .unwrap(),
            ),
            Arc::new(MemoryHistoryStore::new()),
            "en",
        ),
        None,
        false,
    );
    c.bench_function("invoke_http_classifier", |b| {
        b.iter(|| {
            let out = rt.block_on(over_http.invoke(json!({"text": "I love this product"})));
            black_box(out);
        })
    });
}

criterion_group!(benches, bench_scenarios);
criterion_main!(benches);
