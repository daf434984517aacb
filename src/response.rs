//! Transport responses.
//!
//! [`InvocationResponse`] is the function-proxy shape
//! (`{statusCode, headers, body}`) every invocation ends in. It can be
//! serialized as-is or turned into a real HTTP response.

use std::collections::BTreeMap;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, ErrorKind};
use crate::pipeline::Analysis;
use crate::AnalysisResult;

pub const CONTENT_TYPE_JSON: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    /// Serialized JSON document.
    pub body: String,
}

impl InvocationResponse {
    /// 200 with the shaped result. Only successful responses carry the open
    /// CORS header.
    pub fn success(result: &AnalysisResult) -> Self {
        let body = match serde_json::to_string(result) {
            Ok(body) => body,
            Err(e) => return Self::error(500, &e.to_string()),
        };
        let mut headers = json_headers();
        headers.insert("Access-Control-Allow-Origin".to_string(), "*".to_string());
        Self {
            status_code: 200,
            headers,
            body,
        }
    }

    /// `{"error": message}` with the given status.
    pub fn error(status_code: u16, message: &str) -> Self {
        Self {
            status_code,
            headers: json_headers(),
            body: serde_json::json!({ "error": message }).to_string(),
        }
    }

    pub fn from_error(err: &AnalysisError, redact: bool) -> Self {
        match err.kind() {
            ErrorKind::Validation => Self::error(400, &err.to_string()),
            ErrorKind::Upstream if redact => Self::error(500, &err.redacted_message()),
            ErrorKind::Upstream => Self::error(500, &err.to_string()),
        }
    }

    pub fn from_result(result: &Result<Analysis, AnalysisError>, redact: bool) -> Self {
        match result {
            Ok(analysis) => Self::success(&analysis.result),
            Err(err) => Self::from_error(err, redact),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parse the body back into JSON.
    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.body)
    }
}

fn json_headers() -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert("Content-Type".to_string(), CONTENT_TYPE_JSON.to_string());
    headers
}

impl IntoResponse for InvocationResponse {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, self.body).into_response();
        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::warn!(header = %name, "dropping invalid response header"),
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ClassifyError, HistoryError};
    use crate::SentimentScores;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::str::FromStr;

    fn result() -> AnalysisResult {
        let d = |s: &str| Decimal::from_str(s).unwrap();
        AnalysisResult {
            sentiment: "POSITIVE".into(),
            confidence: d("0.95"),
            scores: SentimentScores::from_iter([
                ("POSITIVE".to_string(), d("0.95")),
                ("NEGATIVE".to_string(), d("0.01")),
                ("NEUTRAL".to_string(), d("0.03")),
                ("MIXED".to_string(), d("0.01")),
            ]),
        }
    }

    #[test]
    fn success_carries_cors_and_numbers() {
        let resp = InvocationResponse::success(&result());
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.header("content-type"), Some("application/json"));
        assert_eq!(resp.header("access-control-allow-origin"), Some("*"));
        assert_eq!(
            resp.json().unwrap(),
            json!({
                "sentiment": "POSITIVE",
                "confidence": 0.95,
                "scores": {"POSITIVE": 0.95, "NEGATIVE": 0.01, "NEUTRAL": 0.03, "MIXED": 0.01}
            })
        );
    }

    #[test]
    fn validation_error_is_400_without_cors() {
        let resp = InvocationResponse::from_error(&AnalysisError::EmptyInput, false);
        assert_eq!(resp.status_code, 400);
        assert_eq!(resp.json().unwrap(), json!({"error": "No text provided"}));
        assert_eq!(resp.header("content-type"), Some("application/json"));
        assert_eq!(resp.header("access-control-allow-origin"), None);
    }

    #[test]
    fn upstream_errors_expose_or_redact_message() {
        let err: AnalysisError = HistoryError::Unavailable("table not found".into()).into();
        let open = InvocationResponse::from_error(&err, false);
        assert_eq!(open.status_code, 500);
        assert_eq!(
            open.json().unwrap(),
            json!({"error": "history store unavailable: table not found"})
        );
        assert_eq!(open.header("access-control-allow-origin"), None);

        let err: AnalysisError = ClassifyError::Transport("refused".into()).into();
        let redacted = InvocationResponse::from_error(&err, true);
        assert_eq!(
            redacted.json().unwrap(),
            json!({"error": "Sentiment classification failed"})
        );
    }

    #[test]
    fn serializes_in_proxy_shape() {
        let resp = InvocationResponse::error(400, "No text provided");
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["statusCode"], json!(400));
        assert_eq!(v["headers"]["Content-Type"], json!("application/json"));
        assert_eq!(v["body"], json!("{\"error\":\"No text provided\"}"));
    }

    #[test]
    fn converts_into_http_response() {
        let resp = InvocationResponse::success(&result()).into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "application/json"
        );
    }
}
