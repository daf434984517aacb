//! Request normalization.
//!
//! Invocations arrive in one of several shapes: the payload itself
//! (`{"text": "..."}`), or a proxy envelope whose `body` is a serialized
//! JSON string, an already structured object, or a base64 encoded string
//! flagged with `isBase64Encoded`. [`Envelope::from_event`] classifies the
//! raw event once and [`Envelope::into_request`] turns it into the single
//! canonical [`AnalysisRequest`] the pipeline works with.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;

use crate::error::AnalysisError;
use crate::AnalysisRequest;

/// Accepted invocation shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// The event is the payload.
    Direct(Value),
    /// The payload sits under the envelope's `body` field.
    Wrapped(Body),
}

/// The `body` of a wrapped envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Serialized(String),
    Encoded(String),
    Structured(Value),
}

impl Envelope {
    pub fn from_event(event: Value) -> Self {
        match event {
            Value::Object(mut map) if map.contains_key("body") => {
                let encoded = map
                    .get("isBase64Encoded")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let body = map.remove("body").unwrap_or(Value::Null);
                match body {
                    Value::String(raw) if encoded => Envelope::Wrapped(Body::Encoded(raw)),
                    Value::String(raw) => Envelope::Wrapped(Body::Serialized(raw)),
                    other => Envelope::Wrapped(Body::Structured(other)),
                }
            }
            other => Envelope::Direct(other),
        }
    }

    /// Resolve the structured payload carried by this envelope.
    pub fn into_payload(self) -> Result<Value, AnalysisError> {
        match self {
            Envelope::Direct(payload) => Ok(payload),
            Envelope::Wrapped(Body::Structured(payload)) => Ok(payload),
            Envelope::Wrapped(Body::Serialized(raw)) => parse_serialized(&raw),
            Envelope::Wrapped(Body::Encoded(raw)) => {
                let bytes = STANDARD
                    .decode(raw.trim())
                    .map_err(|e| AnalysisError::UndecodableBody(format!("invalid base64: {}", e)))?;
                let text = String::from_utf8(bytes)
                    .map_err(|_| AnalysisError::UndecodableBody("body is not valid UTF-8".into()))?;
                parse_serialized(&text)
            }
        }
    }

    pub fn into_request(self) -> Result<AnalysisRequest, AnalysisError> {
        let payload = self.into_payload()?;
        match payload.get("text") {
            Some(Value::String(text)) => AnalysisRequest::new(text.clone()),
            _ => Err(AnalysisError::EmptyInput),
        }
    }
}

fn parse_serialized(raw: &str) -> Result<Value, AnalysisError> {
    if raw.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(raw).map_err(|e| AnalysisError::UndecodableBody(e.to_string()))
}

/// Normalize a raw invocation event into an [`AnalysisRequest`].
pub fn normalize(event: Value) -> Result<AnalysisRequest, AnalysisError> {
    Envelope::from_event(event).into_request()
}
