use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{Classification, SentimentClassifier};
use crate::error::ClassifyError;
use crate::util::{decimal_from_json, escape_json_string, excerpt};
use crate::SentimentScores;

/// Definition of the external classifier endpoint. Usually loaded from the
/// JSON file named by `SENTIO_CLASSIFIER_CONFIG`, with individual fields
/// overridable from the environment.
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierDefinition {
    #[serde(default = "classifier_default_name")]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// Request timeout. `None` keeps the HTTP client's default behaviour.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub request_template: Option<String>,
    /// JSON pointer (or top-level key) of the label in the response.
    #[serde(default = "classifier_default_label_field")]
    pub label_field: String,
    /// JSON pointer (or top-level key) of the score object in the response.
    #[serde(default = "classifier_default_scores_field")]
    pub scores_field: String,
}

fn classifier_default_name() -> String {
    "http".to_string()
}
fn classifier_default_label_field() -> String {
    "/Sentiment".to_string()
}
fn classifier_default_scores_field() -> String {
    "/SentimentScore".to_string()
}

impl Default for ClassifierDefinition {
    fn default() -> Self {
        Self {
            name: classifier_default_name(),
            url: String::new(),
            bearer_token: None,
            timeout_ms: None,
            request_template: None,
            label_field: classifier_default_label_field(),
            scores_field: classifier_default_scores_field(),
        }
    }
}

const DEFAULT_TEMPLATE: &str = r#"{"Text": ${textJson}, "LanguageCode": ${languageCodeJson}}"#;

/// HttpClassifier POSTs a templated JSON body to the configured endpoint and
/// reads the label and score mapping out of the JSON answer.
pub struct HttpClassifier {
    def: ClassifierDefinition,
    client: reqwest::Client,
}

impl HttpClassifier {
    pub fn new(def: ClassifierDefinition) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(ms) = def.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let client = builder.build()?;
        Ok(Self { def, client })
    }

    pub fn definition(&self) -> &ClassifierDefinition {
        &self.def
    }

    fn render_body(&self, text: &str, language_code: &str) -> String {
        let template = self
            .def
            .request_template
            .as_deref()
            .unwrap_or(DEFAULT_TEMPLATE);

        let text_json = serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string());
        let language_json =
            serde_json::to_string(language_code).unwrap_or_else(|_| "\"\"".to_string());

        let text_escaped = escape_json_string(text);
        let language_escaped = escape_json_string(language_code);

        render_template(
            template,
            &[
                ("textJson", text_json.as_str()),
                ("languageCodeJson", language_json.as_str()),
                ("text", text_escaped.as_str()),
                ("languageCode", language_escaped.as_str()),
            ],
        )
    }

    fn interpret(&self, val: &Value) -> Result<Classification, ClassifyError> {
        let label = lookup(val, &self.def.label_field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ClassifyError::MissingLabel(self.def.label_field.clone()))?;

        let raw_scores = lookup(val, &self.def.scores_field)
            .and_then(Value::as_object)
            .ok_or_else(|| ClassifyError::MissingScores(self.def.scores_field.clone()))?;

        let mut scores = BTreeMap::new();
        for (name, raw) in raw_scores {
            let score = decimal_from_json(raw).ok_or_else(|| ClassifyError::InvalidScore {
                label: name.clone(),
                value: raw.to_string(),
            })?;
            scores.insert(name.clone(), score);
        }

        Ok(Classification {
            label: label.to_string(),
            scores: SentimentScores::from(scores),
        })
    }
}

/// Substitute `${name}` placeholders in a single pass so substituted values
/// are never re-expanded. Unknown placeholders are left untouched.
fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = &after[..end];
        match vars.iter().find(|(k, _)| *k == key) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[start..start + end + 3]),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Resolve `field` either as a JSON pointer (leading `/`) or a top-level key.
fn lookup<'a>(val: &'a Value, field: &str) -> Option<&'a Value> {
    if field.starts_with('/') {
        val.pointer(field)
    } else {
        val.get(field)
    }
}

#[async_trait]
impl SentimentClassifier for HttpClassifier {
    fn name(&self) -> &str {
        &self.def.name
    }

    async fn classify(
        &self,
        text: &str,
        language_code: &str,
    ) -> Result<Classification, ClassifyError> {
        let body = self.render_body(text, language_code);
        let mut rb = self
            .client
            .post(&self.def.url)
            .header("content-type", "application/json");
        if let Some(tok) = &self.def.bearer_token {
            rb = rb.bearer_auth(tok);
        }
        let resp = rb.body(body).send().await.map_err(|err| {
            tracing::warn!(classifier=%self.def.name, error=?err, "classifier network error");
            ClassifyError::Transport(err.to_string())
        })?;
        let status = resp.status();
        let text = resp.text().await.map_err(|err| {
            tracing::warn!(classifier=%self.def.name, error=?err, "classifier read error");
            ClassifyError::Transport(err.to_string())
        })?;
        if !status.is_success() {
            tracing::warn!(classifier=%self.def.name, status=status.as_u16(), "classifier rejected request");
            return Err(ClassifyError::Status {
                status: status.as_u16(),
                detail: excerpt(&text, 200),
            });
        }
        let json: Value = serde_json::from_str(&text)
            .map_err(|err| ClassifyError::InvalidResponse(err.to_string()))?;
        self.interpret(&json)
    }
}
