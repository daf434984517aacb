//! Orchestration of one invocation: normalize, classify, shape, record.
//!
//! Each step returns an explicit `Result`; the first failure short-circuits
//! the rest. In particular the history record is only built once the
//! classifier has answered and the result has been shaped, so a failed
//! classification never leaves a record behind, and a failed write never
//! returns a result.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::classifier::{Classification, SentimentClassifier};
use crate::envelope;
use crate::error::{AnalysisError, ClassifyError};
use crate::history::HistoryStore;
use crate::util::epoch_seconds;
use crate::{AnalysisRequest, AnalysisResult, HistoryRecord};

/// Outcome of a successful invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub result: AnalysisResult,
    /// Id of the history record written for this invocation.
    pub record_id: Uuid,
}

impl AnalysisResult {
    /// Shape a classifier verdict. `confidence` is the maximum score; the
    /// label is taken from the classifier as-is, even when it is not the
    /// argmax of its own scores.
    pub fn from_classification(c: Classification) -> Result<Self, ClassifyError> {
        let confidence = c.scores.max().ok_or(ClassifyError::EmptyScores)?;
        if c.scores.argmax().is_some_and(|top| top != c.label) {
            tracing::debug!(label = %c.label, "classifier label differs from its top score");
        }
        Ok(Self {
            sentiment: c.label,
            confidence,
            scores: c.scores,
        })
    }
}

impl HistoryRecord {
    /// Build the record for `result` with a fresh id, timestamped now.
    pub fn capture(request: &AnalysisRequest, result: &AnalysisResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: epoch_seconds(),
            request_text: request.text().to_string(),
            sentiment: result.sentiment.clone(),
            confidence: result.confidence,
            scores: result.scores.clone(),
        }
    }
}

/// Runs invocations against an injected classifier and history store.
pub struct Analyzer {
    classifier: Arc<dyn SentimentClassifier>,
    history: Arc<dyn HistoryStore>,
    language_code: String,
}

impl Analyzer {
    pub fn new(
        classifier: Arc<dyn SentimentClassifier>,
        history: Arc<dyn HistoryStore>,
        language_code: impl Into<String>,
    ) -> Self {
        Self {
            classifier,
            history,
            language_code: language_code.into(),
        }
    }

    pub fn classifier(&self) -> &Arc<dyn SentimentClassifier> {
        &self.classifier
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    pub fn language_code(&self) -> &str {
        &self.language_code
    }

    /// Normalize a raw invocation event and analyze it.
    pub async fn process(&self, event: Value) -> Result<Analysis, AnalysisError> {
        let request = envelope::normalize(event)?;
        self.analyze(&request).await
    }

    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<Analysis, AnalysisError> {
        let classification = self
            .classifier
            .classify(request.text(), &self.language_code)
            .await?;
        let result = AnalysisResult::from_classification(classification)?;
        let record = HistoryRecord::capture(request, &result);
        self.history.put(&record).await?;
        tracing::trace!(record_id = %record.id, store = self.history.name(), "history record written");
        Ok(Analysis {
            result,
            record_id: record.id,
        })
    }
}
