//! Sentiment classification.
//!
//! The service never scores text itself. A [`SentimentClassifier`] forwards
//! the text and a language hint to an external capability and hands back
//! the label it chose together with its per-class probabilities.

use async_trait::async_trait;

use crate::error::ClassifyError;
use crate::SentimentScores;

pub mod http;

pub use self::http::{ClassifierDefinition, HttpClassifier};

/// Raw classifier verdict before shaping.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Label reported by the classifier. Not necessarily the argmax of
    /// `scores`.
    pub label: String,
    pub scores: SentimentScores,
}

/// Adapter over an external sentiment classification capability.
///
/// Implementations must not retry or cache; a failure is reported to the
/// caller as-is.
#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    fn name(&self) -> &str;

    async fn classify(
        &self,
        text: &str,
        language_code: &str,
    ) -> Result<Classification, ClassifyError>;
}
