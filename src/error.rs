use thiserror::Error;

/// Failures raised while talking to the sentiment classifier or interpreting
/// its answer.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classifier request failed: {0}")]
    Transport(String),

    #[error("classifier returned HTTP {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("classifier response is not valid JSON: {0}")]
    InvalidResponse(String),

    #[error("classifier response has no sentiment label at '{0}'")]
    MissingLabel(String),

    #[error("classifier response has no score mapping at '{0}'")]
    MissingScores(String),

    #[error("classifier score for '{label}' is not a number: {value}")]
    InvalidScore { label: String, value: String },

    #[error("classifier returned an empty score mapping")]
    EmptyScores,
}

/// Failures raised by a history store.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history record could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("history store unavailable: {0}")]
    Unavailable(String),
}

/// Coarse classification of a failed invocation. Decides the status code of
/// the transport response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller-correctable input problem (400).
    Validation,
    /// Undecodable envelope, classifier or history store failure (500).
    Upstream,
}

/// Everything that can stop an invocation before a result is returned.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("No text provided")]
    EmptyInput,

    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    /// The envelope's `body` string could not be decoded into a payload.
    #[error("Invalid request body: {0}")]
    UndecodableBody(String),

    #[error(transparent)]
    Classification(#[from] ClassifyError),

    #[error(transparent)]
    History(#[from] HistoryError),
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::EmptyInput | AnalysisError::MalformedBody(_) => ErrorKind::Validation,
            AnalysisError::UndecodableBody(_)
            | AnalysisError::Classification(_)
            | AnalysisError::History(_) => ErrorKind::Upstream,
        }
    }

    /// Short stage label used in logs and metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            AnalysisError::EmptyInput | AnalysisError::MalformedBody(_) => "validation",
            AnalysisError::UndecodableBody(_) => "envelope",
            AnalysisError::Classification(_) => "classification",
            AnalysisError::History(_) => "history",
        }
    }

    /// Message safe to hand to callers when error detail is redacted.
    pub fn redacted_message(&self) -> String {
        match self {
            AnalysisError::UndecodableBody(_) => "Failed to decode request body".to_string(),
            AnalysisError::Classification(_) => "Sentiment classification failed".to_string(),
            AnalysisError::History(_) => "Failed to record analysis history".to_string(),
            other => other.to_string(),
        }
    }
}
