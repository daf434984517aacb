use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};

use crate::classifier::ClassifierDefinition;
use crate::history::RotationPolicy;

const DEFAULT_LANGUAGE_CODE: &str = "en";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub classifier: ClassifierDefinition,
    pub language_code: String,
    pub history_file: Option<PathBuf>,
    pub rotation: RotationPolicy,
    pub history_fsync: bool,
    pub max_request_bytes: Option<usize>,
    pub redact_errors: bool,
}

impl AppConfig {
    /// Read configuration from the environment:
    ///
    /// * `SENTIO_CLASSIFIER_CONFIG` (optional) – path to a JSON classifier definition.
    /// * `SENTIO_CLASSIFIER_URL` / `SENTIO_CLASSIFIER_TOKEN` / `SENTIO_CLASSIFIER_TIMEOUT_MS`
    ///   – override the corresponding definition fields.
    /// * `SENTIO_LANGUAGE_CODE` – language hint passed to the classifier (default `en`).
    /// * `HISTORY_FILE` (optional) – newline‑delimited JSON history; unset keeps records in memory.
    /// * `HISTORY_MAX_BYTES`, `HISTORY_ROTATE_KEEP`, `HISTORY_ROTATE_COMPRESS`, `HISTORY_FSYNC`.
    /// * `SENTIO_MAX_REQUEST_BYTES`, `SENTIO_REDACT_ERRORS`.
    pub fn from_env() -> Result<Self> {
        let mut classifier = if let Ok(path) = env::var("SENTIO_CLASSIFIER_CONFIG") {
            let content = fs::read_to_string(&path).with_context(|| {
                format!(
                    "Failed to read SENTIO_CLASSIFIER_CONFIG '{}': file unreadable",
                    path
                )
            })?;
            serde_json::from_str::<ClassifierDefinition>(&content).with_context(|| {
                format!(
                    "Failed to parse SENTIO_CLASSIFIER_CONFIG '{}': invalid JSON configuration",
                    path
                )
            })?
        } else {
            ClassifierDefinition::default()
        };

        if let Some(url) = non_empty_env("SENTIO_CLASSIFIER_URL") {
            classifier.url = url;
        }
        if let Some(token) = non_empty_env("SENTIO_CLASSIFIER_TOKEN") {
            classifier.bearer_token = Some(token);
        }
        if let Some(ms) = parse_optional_u64("SENTIO_CLASSIFIER_TIMEOUT_MS")? {
            classifier.timeout_ms = Some(ms);
        }
        if classifier.url.trim().is_empty() {
            bail!("No classifier URL configured: set SENTIO_CLASSIFIER_URL or `url` in SENTIO_CLASSIFIER_CONFIG");
        }

        let language_code = non_empty_env("SENTIO_LANGUAGE_CODE")
            .unwrap_or_else(|| DEFAULT_LANGUAGE_CODE.to_string());

        let history_file = non_empty_env("HISTORY_FILE").map(PathBuf::from);

        let keep = parse_optional_u64("HISTORY_ROTATE_KEEP")?.unwrap_or(1) as usize;
        if keep == 0 {
            bail!("HISTORY_ROTATE_KEEP must be at least 1");
        }
        let rotation = RotationPolicy {
            max_bytes: parse_optional_u64("HISTORY_MAX_BYTES")?,
            keep,
            compress: parse_bool_env("HISTORY_ROTATE_COMPRESS")?.unwrap_or(false),
        };

        let history_fsync = parse_bool_env("HISTORY_FSYNC")?.unwrap_or(true);
        let max_request_bytes =
            parse_optional_u64("SENTIO_MAX_REQUEST_BYTES")?.map(|v| v as usize);
        let redact_errors = parse_bool_env("SENTIO_REDACT_ERRORS")?.unwrap_or(false);

        Ok(Self {
            classifier,
            language_code,
            history_file,
            rotation,
            history_fsync,
            max_request_bytes,
            redact_errors,
        })
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_optional_u64(var: &str) -> Result<Option<u64>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a positive integer", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool_env(var: &str) -> Result<Option<bool>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value)
            .map(Some)
            .ok_or_else(|| anyhow!("{} must be a boolean (true/false/1/0)", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
