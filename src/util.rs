//! Small helpers shared by the classifier adapter, the pipeline and the
//! history stores.

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

/// Convert a JSON number into an exact decimal using its shortest textual
/// form, so `0.95` becomes exactly `0.95` rather than the nearest binary
/// fraction. Returns `None` for anything that is not a finite number.
pub fn decimal_from_json(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Convert a decimal to an `f64` for JSON responses. Goes through the
/// decimal's text so a value built by [`decimal_from_json`] comes back as
/// the exact float the classifier sent.
pub fn decimal_to_f64(value: &Decimal) -> f64 {
    value
        .to_string()
        .parse::<f64>()
        .ok()
        .or_else(|| value.to_f64())
        .unwrap_or_default()
}

/// Escape a string for inclusion inside an existing JSON string literal
/// (without the surrounding quotes).
pub fn escape_json_string(value: &str) -> String {
    match serde_json::to_string(value) {
        Ok(mut json) => {
            if json.len() >= 2 {
                json.remove(0);
                json.pop();
            }
            json
        }
        Err(_) => String::new(),
    }
}

/// Current wall clock in whole seconds since the Unix epoch.
pub fn epoch_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Truncate `text` to at most `max` characters for log lines and error
/// details.
pub fn excerpt(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
