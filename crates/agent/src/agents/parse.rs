//! Model output is untrusted: locate the JSON object, decode it, clamp every number.

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("response contained no json object")]
    NoJson,
    #[error("response json did not match the expected shape: {0}")]
    Malformed(String),
}

/// Slice from the first `{` to the last `}`; tolerates prose and code fences around it.
pub fn extract_json(text: &str) -> Result<&str, ParseError> {
    let start = text.find('{').ok_or(ParseError::NoJson)?;
    let end = text.rfind('}').ok_or(ParseError::NoJson)?;
    if end < start {
        return Err(ParseError::NoJson);
    }
    Ok(&text[start..=end])
}

pub fn parse_model_json<T: DeserializeOwned>(text: &str) -> Result<T, ParseError> {
    let json = extract_json(text)?;
    serde_json::from_str(json).map_err(|error| ParseError::Malformed(error.to_string()))
}

/// Clamps into `[min, max]`; missing or non-finite values take `default`.
pub fn validate_number(value: Option<f64>, min: f64, max: f64, default: f64) -> f64 {
    match value {
        Some(number) if number.is_finite() => number.clamp(min, max),
        _ => default,
    }
}

/// Trimmed, non-empty strings only.
pub fn clean_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}
