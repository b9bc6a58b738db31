use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::schemas::grading::GradingResult;
use crate::services::prompt::INSTRUCTION_END_MARKER;

pub(crate) const REQUIRED_KEYS: [&str; 4] =
    ["band_score", "overall_analysis", "grammar_errors", "paraphrasing_suggestions"];

#[derive(Debug, Error)]
pub(crate) enum ParseError {
    #[error("model output is not valid JSON: {0}")]
    MalformedJson(String),
    #[error("model output is missing required keys: {}", .missing.join(", "))]
    MissingKeys { missing: Vec<&'static str>, present: Vec<String> },
    #[error("model output has an invalid field: {0}")]
    InvalidField(String),
}

/// A decoded model answer: the typed view plus the JSON object exactly as the model wrote it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedGrading {
    pub(crate) result: GradingResult,
    pub(crate) raw: Value,
}

/// Extracts the JSON object embedded in generated text and decodes it into a result.
///
/// Any prompt echo up to the last `[/INST]` marker is discarded, the span between the
/// first `{` and the last `}` is taken, markdown fencing is stripped and trailing commas
/// are repaired before decoding. Values are not range-checked here.
pub(crate) fn parse_grading_output(raw: &str) -> Result<ParsedGrading, ParseError> {
    let json = extract_json_object(raw)?;
    let repaired = repair_trailing_commas(json);

    let value: Value = serde_json::from_str(&repaired)
        .map_err(|err| ParseError::MalformedJson(err.to_string()))?;

    let Value::Object(object) = &value else {
        return Err(ParseError::MalformedJson("top-level value is not an object".to_string()));
    };

    let missing: Vec<&'static str> =
        REQUIRED_KEYS.iter().copied().filter(|key| !object.contains_key(*key)).collect();
    if !missing.is_empty() {
        return Err(ParseError::MissingKeys { missing, present: object.keys().cloned().collect() });
    }

    let result = GradingResult::deserialize(&value)
        .map_err(|err| ParseError::InvalidField(err.to_string()))?;

    Ok(ParsedGrading { result, raw: value })
}

fn extract_json_object(raw: &str) -> Result<&str, ParseError> {
    let response = match raw.rfind(INSTRUCTION_END_MARKER) {
        Some(index) => &raw[index + INSTRUCTION_END_MARKER.len()..],
        None => raw,
    }
    .trim();

    let start = response
        .find('{')
        .ok_or_else(|| ParseError::MalformedJson("no opening '{' in model output".to_string()))?;
    let end = response
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| ParseError::MalformedJson("no closing '}' in model output".to_string()))?;

    Ok(response[start..=end].trim().trim_matches('`').trim())
}

fn repair_trailing_commas(json: &str) -> String {
    static TRAILING_COMMA: OnceLock<Regex> = OnceLock::new();
    let pattern = TRAILING_COMMA
        .get_or_init(|| Regex::new(r",\s*([\]}])").expect("trailing comma pattern compiles"));
    pattern.replace_all(json, "$1").into_owned()
}
