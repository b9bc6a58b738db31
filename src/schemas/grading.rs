use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub(crate) const MIN_BAND: f64 = 1.0;
pub(crate) const MAX_BAND: f64 = 9.0;

/// Structured assessment produced by one model inference.
///
/// Decoding is lenient: the model's values are trusted and only shapes that cannot be read
/// at all are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct GradingResult {
    #[serde(deserialize_with = "required_score")]
    pub(crate) band_score: f64,
    pub(crate) overall_analysis: OverallAnalysis,
    #[serde(deserialize_with = "null_as_empty")]
    pub(crate) grammar_errors: Vec<GrammarError>,
    #[serde(deserialize_with = "one_or_many")]
    pub(crate) paraphrasing_suggestions: Vec<ParaphrasingSuggestion>,
}

/// The first criterion is "Task Achievement" for Task 1 and "Task Response" for Task 2;
/// both are stored under `TaskAchievement`. Sub-scores the model leaves out stay `null`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct OverallAnalysis {
    #[serde(alias = "TaskResponse", default, deserialize_with = "optional_score")]
    pub(crate) task_achievement: Option<f64>,
    #[serde(default, deserialize_with = "optional_score")]
    pub(crate) coherence_and_cohesion: Option<f64>,
    #[serde(default, deserialize_with = "optional_score")]
    pub(crate) lexical_resource: Option<f64>,
    #[serde(default, deserialize_with = "optional_score")]
    pub(crate) grammatical_range_and_accuracy: Option<f64>,
    #[serde(rename = "summary", default, deserialize_with = "lenient_text")]
    pub(crate) summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct GrammarError {
    #[serde(default, deserialize_with = "lenient_text")]
    pub(crate) original_text: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub(crate) corrected_text: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub(crate) error_type: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub(crate) explanation_en: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub(crate) explanation_vn: String,
    #[serde(default)]
    pub(crate) mapped_type: MappedType,
    #[serde(default, deserialize_with = "lenient_index")]
    pub(crate) start_index: usize,
    #[serde(default, deserialize_with = "lenient_index")]
    pub(crate) end_index: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub(crate) struct ParaphrasingSuggestion {
    #[serde(default, deserialize_with = "lenient_text")]
    pub(crate) original_sentence: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub(crate) suggestion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum MappedType {
    #[default]
    Grammar,
    Vocabulary,
    Style,
    Punctuation,
}

impl MappedType {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            MappedType::Grammar => "Grammar",
            MappedType::Vocabulary => "Vocabulary",
            MappedType::Style => "Style",
            MappedType::Punctuation => "Punctuation",
        }
    }

    /// Unknown labels fall back to `Grammar` so a single odd annotation cannot fail a job.
    pub(crate) fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "vocabulary" | "lexical" | "word choice" => MappedType::Vocabulary,
            "style" | "coherence" => MappedType::Style,
            "punctuation" => MappedType::Punctuation,
            _ => MappedType::Grammar,
        }
    }
}

impl Serialize for MappedType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MappedType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = Option::<String>::deserialize(deserializer)?;
        Ok(label.map(|value| MappedType::from_label(&value)).unwrap_or_default())
    }
}

fn score_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Accepts numbers and numeric strings such as `"6.5"`.
fn required_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    score_value(&value).ok_or_else(|| D::Error::custom(format!("invalid band score: {value}")))
}

fn optional_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(score_value(&Value::deserialize(deserializer)?))
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(text) => text,
        other => other.to_string(),
    })
}

/// Character offsets sometimes come back as strings or floats; unreadable ones become 0
/// and are ordered by [`GradingResult::normalize`].
fn lenient_index<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let parsed = match &value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|value| *value >= 0.0).map(|value| value as u64)),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    };

    Ok(parsed.unwrap_or(0) as usize)
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// The prompt asks for one suggestion object, but models often return a list.
fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
    }

    Ok(match Option::<OneOrMany<T>>::deserialize(deserializer)? {
        Some(OneOrMany::Many(items)) => items,
        Some(OneOrMany::One(item)) => vec![item],
        None => Vec::new(),
    })
}

/// Rounds to the nearest half band and clamps into 1.0..=9.0.
pub(crate) fn normalize_band(score: f64) -> f64 {
    if !score.is_finite() {
        return MIN_BAND;
    }
    ((score * 2.0).round() / 2.0).clamp(MIN_BAND, MAX_BAND)
}

impl GradingResult {
    /// Brings model-reported values into the ranges the frontend relies on.
    pub(crate) fn normalize(&mut self, essay: &str) {
        self.band_score = normalize_band(self.band_score);
        self.overall_analysis.normalize();

        let essay_len = essay.chars().count();
        for error in &mut self.grammar_errors {
            error.clamp_offsets(essay_len);
        }
    }
}

impl OverallAnalysis {
    fn normalize(&mut self) {
        for score in [
            &mut self.task_achievement,
            &mut self.coherence_and_cohesion,
            &mut self.lexical_resource,
            &mut self.grammatical_range_and_accuracy,
        ] {
            if let Some(value) = score {
                *value = normalize_band(*value);
            }
        }
    }
}

impl GrammarError {
    fn clamp_offsets(&mut self, essay_len: usize) {
        let start = self.start_index.min(essay_len);
        let end = self.end_index.min(essay_len);
        self.start_index = start.min(end);
        self.end_index = start.max(end);
    }
}
