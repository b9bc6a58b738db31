use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::services::llm::{GenerationError, GenerationParams, TextGenerator};

/// Scripted generator for tests. Keyed replies win when the prompt contains the key;
/// otherwise replies are consumed in order and the last one repeats.
#[derive(Clone, Default)]
pub(crate) struct MockGenerator {
    keyed: Arc<Vec<(String, String)>>,
    replies: Arc<Mutex<VecDeque<Result<String, String>>>>,
    prompts: Arc<Mutex<Vec<String>>>,
    delay: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockGenerator {
    pub(crate) fn always(reply: impl Into<String>) -> Self {
        Self::scripted(vec![Ok(reply.into())])
    }

    pub(crate) fn failing(message: impl Into<String>) -> Self {
        Self::scripted(vec![Err(message.into())])
    }

    pub(crate) fn scripted(replies: Vec<Result<String, String>>) -> Self {
        Self { replies: Arc::new(Mutex::new(replies.into())), ..Self::default() }
    }

    pub(crate) fn keyed(pairs: Vec<(&str, String)>) -> Self {
        let keyed = pairs.into_iter().map(|(key, reply)| (key.to_string(), reply)).collect();
        Self { keyed: Arc::new(keyed), ..Self::default() }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, prompt: &str) -> Result<String, String> {
        if let Some((_, reply)) = self.keyed.iter().find(|(key, _)| prompt.contains(key.as_str())) {
            return Ok(reply.clone());
        }

        let mut replies = self.replies.lock().unwrap();
        if replies.len() > 1 {
            replies.pop_front().unwrap()
        } else {
            replies.front().cloned().unwrap_or_else(|| Err("no scripted reply".to_string()))
        }
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _params: GenerationParams,
    ) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.next_reply(prompt).map_err(GenerationError::Backend)
    }
}

/// The JSON object a well-behaved model returns for `band_score`.
pub(crate) fn sample_json(band_score: f64) -> serde_json::Value {
    json!({
        "band_score": band_score,
        "overall_analysis": {
            "TaskAchievement": band_score,
            "CoherenceAndCohesion": band_score,
            "LexicalResource": band_score,
            "GrammaticalRangeAndAccuracy": band_score,
            "summary": format!("Consistent band {band_score} performance.")
        },
        "grammar_errors": [
            {
                "original_text": "connect",
                "corrected_text": "connects",
                "error_type": "Subject-verb agreement",
                "explanation_en": "Singular subject needs a singular verb.",
                "explanation_vn": "Chủ ngữ số ít cần động từ số ít.",
                "mapped_type": "Grammar",
                "start_index": 11,
                "end_index": 18
            }
        ],
        "paraphrasing_suggestions": {
            "original_sentence": "Technology connects people.",
            "suggestion": "Technology brings people together."
        }
    })
}

/// Model-style output: prompt echo, prose around the object and a trailing comma.
pub(crate) fn sample_output(band_score: f64) -> String {
    let pretty = serde_json::to_string_pretty(&sample_json(band_score)).unwrap();
    let with_trailing_comma = match pretty.rfind('}') {
        Some(index) => format!("{},\n}}", pretty[..index].trim_end()),
        None => pretty,
    };
    format!("[INST] grade this [/INST] Here is the assessment:\n{with_trailing_comma}\nDone.")
}
