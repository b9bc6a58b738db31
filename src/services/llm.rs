use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::core::config::Settings;
use crate::services::output_parser::{parse_grading_output, ParseError, ParsedGrading};
use crate::services::prompt::{build_prompt, PromptInput};

#[derive(Debug, Error)]
pub(crate) enum GenerationError {
    #[error("inference request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("inference backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("inference response had no generated text")]
    EmptyOutput,
    #[error("{0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub(crate) enum GradingError {
    #[error("LLM model not loaded")]
    ModelUnavailable,
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl GradingError {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            GradingError::ModelUnavailable => "model_unavailable",
            GradingError::Generation(_) => "generation_failure",
            GradingError::Parse(ParseError::MalformedJson(_)) => "malformed_json",
            GradingError::Parse(ParseError::MissingKeys { .. }) => "missing_schema_key",
            GradingError::Parse(ParseError::InvalidField(_)) => "invalid_field",
        }
    }
}

/// Decoding is always greedy; only the output budget is configurable.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GenerationParams {
    pub(crate) max_new_tokens: u32,
}

#[async_trait]
pub(crate) trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> Result<String, GenerationError>;
}

/// Text-completion client for an OpenAI-compatible server hosting the grading model
/// (vLLM, TGI or llama.cpp all expose `/v1/completions`).
#[derive(Debug, Clone)]
pub(crate) struct CompletionBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl CompletionBackend {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let inference = settings.inference();
        if inference.base_url.is_empty() {
            anyhow::bail!("INFERENCE_BASE_URL is not configured");
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(inference.connect_timeout_seconds))
            .build()
            .context("Failed to build inference HTTP client")?;

        Ok(Self {
            client,
            api_key: inference.api_key.clone(),
            base_url: inference.base_url.clone(),
            model: inference.model.clone(),
        })
    }

    /// Confirms the backend is reachable and serves the configured model.
    pub(crate) async fn probe(&self) -> anyhow::Result<()> {
        let response = self
            .authorized(self.client.get(format!("{}/models", self.base_url)))
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .context("Failed to reach inference backend")?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            anyhow::bail!("Inference backend returned {status}: {body}");
        }

        let served: Vec<&str> = body
            .get("data")
            .and_then(Value::as_array)
            .map(|models| {
                models.iter().filter_map(|model| model.get("id").and_then(Value::as_str)).collect()
            })
            .unwrap_or_else(Vec::new);

        if !served.is_empty() && !served.contains(&self.model.as_str()) {
            anyhow::bail!("Model {} is not served by the backend (serving: {served:?})", self.model);
        }

        Ok(())
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            request
        } else {
            request.bearer_auth(&self.api_key)
        }
    }
}

#[async_trait]
impl TextGenerator for CompletionBackend {
    async fn generate(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> Result<String, GenerationError> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "max_tokens": params.max_new_tokens,
            "temperature": 0.0,
            "top_p": 1.0,
            "stream": false,
        });

        let response = self
            .authorized(self.client.post(format!("{}/completions", self.base_url)))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status { status: status.as_u16(), body });
        }

        let body: Value = response.json().await?;
        if let Some(error) = body.get("error").filter(|error| !error.is_null()) {
            let message = error.get("message").and_then(Value::as_str).map(str::to_string);
            return Err(GenerationError::Backend(message.unwrap_or_else(|| error.to_string())));
        }

        let text = body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("text"))
            .and_then(Value::as_str)
            .ok_or(GenerationError::EmptyOutput)?;

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyOutput);
        }

        Ok(text.to_string())
    }
}

/// Process-wide handle to the grading model.
///
/// Constructed once at startup. Inference calls are serialized through an internal
/// mutex because the backing model cannot serve concurrent generations efficiently.
/// When initialization failed the handle is unavailable and every call fails fast.
#[derive(Clone)]
pub(crate) struct ModelHandle {
    inner: Option<Arc<LoadedModel>>,
    params: GenerationParams,
}

struct LoadedModel {
    generator: Box<dyn TextGenerator>,
    gate: Mutex<()>,
}

impl ModelHandle {
    pub(crate) async fn initialize(settings: &Settings) -> Self {
        let params = GenerationParams { max_new_tokens: settings.inference().max_new_tokens };
        let model = &settings.inference().model;

        let backend = match CompletionBackend::from_settings(settings) {
            Ok(backend) => backend,
            Err(err) => {
                tracing::error!(error = %err, model = %model, "Could not load LLM model; grading disabled");
                return Self::unavailable(params);
            }
        };

        if let Err(err) = backend.probe().await {
            tracing::error!(error = %err, model = %model, "Could not load LLM model; grading disabled");
            return Self::unavailable(params);
        }

        tracing::info!(model = %model, max_new_tokens = params.max_new_tokens, "LLM model ready");
        Self::from_generator(backend, params)
    }

    pub(crate) fn from_generator(
        generator: impl TextGenerator + 'static,
        params: GenerationParams,
    ) -> Self {
        Self {
            inner: Some(Arc::new(LoadedModel { generator: Box::new(generator), gate: Mutex::new(()) })),
            params,
        }
    }

    pub(crate) fn unavailable(params: GenerationParams) -> Self {
        Self { inner: None, params }
    }

    pub(crate) fn is_available(&self) -> bool {
        self.inner.is_some()
    }

    /// Runs one inference for the essay and returns the raw generated text.
    pub(crate) async fn generate(&self, input: &PromptInput<'_>) -> Result<String, GradingError> {
        let model = self.inner.as_ref().ok_or(GradingError::ModelUnavailable)?;
        let prompt = build_prompt(input);

        let _turn = model.gate.lock().await;
        let timer = Instant::now();
        let output = model.generator.generate(&prompt, self.params).await;
        metrics::histogram!("inference_duration_seconds").record(timer.elapsed().as_secs_f64());

        Ok(output?)
    }

    /// Inference followed by output parsing.
    pub(crate) async fn grade(&self, input: &PromptInput<'_>) -> Result<ParsedGrading, GradingError> {
        let raw = self.generate(input).await?;
        parse_grading_output(&raw).map_err(|err| {
            tracing::warn!(error = %err, raw_output = %raw, "Model output could not be parsed");
            GradingError::Parse(err)
        })
    }
}
