use std::time::Duration;

use anyhow::Context;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;

use crate::core::config::Settings;
use crate::db::models::StatsOutboxEntry;

/// Body of `POST {STATS_SERVICE_URL}/update-stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StatsUpdatePayload {
    pub(crate) user_id: i64,
    pub(crate) topic_id: Option<i64>,
    pub(crate) submission_id: i64,
    pub(crate) band_score: f64,
    pub(crate) topic_type: String,
}

impl From<&StatsOutboxEntry> for StatsUpdatePayload {
    fn from(entry: &StatsOutboxEntry) -> Self {
        Self {
            user_id: entry.user_id,
            topic_id: entry.topic_id,
            submission_id: entry.submission_id,
            band_score: entry.band_score,
            topic_type: entry.topic_type.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum NotificationError {
    #[error("stats request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("stats service returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    Skipped,
}

#[derive(Debug, Clone)]
pub(crate) struct StatsNotifier {
    client: Client,
    endpoint: Option<String>,
}

impl StatsNotifier {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let stats = settings.stats();
        let client = Client::builder()
            .timeout(Duration::from_secs(stats.request_timeout_seconds))
            .build()
            .context("Failed to build stats HTTP client")?;

        let endpoint = stats.service_url.as_ref().map(|base| format!("{base}/update-stats"));
        match &endpoint {
            Some(endpoint) => tracing::info!(endpoint = %endpoint, "Stats notifications enabled"),
            None => tracing::warn!("STATS_SERVICE_URL is not set; stats notifications disabled"),
        }

        Ok(Self { client, endpoint })
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    /// One best-effort POST. Callers decide what a failure means.
    pub(crate) async fn send(
        &self,
        payload: &StatsUpdatePayload,
    ) -> Result<Delivery, NotificationError> {
        let Some(endpoint) = &self.endpoint else {
            return Ok(Delivery::Skipped);
        };

        let response = self.client.post(endpoint).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Status { status: status.as_u16(), body });
        }

        tracing::info!(
            submission_id = payload.submission_id,
            user_id = payload.user_id,
            "Stats service notified"
        );
        Ok(Delivery::Delivered)
    }
}
