use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::core::metrics;
use crate::core::state::AppState;
use crate::core::time::{format_primitive, primitive_now_utc};
use crate::repositories;
use crate::schemas::{HealthResponse, RootResponse};

pub(crate) async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        message: "Writing grader AI service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.settings().inference().model.clone(),
    })
}

pub(crate) async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut status = "healthy";
    let mut components = BTreeMap::new();

    match repositories::health::ping(state.db()).await {
        Ok(latency) => {
            components
                .insert("database".to_string(), format!("healthy ({} ms)", latency.as_millis()));
        }
        Err(err) => {
            components.insert("database".to_string(), format!("unhealthy: {err}"));
            status = "unhealthy";
        }
    }

    if state.model().is_available() {
        components.insert("model".to_string(), "loaded".to_string());
    } else {
        components.insert("model".to_string(), "unavailable".to_string());
        if status == "healthy" {
            status = "degraded";
        }
    }

    let notifier = if state.notifier().is_enabled() { "enabled" } else { "disabled" };
    components.insert("stats_notifier".to_string(), notifier.to_string());

    Json(HealthResponse {
        service: "writing-grader".to_string(),
        status: status.to_string(),
        components,
        queue_depth: state.queue().depth(),
        queue_capacity: state.queue().capacity(),
        checked_at: format_primitive(primitive_now_utc()),
    })
}

pub(crate) async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    if !state.settings().telemetry().prometheus_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    match metrics::render() {
        Some(body) => ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
            .into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}
