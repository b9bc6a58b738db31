use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::schemas::grade::{GradeAccepted, GradeRequest, MISSING_FIELDS_MESSAGE};
use crate::tasks::queue::EnqueueError;

/// Accepts a grading request and hands it to the worker pool without waiting.
pub(crate) async fn grade(
    State(state): State<AppState>,
    payload: Result<Json<GradeRequest>, JsonRejection>,
) -> Result<Json<GradeAccepted>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected grade request body");
        ApiError::BadRequest(MISSING_FIELDS_MESSAGE.to_string())
    })?;

    if let Err(errors) = request.validate() {
        let fields: Vec<String> = errors.field_errors().keys().map(|field| field.to_string()).collect();
        tracing::debug!(?fields, "Grade request failed validation");
        return Err(ApiError::BadRequest(MISSING_FIELDS_MESSAGE.to_string()));
    }

    let job = request
        .into_job()
        .ok_or_else(|| ApiError::BadRequest(MISSING_FIELDS_MESSAGE.to_string()))?;
    let submission_id = job.submission_id;

    match state.queue().try_enqueue(job) {
        Ok(()) => {
            tracing::info!(submission_id, "Grading job queued");
            Ok(Json(GradeAccepted::for_submission(submission_id)))
        }
        Err(EnqueueError::Full) => {
            metrics::counter!("grading_jobs_rejected_total", "reason" => "queue_full").increment(1);
            Err(ApiError::ServiceUnavailable(
                "Grading queue is full; retry later".to_string(),
            ))
        }
        Err(EnqueueError::Closed) => {
            metrics::counter!("grading_jobs_rejected_total", "reason" => "shutting_down")
                .increment(1);
            Err(ApiError::ServiceUnavailable("Grading service is shutting down".to_string()))
        }
    }
}
