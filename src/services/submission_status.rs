use serde_json::Value;
use sqlx::PgPool;
use thiserror::Error;

use crate::core::time::primitive_now_utc;
use crate::repositories::writing_submissions::{self, CompletedFields, OutboxIntent};
use crate::schemas::grading::GradingResult;

#[derive(Debug, Error)]
pub(crate) enum PersistenceError {
    #[error("submission {0} not found or already graded")]
    NoRowsAffected(i64),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to serialize grading result: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub(crate) enum TerminalUpdate<'a> {
    Completed {
        result: &'a GradingResult,
        /// The model's JSON object before normalization, stored as `raw_ai_response`.
        raw_response: &'a Value,
        topic_type: &'a str,
        /// Insert a stats outbox row alongside the status change.
        record_notification: bool,
    },
    Error,
}

impl TerminalUpdate<'_> {
    fn label(&self) -> &'static str {
        match self {
            TerminalUpdate::Completed { .. } => "COMPLETED",
            TerminalUpdate::Error => "ERROR",
        }
    }
}

/// Outcome of a terminal write. `user_id`/`topic_id` come from the stored row, never
/// from the request that started the job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct StatusUpdate {
    pub(crate) success: bool,
    pub(crate) user_id: Option<i64>,
    pub(crate) topic_id: Option<i64>,
    pub(crate) outbox_id: Option<i64>,
}

/// Writes the terminal status for a submission. Never fails; check `success`.
pub(crate) async fn update_submission_status(
    pool: &PgPool,
    submission_id: i64,
    update: TerminalUpdate<'_>,
) -> StatusUpdate {
    let status = update.label();
    match apply(pool, submission_id, update).await {
        Ok(outcome) => {
            tracing::info!(submission_id, status, "Submission status updated");
            outcome
        }
        Err(err) => {
            tracing::error!(
                submission_id,
                status,
                error = %err,
                "CRITICAL: failed to persist submission status"
            );
            metrics::counter!("submission_status_write_failures_total", "status" => status)
                .increment(1);
            StatusUpdate::default()
        }
    }
}

async fn apply(
    pool: &PgPool,
    submission_id: i64,
    update: TerminalUpdate<'_>,
) -> Result<StatusUpdate, PersistenceError> {
    let now = primitive_now_utc();

    match update {
        TerminalUpdate::Completed { result, raw_response, topic_type, record_notification } => {
            let fields = CompletedFields {
                band_score: result.band_score,
                overall_feedback: serde_json::to_value(&result.overall_analysis)?,
                grammar_feedback: serde_json::to_value(&result.grammar_errors)?,
                raw_response: raw_response.clone(),
                processed_at: now,
            };
            let outbox = record_notification.then_some(OutboxIntent { topic_type });

            let row = writing_submissions::mark_completed(pool, submission_id, fields, outbox)
                .await?
                .ok_or(PersistenceError::NoRowsAffected(submission_id))?;

            Ok(StatusUpdate {
                success: true,
                user_id: Some(row.user_id),
                topic_id: Some(row.topic_id),
                outbox_id: row.outbox_id,
            })
        }
        TerminalUpdate::Error => {
            let affected = writing_submissions::mark_error(pool, submission_id, now).await?;
            if affected == 0 {
                return Err(PersistenceError::NoRowsAffected(submission_id));
            }
            Ok(StatusUpdate { success: true, ..StatusUpdate::default() })
        }
    }
}
