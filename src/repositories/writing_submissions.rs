use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::WritingSubmission;
use crate::db::types::SubmissionStatus;
use crate::repositories::stats_outbox::{self, NewOutboxEntry};

/// The table is created by Prisma, so ids are `INTEGER` and status is a quoted enum type.
pub(crate) const COLUMNS: &str = "\
    id::bigint AS id, user_id::bigint AS user_id, topic_id::bigint AS topic_id, \
    status::text AS status, band_score, overall_feedback_json, grammar_feedback_json, \
    raw_ai_response, processed_at";

/// Terminal labels; writes only land on rows that are not in one of these yet.
const TERMINAL_LABELS: &[&str] = &["COMPLETED", "ERROR"];

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: i64,
) -> Result<Option<WritingSubmission>, sqlx::Error> {
    sqlx::query_as::<_, WritingSubmission>(&format!(
        "SELECT {COLUMNS} FROM \"WritingSubmissions\" WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) struct CompletedFields {
    pub(crate) band_score: f64,
    pub(crate) overall_feedback: Value,
    pub(crate) grammar_feedback: Value,
    pub(crate) raw_response: Value,
    pub(crate) processed_at: PrimitiveDateTime,
}

/// Outbox data that is only known to the caller; ids come from the updated row.
pub(crate) struct OutboxIntent<'a> {
    pub(crate) topic_type: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CompletedRow {
    pub(crate) user_id: i64,
    pub(crate) topic_id: i64,
    pub(crate) outbox_id: Option<i64>,
}

/// Writes the graded fields and flips a non-terminal row to COMPLETED.
///
/// Returns `None` when no non-terminal row with this id exists. When `outbox` is given the
/// notification row is inserted in the same transaction.
pub(crate) async fn mark_completed(
    pool: &PgPool,
    id: i64,
    fields: CompletedFields,
    outbox: Option<OutboxIntent<'_>>,
) -> Result<Option<CompletedRow>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let ids = sqlx::query_as::<_, (i64, i64)>(
        "UPDATE \"WritingSubmissions\"
         SET status = $2::\"SubmissionStatus\",
             band_score = $3,
             overall_feedback_json = $4,
             grammar_feedback_json = $5,
             raw_ai_response = $6,
             processed_at = $7
         WHERE id = $1 AND status::text <> ALL($8)
         RETURNING user_id::bigint, topic_id::bigint",
    )
    .bind(id)
    .bind(SubmissionStatus::Completed.as_str())
    .bind(fields.band_score)
    .bind(Json(&fields.overall_feedback))
    .bind(Json(&fields.grammar_feedback))
    .bind(Json(&fields.raw_response))
    .bind(fields.processed_at)
    .bind(TERMINAL_LABELS)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((user_id, topic_id)) = ids else {
        tx.rollback().await?;
        return Ok(None);
    };

    let outbox_id = match outbox {
        Some(intent) => Some(
            stats_outbox::insert(
                &mut tx,
                NewOutboxEntry {
                    submission_id: id,
                    user_id,
                    topic_id: Some(topic_id),
                    band_score: fields.band_score,
                    topic_type: intent.topic_type,
                    created_at: fields.processed_at,
                },
            )
            .await?,
        ),
        None => None,
    };

    tx.commit().await?;

    Ok(Some(CompletedRow { user_id, topic_id, outbox_id }))
}

/// Flips a non-terminal row to ERROR. Returns the number of rows changed.
pub(crate) async fn mark_error(
    pool: &PgPool,
    id: i64,
    processed_at: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE \"WritingSubmissions\"
         SET status = $2::\"SubmissionStatus\",
             processed_at = $3
         WHERE id = $1 AND status::text <> ALL($4)",
    )
    .bind(id)
    .bind(SubmissionStatus::Error.as_str())
    .bind(processed_at)
    .bind(TERMINAL_LABELS)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
