use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::StatsOutboxEntry;

pub(crate) const COLUMNS: &str = "\
    id, submission_id, user_id, topic_id, band_score, topic_type, attempts, last_error, \
    created_at, last_attempt_at, delivered_at";

// `claim_due` joins a CTE that also exposes `id`.
const QUALIFIED_COLUMNS: &str = "\
    stats_outbox.id, stats_outbox.submission_id, stats_outbox.user_id, stats_outbox.topic_id, \
    stats_outbox.band_score, stats_outbox.topic_type, stats_outbox.attempts, \
    stats_outbox.last_error, stats_outbox.created_at, stats_outbox.last_attempt_at, \
    stats_outbox.delivered_at";

pub(crate) struct NewOutboxEntry<'a> {
    pub(crate) submission_id: i64,
    pub(crate) user_id: i64,
    pub(crate) topic_id: Option<i64>,
    pub(crate) band_score: f64,
    pub(crate) topic_type: &'a str,
    pub(crate) created_at: PrimitiveDateTime,
}

pub(crate) async fn insert(
    executor: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    entry: NewOutboxEntry<'_>,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO stats_outbox (submission_id, user_id, topic_id, band_score, topic_type, created_at)
         VALUES ($1,$2,$3,$4,$5,$6)
         RETURNING id",
    )
    .bind(entry.submission_id)
    .bind(entry.user_id)
    .bind(entry.topic_id)
    .bind(entry.band_score)
    .bind(entry.topic_type)
    .bind(entry.created_at)
    .fetch_one(&mut **executor)
    .await
}

/// Stamps an undelivered row as being attempted now and returns it.
pub(crate) async fn claim_by_id(
    pool: &PgPool,
    id: i64,
    now: PrimitiveDateTime,
) -> Result<Option<StatsOutboxEntry>, sqlx::Error> {
    sqlx::query_as::<_, StatsOutboxEntry>(&format!(
        "UPDATE stats_outbox
         SET last_attempt_at = $2
         WHERE id = $1 AND delivered_at IS NULL
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(now)
    .fetch_optional(pool)
    .await
}

pub(crate) struct ClaimDueParams {
    /// Rows created or last attempted after this instant are left alone.
    pub(crate) cutoff: PrimitiveDateTime,
    pub(crate) max_attempts: i32,
    pub(crate) limit: i64,
    pub(crate) now: PrimitiveDateTime,
}

/// Claims a batch of undelivered rows for the retry sweep.
pub(crate) async fn claim_due(
    pool: &PgPool,
    params: ClaimDueParams,
) -> Result<Vec<StatsOutboxEntry>, sqlx::Error> {
    sqlx::query_as::<_, StatsOutboxEntry>(&format!(
        "WITH due AS (
            SELECT id FROM stats_outbox
            WHERE delivered_at IS NULL
              AND attempts < $2
              AND created_at <= $1
              AND (last_attempt_at IS NULL OR last_attempt_at <= $1)
            ORDER BY created_at
            FOR UPDATE SKIP LOCKED
            LIMIT $3
        )
        UPDATE stats_outbox
        SET last_attempt_at = $4
        FROM due
        WHERE stats_outbox.id = due.id
        RETURNING {QUALIFIED_COLUMNS}"
    ))
    .bind(params.cutoff)
    .bind(params.max_attempts)
    .bind(params.limit.clamp(1, 1000))
    .bind(params.now)
    .fetch_all(pool)
    .await
}

pub(crate) async fn mark_delivered(
    pool: &PgPool,
    id: i64,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE stats_outbox
         SET delivered_at = $2, attempts = attempts + 1, last_error = NULL
         WHERE id = $1",
    )
    .bind(id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn record_failure(
    pool: &PgPool,
    id: i64,
    error: &str,
) -> Result<i32, sqlx::Error> {
    sqlx::query_scalar::<_, i32>(
        "UPDATE stats_outbox
         SET attempts = attempts + 1, last_error = $2
         WHERE id = $1
         RETURNING attempts",
    )
    .bind(id)
    .bind(error)
    .fetch_one(pool)
    .await
}
