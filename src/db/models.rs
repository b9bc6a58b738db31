use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::SubmissionStatus;

#[derive(Debug, Clone, FromRow)]
pub(crate) struct WritingSubmission {
    pub(crate) id: i64,
    pub(crate) user_id: i64,
    pub(crate) topic_id: i64,
    #[sqlx(try_from = "String")]
    pub(crate) status: SubmissionStatus,
    pub(crate) band_score: Option<f64>,
    pub(crate) overall_feedback_json: Option<Json<serde_json::Value>>,
    pub(crate) grammar_feedback_json: Option<Json<serde_json::Value>>,
    pub(crate) raw_ai_response: Option<Json<serde_json::Value>>,
    pub(crate) processed_at: Option<PrimitiveDateTime>,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct StatsOutboxEntry {
    pub(crate) id: i64,
    pub(crate) submission_id: i64,
    pub(crate) user_id: i64,
    pub(crate) topic_id: Option<i64>,
    pub(crate) band_score: f64,
    pub(crate) topic_type: String,
    pub(crate) attempts: i32,
    pub(crate) last_error: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) last_attempt_at: Option<PrimitiveDateTime>,
    pub(crate) delivered_at: Option<PrimitiveDateTime>,
}
