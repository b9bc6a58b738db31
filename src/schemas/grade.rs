use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::tasks::queue::GradingJob;

pub(crate) const MISSING_FIELDS_MESSAGE: &str =
    "Missing required fields (submission_id, content, topic_type, topic_text, user_id, topic_id)";

/// Body of `POST /grade`. Every field is optional at the serde level so that absent,
/// null and empty values all take the same validation path.
#[derive(Debug, Default, Deserialize, Validate)]
pub(crate) struct GradeRequest {
    #[validate(required, range(min = 1))]
    pub(crate) submission_id: Option<i64>,
    #[validate(required, length(min = 1))]
    pub(crate) content: Option<String>,
    #[validate(required, length(min = 1))]
    pub(crate) topic_type: Option<String>,
    #[validate(required, length(min = 1))]
    pub(crate) topic_text: Option<String>,
    #[validate(required, range(min = 1))]
    pub(crate) user_id: Option<i64>,
    #[validate(required, range(min = 1))]
    pub(crate) topic_id: Option<i64>,
    #[serde(default)]
    pub(crate) sample_answer: Option<String>,
}

impl GradeRequest {
    /// Converts a validated request into a job. Returns `None` if a required field is absent.
    pub(crate) fn into_job(self) -> Option<GradingJob> {
        Some(GradingJob {
            submission_id: self.submission_id?,
            content: self.content?,
            topic_type: self.topic_type?,
            topic_text: self.topic_text?,
            user_id: self.user_id?,
            topic_id: self.topic_id?,
            sample_answer: self.sample_answer.filter(|sample| !sample.trim().is_empty()),
        })
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct GradeAccepted {
    pub(crate) message: String,
}

impl GradeAccepted {
    pub(crate) fn for_submission(submission_id: i64) -> Self {
        Self { message: format!("Grading job initiated for submission {submission_id}") }
    }
}
