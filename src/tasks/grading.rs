use std::time::Instant;

use crate::core::state::AppState;
use crate::repositories::writing_submissions;
use crate::services::output_parser::ParsedGrading;
use crate::services::submission_status::{update_submission_status, TerminalUpdate};
use crate::tasks::notifications;
use crate::tasks::queue::GradingJob;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobOutcome {
    Completed,
    /// Grading failed and the submission was (best-effort) marked ERROR.
    Failed,
    /// Grading succeeded but the COMPLETED write did not land.
    PersistFailed,
    /// The submission is missing or already terminal.
    Skipped,
}

impl JobOutcome {
    fn as_str(self) -> &'static str {
        match self {
            JobOutcome::Completed => "completed",
            JobOutcome::Failed => "failed",
            JobOutcome::PersistFailed => "persist_failed",
            JobOutcome::Skipped => "skipped",
        }
    }
}

/// Runs one grading job to a terminal state. Errors never escape this boundary.
pub(crate) async fn run_job(state: &AppState, job: GradingJob) -> JobOutcome {
    let started = Instant::now();
    let outcome = grade(state, &job).await;

    metrics::counter!("grading_jobs_total", "status" => outcome.as_str()).increment(1);
    metrics::histogram!("grading_job_duration_seconds", "status" => outcome.as_str())
        .record(started.elapsed().as_secs_f64());

    outcome
}

async fn grade(state: &AppState, job: &GradingJob) -> JobOutcome {
    let submission_id = job.submission_id;

    match writing_submissions::find_by_id(state.db(), submission_id).await {
        Ok(Some(row)) if row.status.is_terminal() => {
            tracing::info!(submission_id, status = %row.status, "Submission already graded; skipping");
            return JobOutcome::Skipped;
        }
        Ok(Some(row)) => {
            if row.user_id != job.user_id || row.topic_id != job.topic_id {
                tracing::warn!(
                    submission_id,
                    request_user_id = job.user_id,
                    stored_user_id = row.user_id,
                    request_topic_id = job.topic_id,
                    stored_topic_id = row.topic_id,
                    "Request ids differ from the stored submission; stored ids are used"
                );
            }
        }
        Ok(None) => {
            tracing::warn!(submission_id, "Submission not found; skipping grading");
            return JobOutcome::Skipped;
        }
        Err(err) => {
            tracing::warn!(submission_id, error = %err, "Could not read submission; grading anyway");
        }
    }

    tracing::info!(submission_id, topic_type = %job.topic_type, "Grading submission");

    let ParsedGrading { mut result, raw } = match state.model().grade(&job.prompt_input()).await {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::error!(
                submission_id,
                error = %err,
                reason = err.kind(),
                "AI grading failed"
            );
            metrics::counter!("grading_failures_total", "reason" => err.kind()).increment(1);
            update_submission_status(state.db(), submission_id, TerminalUpdate::Error).await;
            return JobOutcome::Failed;
        }
    };
    result.normalize(&job.content);

    let update = update_submission_status(
        state.db(),
        submission_id,
        TerminalUpdate::Completed {
            result: &result,
            raw_response: &raw,
            topic_type: &job.topic_type,
            record_notification: state.notifier().is_enabled(),
        },
    )
    .await;

    if !update.success {
        return JobOutcome::PersistFailed;
    }

    tracing::info!(submission_id, band_score = result.band_score, "Submission graded");

    if let Some(outbox_id) = update.outbox_id {
        let state = state.clone();
        tokio::spawn(async move {
            notifications::dispatch_entry(&state, outbox_id).await;
        });
    }

    JobOutcome::Completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::db::types::SubmissionStatus;
    use crate::services::llm::ModelHandle;
    use crate::services::mock_generator::{sample_json, sample_output, MockGenerator};
    use crate::test_support;

    fn job(submission_id: i64, content: &str) -> GradingJob {
        GradingJob {
            submission_id,
            content: content.to_string(),
            topic_type: "Task2".to_string(),
            topic_text: "Some people think technology isolates us.".to_string(),
            user_id: 0,
            topic_id: 0,
            sample_answer: None,
        }
    }

    async fn stored_status(state: &AppState, id: i64) -> (SubmissionStatus, Option<f64>) {
        let row = writing_submissions::find_by_id(state.db(), id).await.unwrap().expect("row");
        (row.status, row.band_score)
    }

    #[tokio::test]
    async fn successful_job_completes_submission() {
        let model = ModelHandle::from_generator(
            MockGenerator::always(sample_output(6.3)),
            test_support::TEST_PARAMS,
        );
        let ctx = test_support::setup_test_context_with(model, None).await;
        let id = test_support::insert_submission(ctx.state.db(), 11, 2, "Technology connects people.").await;

        let outcome = run_job(&ctx.state, job(id, "Technology connects people.")).await;

        assert_eq!(outcome, JobOutcome::Completed);
        assert_eq!(stored_status(&ctx.state, id).await, (SubmissionStatus::Completed, Some(6.5)));
    }

    #[tokio::test]
    async fn processing_submission_is_graded_and_raw_output_kept() {
        let mut output = sample_json(7.2);
        output["word_count"] = serde_json::json!(260);
        let model = ModelHandle::from_generator(
            MockGenerator::always(format!("Here you go: {output}")),
            test_support::TEST_PARAMS,
        );
        let ctx = test_support::setup_test_context_with(model, None).await;
        let id = test_support::insert_submission(ctx.state.db(), 4, 4, "Essay").await;
        test_support::set_status(ctx.state.db(), id, "PROCESSING").await;

        assert_eq!(run_job(&ctx.state, job(id, "Essay")).await, JobOutcome::Completed);

        let row = writing_submissions::find_by_id(ctx.state.db(), id).await.unwrap().expect("row");
        assert_eq!(row.status, SubmissionStatus::Completed);
        assert_eq!(row.band_score, Some(7.0));
        let raw = row.raw_ai_response.expect("raw response").0;
        assert_eq!(raw, output);
        assert_eq!(raw["band_score"], 7.2);
        assert_eq!(raw["word_count"], 260);
    }

    #[tokio::test]
    async fn model_failure_marks_submission_error() {
        let model = ModelHandle::from_generator(
            MockGenerator::failing("CUDA out of memory"),
            test_support::TEST_PARAMS,
        );
        let ctx = test_support::setup_test_context_with(model, None).await;
        let id = test_support::insert_submission(ctx.state.db(), 1, 1, "Essay").await;

        assert_eq!(run_job(&ctx.state, job(id, "Essay")).await, JobOutcome::Failed);
        assert_eq!(stored_status(&ctx.state, id).await, (SubmissionStatus::Error, None));
    }

    #[tokio::test]
    async fn unparseable_output_marks_submission_error() {
        let model = ModelHandle::from_generator(
            MockGenerator::always("I cannot grade this."),
            test_support::TEST_PARAMS,
        );
        let ctx = test_support::setup_test_context_with(model, None).await;
        let id = test_support::insert_submission(ctx.state.db(), 1, 1, "Essay").await;

        assert_eq!(run_job(&ctx.state, job(id, "Essay")).await, JobOutcome::Failed);
        assert_eq!(stored_status(&ctx.state, id).await.0, SubmissionStatus::Error);
    }

    #[tokio::test]
    async fn terminal_submission_is_skipped_before_inference() {
        let generator = MockGenerator::always(sample_output(5.0));
        let model = ModelHandle::from_generator(generator.clone(), test_support::TEST_PARAMS);
        let ctx = test_support::setup_test_context_with(model, None).await;
        let id = test_support::insert_submission(ctx.state.db(), 1, 1, "Essay").await;

        assert_eq!(run_job(&ctx.state, job(id, "Essay")).await, JobOutcome::Completed);
        assert_eq!(run_job(&ctx.state, job(id, "Essay")).await, JobOutcome::Skipped);
        assert_eq!(run_job(&ctx.state, job(424_242, "Essay")).await, JobOutcome::Skipped);
        assert_eq!(generator.prompts().len(), 1);
    }

    #[tokio::test]
    async fn unreachable_stats_service_leaves_submission_completed() {
        let model = ModelHandle::from_generator(
            MockGenerator::always(sample_output(7.5)),
            test_support::TEST_PARAMS,
        );
        let ctx = test_support::setup_test_context_with(model, Some("http://127.0.0.1:1")).await;
        let id = test_support::insert_submission(ctx.state.db(), 3, 9, "Essay").await;

        assert_eq!(run_job(&ctx.state, job(id, "Essay")).await, JobOutcome::Completed);

        let mut attempts = 0;
        for _ in 0..50 {
            attempts = sqlx::query_scalar::<_, i32>(
                "SELECT attempts FROM stats_outbox WHERE submission_id = $1",
            )
            .bind(id)
            .fetch_one(ctx.state.db())
            .await
            .unwrap();
            if attempts > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        assert_eq!(attempts, 1);
        assert_eq!(stored_status(&ctx.state, id).await, (SubmissionStatus::Completed, Some(7.5)));
    }

    #[tokio::test]
    async fn concurrent_jobs_keep_their_own_scores() {
        let generator = MockGenerator::keyed(vec![
            ("First essay", sample_output(5.5)),
            ("Second essay", sample_output(8.0)),
        ])
        .with_delay(Duration::from_millis(20));
        let model = ModelHandle::from_generator(generator, test_support::TEST_PARAMS);
        let ctx = test_support::setup_test_context_with(model, None).await;
        let first = test_support::insert_submission(ctx.state.db(), 1, 1, "First essay").await;
        let second = test_support::insert_submission(ctx.state.db(), 2, 2, "Second essay").await;

        let (a, b) = tokio::join!(
            run_job(&ctx.state, job(first, "First essay")),
            run_job(&ctx.state, job(second, "Second essay"))
        );
        assert_eq!((a, b), (JobOutcome::Completed, JobOutcome::Completed));

        assert_eq!(stored_status(&ctx.state, first).await, (SubmissionStatus::Completed, Some(5.5)));
        assert_eq!(stored_status(&ctx.state, second).await, (SubmissionStatus::Completed, Some(8.0)));
    }
}
