use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::core::state::AppState;
use crate::tasks::grading;
use crate::tasks::notifications;
use crate::tasks::queue::JobReceiver;

/// Grading workers plus the outbox sweep, all tied to one shutdown channel.
pub(crate) struct BackgroundTasks {
    shutdown_tx: watch::Sender<bool>,
    receiver: JobReceiver,
    handles: Vec<JoinHandle<()>>,
}

pub(crate) fn spawn(state: AppState, receiver: JobReceiver) -> BackgroundTasks {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = state.settings().queue().workers;

    let mut handles = Vec::with_capacity(workers + 1);
    for worker_id in 0..workers {
        handles.push(tokio::spawn(grading_worker(
            worker_id,
            state.clone(),
            receiver.clone(),
            shutdown_rx.clone(),
        )));
    }

    if state.notifier().is_enabled() {
        handles.push(tokio::spawn(outbox_sweep_loop(state.clone(), shutdown_rx.clone())));
    }

    tracing::info!(
        workers,
        queue_capacity = state.queue().capacity(),
        outbox_sweep = state.notifier().is_enabled(),
        "Background tasks started"
    );

    BackgroundTasks { shutdown_tx, receiver, handles }
}

impl BackgroundTasks {
    /// Stops taking new jobs, lets in-flight jobs finish and joins every task.
    pub(crate) async fn shutdown(self) {
        if self.shutdown_tx.send(true).is_err() {
            tracing::warn!("Failed to broadcast shutdown signal to background tasks");
        }

        for handle in self.handles {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "Background task join failed");
            }
        }

        let dropped = self.receiver.drain().await;
        if dropped > 0 {
            tracing::warn!(dropped, "Queued grading jobs dropped at shutdown; submissions keep their status");
        }
    }
}

async fn grading_worker(
    worker_id: usize,
    state: AppState,
    receiver: JobReceiver,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let job = tokio::select! {
            _ = shutdown.changed() => break,
            job = receiver.recv() => job,
        };

        let Some(job) = job else {
            break;
        };

        let submission_id = job.submission_id;
        let outcome = grading::run_job(&state, job).await;
        tracing::debug!(worker_id, submission_id, outcome = ?outcome, "Grading job finished");
    }

    tracing::debug!(worker_id, "Grading worker stopped");
}

async fn outbox_sweep_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let period = Duration::from_secs(state.settings().stats().sweep_interval_seconds.max(1));
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                match notifications::sweep_outbox(&state).await {
                    Ok(0) => {}
                    Ok(retried) => tracing::info!(retried, "Stats outbox sweep finished"),
                    Err(err) => tracing::error!(error = %err, "Stats outbox sweep failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::SubmissionStatus;
    use crate::repositories::writing_submissions;
    use crate::services::llm::ModelHandle;
    use crate::services::mock_generator::{sample_output, MockGenerator};
    use crate::tasks::queue::GradingJob;
    use crate::test_support;

    fn job(submission_id: i64, content: &str) -> GradingJob {
        GradingJob {
            submission_id,
            content: content.to_string(),
            topic_type: "Task1".to_string(),
            topic_text: "The chart shows energy use.".to_string(),
            user_id: 1,
            topic_id: 1,
            sample_answer: Some("Energy use rose steadily.".to_string()),
        }
    }

    #[tokio::test]
    async fn workers_drain_queue_to_terminal_status() {
        let generator = MockGenerator::keyed(vec![
            ("Alpha essay", sample_output(4.5)),
            ("Beta essay", sample_output(7.0)),
        ]);
        let model = ModelHandle::from_generator(generator, test_support::TEST_PARAMS);
        let ctx = test_support::setup_test_context_with(model, None).await;
        let alpha = test_support::insert_submission(ctx.state.db(), 1, 1, "Alpha essay").await;
        let beta = test_support::insert_submission(ctx.state.db(), 2, 2, "Beta essay").await;

        let background = spawn(ctx.state.clone(), ctx.receiver.clone());
        ctx.state.queue().try_enqueue(job(alpha, "Alpha essay")).unwrap();
        ctx.state.queue().try_enqueue(job(beta, "Beta essay")).unwrap();

        let mut finished = Vec::new();
        for _ in 0..100 {
            finished.clear();
            for id in [alpha, beta] {
                let row = writing_submissions::find_by_id(ctx.state.db(), id).await.unwrap();
                if let Some(row) = row.filter(|row| row.status == SubmissionStatus::Completed) {
                    finished.push(row.band_score);
                }
            }
            if finished.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        background.shutdown().await;

        assert_eq!(finished, vec![Some(4.5), Some(7.0)]);
    }

    #[tokio::test]
    async fn shutdown_stops_idle_workers() {
        let model = ModelHandle::unavailable(test_support::TEST_PARAMS);
        let ctx = test_support::setup_test_context_with(model, None).await;

        let background = spawn(ctx.state.clone(), ctx.receiver.clone());
        tokio::time::timeout(Duration::from_secs(5), background.shutdown())
            .await
            .expect("workers stop promptly");
    }
}
