use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

use crate::services::prompt::PromptInput;

/// One accepted `/grade` request.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GradingJob {
    pub(crate) submission_id: i64,
    pub(crate) content: String,
    pub(crate) topic_type: String,
    pub(crate) topic_text: String,
    pub(crate) user_id: i64,
    pub(crate) topic_id: i64,
    pub(crate) sample_answer: Option<String>,
}

impl GradingJob {
    pub(crate) fn prompt_input(&self) -> PromptInput<'_> {
        PromptInput {
            topic_text: &self.topic_text,
            content: &self.content,
            topic_type: &self.topic_type,
            sample_answer: self.sample_answer.as_deref(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum EnqueueError {
    #[error("grading queue is full")]
    Full,
    #[error("grading queue is closed")]
    Closed,
}

/// Producer side of the bounded grading queue.
#[derive(Debug, Clone)]
pub(crate) struct GradingQueue {
    sender: mpsc::Sender<GradingJob>,
    capacity: usize,
}

/// Consumer side, shared by every worker.
#[derive(Debug, Clone)]
pub(crate) struct JobReceiver {
    inner: Arc<Mutex<mpsc::Receiver<GradingJob>>>,
}

impl GradingQueue {
    pub(crate) fn new(capacity: usize) -> (Self, JobReceiver) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender, capacity }, JobReceiver { inner: Arc::new(Mutex::new(receiver)) })
    }

    /// Never waits: a full queue is reported so the caller can shed load.
    pub(crate) fn try_enqueue(&self, job: GradingJob) -> Result<(), EnqueueError> {
        match self.sender.try_send(job) {
            Ok(()) => {
                metrics::gauge!("grading_queue_depth").increment(1.0);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(EnqueueError::Full),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(EnqueueError::Closed),
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.capacity - self.sender.capacity()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}

impl JobReceiver {
    pub(crate) async fn recv(&self) -> Option<GradingJob> {
        let job = self.inner.lock().await.recv().await;
        if job.is_some() {
            metrics::gauge!("grading_queue_depth").decrement(1.0);
        }
        job
    }

    /// Drops whatever is still queued and returns how many jobs were discarded.
    pub(crate) async fn drain(&self) -> usize {
        let mut receiver = self.inner.lock().await;
        receiver.close();
        let mut dropped = 0;
        while receiver.try_recv().is_ok() {
            dropped += 1;
        }
        metrics::gauge!("grading_queue_depth").decrement(dropped as f64);
        dropped
    }
}
