use std::sync::Arc;

use sqlx::PgPool;

use crate::core::config::Settings;
use crate::services::llm::ModelHandle;
use crate::services::stats_notifier::StatsNotifier;
use crate::tasks::queue::GradingQueue;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    model: ModelHandle,
    notifier: StatsNotifier,
    queue: GradingQueue,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        db: PgPool,
        model: ModelHandle,
        notifier: StatsNotifier,
        queue: GradingQueue,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, db, model, notifier, queue }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn model(&self) -> &ModelHandle {
        &self.inner.model
    }

    pub(crate) fn notifier(&self) -> &StatsNotifier {
        &self.inner.notifier
    }

    pub(crate) fn queue(&self) -> &GradingQueue {
        &self.inner.queue
    }
}
