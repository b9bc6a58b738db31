pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use anyhow::Context;

use crate::core::{config::Settings, state::AppState, telemetry};
use crate::services::llm::ModelHandle;
use crate::services::stats_notifier::StatsNotifier;
use crate::tasks::queue::GradingQueue;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await.context("Failed to connect to PostgreSQL")?;
    if settings.database().run_migrations {
        db::run_migrations(&db_pool).await.context("Failed to run migrations")?;
    }

    let model = ModelHandle::initialize(&settings).await;
    let notifier = StatsNotifier::from_settings(&settings)?;
    let (queue, receiver) = GradingQueue::new(settings.queue().capacity);

    let state = AppState::new(settings, db_pool, model, notifier, queue);
    let background = tasks::scheduler::spawn(state.clone(), receiver);

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        model_loaded = state.model().is_available(),
        "Writing grader listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await;

    background.shutdown().await;
    state.db().close().await;
    tracing::info!("Background tasks stopped");

    result?;

    Ok(())
}
