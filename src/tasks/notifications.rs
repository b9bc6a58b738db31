use anyhow::{Context, Result};
use time::Duration;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::StatsOutboxEntry;
use crate::repositories::stats_outbox::{self, ClaimDueParams};
use crate::services::stats_notifier::{Delivery, StatsUpdatePayload};

const SWEEP_BATCH_SIZE: i64 = 50;

/// Immediate dispatch right after a submission is completed.
pub(crate) async fn dispatch_entry(state: &AppState, outbox_id: i64) {
    match stats_outbox::claim_by_id(state.db(), outbox_id, primitive_now_utc()).await {
        Ok(Some(entry)) => deliver(state, &entry).await,
        Ok(None) => {}
        Err(err) => {
            tracing::error!(outbox_id, error = %err, "Failed to claim stats outbox entry");
        }
    }
}

/// Retries undelivered outbox rows that are older than one sweep interval.
pub(crate) async fn sweep_outbox(state: &AppState) -> Result<usize> {
    let stats = state.settings().stats();
    let now = primitive_now_utc();
    let interval = Duration::seconds(i64::try_from(stats.sweep_interval_seconds).unwrap_or(i64::MAX));

    let entries = stats_outbox::claim_due(
        state.db(),
        ClaimDueParams {
            cutoff: now.saturating_sub(interval),
            max_attempts: i32::try_from(stats.max_attempts).unwrap_or(i32::MAX),
            limit: SWEEP_BATCH_SIZE,
            now,
        },
    )
    .await
    .context("Failed to claim due stats outbox entries")?;

    for entry in &entries {
        deliver(state, entry).await;
    }

    Ok(entries.len())
}

async fn deliver(state: &AppState, entry: &StatsOutboxEntry) {
    let payload = StatsUpdatePayload::from(entry);

    match state.notifier().send(&payload).await {
        Ok(Delivery::Delivered) => {
            metrics::counter!("stats_notifications_total", "status" => "delivered").increment(1);
            if let Err(err) =
                stats_outbox::mark_delivered(state.db(), entry.id, primitive_now_utc()).await
            {
                tracing::error!(outbox_id = entry.id, error = %err, "Failed to mark stats outbox entry delivered");
            }
        }
        Ok(Delivery::Skipped) => {
            metrics::counter!("stats_notifications_total", "status" => "skipped").increment(1);
        }
        Err(err) => {
            metrics::counter!("stats_notifications_total", "status" => "failed").increment(1);
            let attempts = stats_outbox::record_failure(state.db(), entry.id, &err.to_string())
                .await
                .unwrap_or(entry.attempts + 1);
            tracing::warn!(
                outbox_id = entry.id,
                submission_id = entry.submission_id,
                attempts,
                error = %err,
                "Stats notification failed"
            );
        }
    }
}
