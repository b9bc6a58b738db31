use std::time::{Duration, Instant};

use sqlx::PgPool;

/// Round-trips a trivial query and returns how long it took.
pub(crate) async fn ping(pool: &PgPool) -> Result<Duration, sqlx::Error> {
    let started = Instant::now();
    sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await?;
    Ok(started.elapsed())
}
