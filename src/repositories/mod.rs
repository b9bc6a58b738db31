pub(crate) mod health;
pub(crate) mod stats_outbox;
pub(crate) mod writing_submissions;
