use std::collections::BTreeMap;

use serde::Serialize;

pub(crate) mod grade;
pub(crate) mod grading;

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) service: String,
    pub(crate) status: String,
    pub(crate) components: BTreeMap<String, String>,
    pub(crate) queue_depth: usize,
    pub(crate) queue_capacity: usize,
    pub(crate) checked_at: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct RootResponse {
    pub(crate) message: String,
    pub(crate) version: String,
    pub(crate) model: String,
}
