pub(crate) mod grading;
pub(crate) mod notifications;
pub(crate) mod queue;
pub(crate) mod scheduler;
