pub(crate) mod errors;
pub(crate) mod grade;
pub(crate) mod handlers;
pub(crate) mod router;
