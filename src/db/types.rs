use std::fmt;

/// Mirrors the `"SubmissionStatus"` Postgres enum owned by the backend schema.
///
/// Values are bound as text and cast in SQL (`$1::"SubmissionStatus"`), because the
/// type name is case-sensitive and cannot be resolved from an unquoted lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubmissionStatus {
    Pending,
    Submitted,
    Processing,
    Completed,
    Error,
}

impl SubmissionStatus {
    pub(crate) const TERMINAL: [SubmissionStatus; 2] =
        [SubmissionStatus::Completed, SubmissionStatus::Error];

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "PENDING",
            SubmissionStatus::Submitted => "SUBMITTED",
            SubmissionStatus::Processing => "PROCESSING",
            SubmissionStatus::Completed => "COMPLETED",
            SubmissionStatus::Error => "ERROR",
        }
    }

    pub(crate) fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }
}

/// Labels this service does not know are treated as still in flight.
impl From<String> for SubmissionStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "PENDING" => SubmissionStatus::Pending,
            "SUBMITTED" => SubmissionStatus::Submitted,
            "COMPLETED" => SubmissionStatus::Completed,
            "ERROR" => SubmissionStatus::Error,
            _ => SubmissionStatus::Processing,
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
