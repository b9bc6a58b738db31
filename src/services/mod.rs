pub(crate) mod llm;
pub(crate) mod output_parser;
pub(crate) mod prompt;
pub(crate) mod stats_notifier;
pub(crate) mod submission_status;

#[cfg(test)]
pub(crate) mod mock_generator;
