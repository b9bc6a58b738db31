mod parsing;
mod settings;
mod types;

pub(crate) use types::Settings;

#[cfg(test)]
pub(crate) use settings::DEFAULT_MODEL;
