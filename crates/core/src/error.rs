use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("required field '{0}' is missing or empty")]
    MissingField(&'static str),

    #[error("unknown {kind} '{value}'")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),
}
