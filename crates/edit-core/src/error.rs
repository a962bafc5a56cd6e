use thiserror::Error;

/// Caller misuse of a format descriptor. Runtime mismatches are never errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("format descriptor has an empty tag")]
    EmptyTag,
    #[error("list format has an empty item tag")]
    EmptyItemTag,
    #[error("style format declares no style properties")]
    NoStyles,
    #[error("templated format needs a value to wrap")]
    MissingValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    Unknown(String),
    #[error("Duplicate command id: {0}")]
    Duplicate(String),
    #[error("Invalid arguments for {id}: {reason}")]
    InvalidArgs { id: String, reason: String },
    #[error(transparent)]
    Format(#[from] FormatError),
}

impl CommandError {
    pub fn invalid_args(id: impl Into<String>, reason: impl Into<String>) -> Self {
        CommandError::InvalidArgs {
            id: id.into(),
            reason: reason.into(),
        }
    }
}
