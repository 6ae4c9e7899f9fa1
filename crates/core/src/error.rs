/// Result alias that carries the custom [`StepscoreError`] type.
pub type Result<T> = std::result::Result<T, StepscoreError>;

/// Error type for the fallible edges of the core crate.
///
/// Editing operations on the pattern store never fail; they coerce or clamp
/// their input instead. Errors only surface where outside data enters the
/// system: configuration, loose grid notation and IO performed by callers.
#[derive(Debug, thiserror::Error)]
pub enum StepscoreError {
    /// Free-form message for callers that have nothing more structured to say.
    #[error("{0}")]
    Message(String),
    /// A JSON document (configuration or pattern) could not be parsed.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A grid written in compact notation contained an unknown symbol.
    #[error("invalid step symbol `{symbol}` at position {position}")]
    InvalidStep { symbol: char, position: usize },
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl StepscoreError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for StepscoreError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for StepscoreError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
