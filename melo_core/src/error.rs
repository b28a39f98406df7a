use thiserror::Error;

/// Errors raised while planning, decoding and stitching a sentence.
#[derive(Debug, Error)]
pub enum SynthError {
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("empty input: {0}")]
    EmptyInput(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("decoder returned {actual} samples, expected {expected}")]
    DecoderOutput { expected: usize, actual: usize },

    /// Failure inside the frontend, encoder or decoder. Passed through untouched.
    #[error(transparent)]
    Model(#[from] anyhow::Error),

    #[error("wav encoding error: {0}")]
    Wav(#[from] hound::Error),
}

impl SynthError {
    pub(crate) fn shape(message: impl Into<String>) -> Self {
        Self::ShapeMismatch(message.into())
    }

    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// True when the error was caused by the caller's input rather than a model or I/O failure.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::ShapeMismatch(_) | Self::EmptyInput(_) | Self::InvalidConfig(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SynthError>;
