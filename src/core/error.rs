use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectError {
    #[error("Detection already in progress")]
    AlreadyDetecting,
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Media load failed: {0}")]
    MediaLoad(String),
    #[error("Classification failed: {0}")]
    Classification(String),
    #[error("Model load failed: {0}")]
    ModelLoad(String),
}

impl DetectError {
    /// Flattens an `anyhow` chain into a `MediaLoad` error.
    pub(crate) fn media(err: anyhow::Error) -> Self {
        DetectError::MediaLoad(format!("{:#}", err))
    }

    pub(crate) fn classification(err: anyhow::Error) -> Self {
        DetectError::Classification(format!("{:#}", err))
    }

    pub(crate) fn model_load(err: anyhow::Error) -> Self {
        DetectError::ModelLoad(format!("{:#}", err))
    }
}
