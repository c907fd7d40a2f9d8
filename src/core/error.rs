use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Archive format error: {0}")]
    Format(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Remote block source error: {0}")]
    Remote(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("No provider registered for type '{0}'")]
    UnknownProvider(String),

    #[error("Pipeline stopped after fatal error: {0}")]
    PipelineFault(String),

    #[error("Loader is not started")]
    NotStarted,
}

impl From<reqwest::Error> for LoaderError {
    fn from(err: reqwest::Error) -> Self {
        LoaderError::Remote(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LoaderError>;

/// Failure of a single record inside a provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransformError {
    pub message: String,
}

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        TransformError {
            message: message.into(),
        }
    }
}
