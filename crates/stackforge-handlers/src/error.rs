use thiserror::Error;

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Object store error: {0}")]
    Store(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Missing environment variable: {0}")]
    MissingEnv(String),

    #[error("Runtime API error: {0}")]
    Runtime(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<redis::RedisError> for HandlerError {
    fn from(err: redis::RedisError) -> Self {
        HandlerError::Cache(err.to_string())
    }
}

impl From<reqwest::Error> for HandlerError {
    fn from(err: reqwest::Error) -> Self {
        HandlerError::Runtime(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HandlerError>;
