use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchdError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<std::io::Error> for FetchdError {
    fn from(err: std::io::Error) -> Self {
        FetchdError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for FetchdError {
    fn from(err: serde_json::Error) -> Self {
        FetchdError::Storage(err.to_string())
    }
}

impl From<uuid::Error> for FetchdError {
    fn from(err: uuid::Error) -> Self {
        FetchdError::NotFound(format!("Invalid job id: {}", err))
    }
}
