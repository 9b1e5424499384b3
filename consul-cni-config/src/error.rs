use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("malformed network config: {0}")]
    Malformed(String),

    #[error("invalid plugin configuration: {0}")]
    Configuration(String),
}
