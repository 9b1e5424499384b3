use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed network config: {0}")]
    Malformed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid install configuration: {0}")]
    Configuration(String),

    #[error("failed to render kubeconfig: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to render network config: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<consul_cni_config::Error> for Error {
    fn from(err: consul_cni_config::Error) -> Self {
        match err {
            consul_cni_config::Error::Malformed(e) => Self::Malformed(e),
            consul_cni_config::Error::Configuration(e) => Self::Configuration(e),
            consul_cni_config::Error::Json(e) => Self::Json(e),
        }
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Self::Io(err.error)
    }
}
