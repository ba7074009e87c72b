use shared::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("network error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("packet encoding failed: {0}")]
    Codec(#[from] bincode::Error),
    #[error("invalid bind address {0:?}")]
    InvalidAddress(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;
