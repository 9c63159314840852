use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid entity id: {0:?}")]
    InvalidQid(String),

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("unknown bucket: {0:?}")]
    UnknownBucket(String),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
