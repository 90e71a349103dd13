use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("backend error: {0}")]
    Backend(#[from] sqlx::Error),
    #[error("row decode error: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
