use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("unauthorized")]
    Unauthorized,
    /// Distinct from `Unauthorized` only in its debug string — the blocklist
    /// threshold was exceeded rather than the credentials being wrong.
    /// Callers must still surface this as a plain 401 (spec §4.1: avoid
    /// username enumeration), never a different status code or body.
    #[error("too many attempts")]
    TooManyAttempts,
    #[error("user does not exist: {0}")]
    NoSuchUser(String),
    #[error("store error: {0}")]
    Store(#[from] store::StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AuthError>;
