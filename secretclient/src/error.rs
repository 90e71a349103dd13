use thiserror::Error;

#[derive(Error, Debug)]
pub enum SecretError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("keys already exist: {0:?}")]
    KeysExist(Vec<String>),

    #[error("keys missing: {0:?}")]
    KeysMissing(Vec<String>),

    #[error("trustee rejected request: {0}")]
    Rejected(String),
}

impl SecretError {
    /// Mirrors the trustee's own `disable_retry` flag (spec §4.4):
    /// a conflicting write or a missing read is not worth retrying, a
    /// transport failure is.
    pub fn disable_retry(&self) -> bool {
        match self {
            SecretError::Http(_) => false,
            SecretError::KeysExist(_) => true,
            SecretError::KeysMissing(_) => true,
            SecretError::Rejected(_) => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, SecretError>;
