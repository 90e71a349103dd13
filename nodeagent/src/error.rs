use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeAgentError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed agent response: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, NodeAgentError>;
