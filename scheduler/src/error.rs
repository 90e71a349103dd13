use thiserror::Error;

/// The Scheduler's boundary error, mirroring `backend/src/error.rs`'s flat,
/// descriptive-message `AppError`. Per spec §7, a pass-level error aborts the
/// current pass cleanly (no partial CAS left half-applied) and is retried on
/// the next trigger; it never poisons unrelated batches, which instead carry
/// their own failure reason in `history`.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("store error: {0}")]
    Store(#[from] store::StoreError),
    #[error("secret client error: {0}")]
    Secret(#[from] secretclient::SecretError),
    #[error("node agent error: {0}")]
    NodeAgent(#[from] nodeagent::NodeAgentError),
    #[error("scheduler invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
