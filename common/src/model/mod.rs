pub mod batch;
pub mod callback;
pub mod experiment;
pub mod node;
pub mod red;
pub mod user;

pub use batch::{Batch, BatchState, HistoryEntry, parse_failure_reason};
pub use callback::{CallbackPayload, CallbackPhase, CallbackResultState, CallbackToken};
pub use experiment::Experiment;
pub use node::{Gpu, Hardware, Node, NodeLiveness};
pub use red::{ConnectorSpec, Connectable, ContainerSettings, ExecutionSettings, RedBatch, RedDocument};
pub use user::{BlockEntry, User};
