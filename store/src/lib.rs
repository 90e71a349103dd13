pub mod db;
pub mod error;
pub mod memory;
pub mod repository;
pub mod schema;
pub mod sqlite;

pub use db::Db;
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use repository::{Store, TokenConsumeResult};
pub use sqlite::SqliteStore;
