pub mod create_broker_user;
pub mod create_db_user;
pub mod drop_db_collections;
