pub mod connection;
pub mod models;
pub mod service;

pub use connection::{get_connection, lock, with_transaction, DbPool};
pub use models::*;
pub use service::DbService;
