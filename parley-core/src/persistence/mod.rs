//! SQLite bookkeeping of accounts, live sessions and login history.

pub mod schema;
mod store;

pub use store::{ActiveUser, LoginRecord, PersistenceError, SqliteStore, UserRecord};
