//! Backend services for the parley relay: configuration, session
//! persistence and filesystem paths.

pub mod config;
pub mod paths;
pub mod persistence;

pub use config::{Config, DeliveryMode};
pub use persistence::{ActiveUser, LoginRecord, SqliteStore, UserRecord};
