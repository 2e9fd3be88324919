//! Shared pieces of the `parley-server` and `parley-client` binaries.

pub mod chat;
pub mod console;
pub mod logging;
pub mod relay;
