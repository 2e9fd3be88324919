//! # parley-types
//!
//! Shared type definitions for the parley chat relay.
//! This crate contains the wire envelope and the collaborator traits used
//! across parley-net, parley-core and the binaries.

pub mod protocol;
pub mod store;

pub use protocol::{ChatMessage, Envelope, Exit, Presence, Response, Timestamp, User};
pub use store::{NullStore, SessionStore, StoreError};
