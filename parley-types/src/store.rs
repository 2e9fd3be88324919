//! Session bookkeeping abstraction.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;

/// Failure reported by a session store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session store backend: {0}")]
    Backend(String),
    #[error("session store lock poisoned")]
    Poisoned,
}

/// Records logins and logouts of relay accounts.
///
/// The router calls this on registration and eviction. Implementations may
/// fail; the router logs the failure and carries on.
pub trait SessionStore {
    /// An account completed its presence handshake from `peer`.
    fn on_login(&self, account_name: &str, peer: SocketAddr) -> Result<(), StoreError>;

    /// An account's connection was closed or it sent `exit`.
    fn on_logout(&self, account_name: &str) -> Result<(), StoreError>;
}

/// Store that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

impl SessionStore for NullStore {
    fn on_login(&self, _account_name: &str, _peer: SocketAddr) -> Result<(), StoreError> {
        Ok(())
    }

    fn on_logout(&self, _account_name: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    fn on_login(&self, account_name: &str, peer: SocketAddr) -> Result<(), StoreError> {
        (**self).on_login(account_name, peer)
    }

    fn on_logout(&self, account_name: &str) -> Result<(), StoreError> {
        (**self).on_logout(account_name)
    }
}
