//! Live mapping of account names to connections.
//!
//! Owned and mutated by the router only, so no locking.

use std::collections::HashMap;

use thiserror::Error;

use crate::transport::ConnectionId;

/// The name is already bound to another connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("account name '{name}' is already registered to {holder}")]
pub struct NameTaken {
    pub name: String,
    pub holder: ConnectionId,
}

/// Account name → connection, with a reverse index so a connection holds
/// at most one name.
#[derive(Debug, Default)]
pub struct Directory {
    by_name: HashMap<String, ConnectionId>,
    by_conn: HashMap<ConnectionId, String>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `conn`.
    ///
    /// Re-registering the same pair is a no-op. Fails if the name belongs
    /// to a different connection; the existing entry is never replaced.
    /// A connection that already holds another name keeps only the new one.
    pub fn register(&mut self, name: &str, conn: ConnectionId) -> Result<(), NameTaken> {
        match self.by_name.get(name) {
            Some(&holder) if holder == conn => return Ok(()),
            Some(&holder) => {
                return Err(NameTaken {
                    name: name.to_string(),
                    holder,
                })
            }
            None => {}
        }

        if let Some(previous) = self.by_conn.insert(conn, name.to_string()) {
            self.by_name.remove(&previous);
        }
        self.by_name.insert(name.to_string(), conn);
        Ok(())
    }

    /// Remove `name` if present. Returns the connection it was bound to.
    pub fn unregister(&mut self, name: &str) -> Option<ConnectionId> {
        let conn = self.by_name.remove(name)?;
        self.by_conn.remove(&conn);
        Some(conn)
    }

    /// Remove whatever name `conn` holds. Returns that name.
    pub fn unregister_conn(&mut self, conn: ConnectionId) -> Option<String> {
        let name = self.by_conn.remove(&conn)?;
        self.by_name.remove(&name);
        Some(name)
    }

    pub fn lookup(&self, name: &str) -> Option<ConnectionId> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, conn: ConnectionId) -> Option<&str> {
        self.by_conn.get(&conn).map(String::as_str)
    }

    /// Every registered connection.
    pub fn all_connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.by_name.values().copied()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.by_name.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
