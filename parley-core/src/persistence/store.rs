use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use parley_types::{SessionStore, StoreError};

use super::schema;

/// SQL expression for the current local time, stored as text.
const NOW: &str = "datetime('now', 'localtime')";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("could not create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("database lock poisoned")]
    Poisoned,
}

impl From<PersistenceError> for StoreError {
    fn from(e: PersistenceError) -> Self {
        match e {
            PersistenceError::Poisoned => StoreError::Poisoned,
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// A known account and when it last logged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub name: String,
    pub last_login: String,
}

/// An account with a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveUser {
    pub name: String,
    pub ip_address: String,
    pub port: u16,
    pub login_time: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRecord {
    pub name: String,
    pub date_time: String,
    pub ip: String,
    pub port: u16,
}

/// Session bookkeeping backed by SQLite.
///
/// The router thread writes through [`SessionStore`] while the operator
/// console reads, so the connection sits behind a mutex.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    ///
    /// Live sessions from a previous run are cleared, since none of those
    /// connections survived the restart.
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, PersistenceError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::create_tables(&conn)?;
        schema::clear_active_users(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, PersistenceError> {
        self.conn.lock().map_err(|_| PersistenceError::Poisoned)
    }

    /// Record a login: create or touch the account, mark it active and
    /// append a history row.
    pub fn user_login(&self, name: &str, ip: &str, port: u16) -> Result<(), PersistenceError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        tx.execute(
            &format!(
                "INSERT INTO users (name, last_login) VALUES (?1, {now})
                 ON CONFLICT(name) DO UPDATE SET last_login = excluded.last_login",
                now = NOW
            ),
            params![name],
        )?;
        let user_id: i64 = tx.query_row(
            "SELECT id FROM users WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        tx.execute(
            &format!(
                "INSERT OR REPLACE INTO active_users (user, ip_address, port, login_time)
                 VALUES (?1, ?2, ?3, {now})",
                now = NOW
            ),
            params![user_id, ip, port],
        )?;
        tx.execute(
            &format!(
                "INSERT INTO login_history (user, date_time, ip, port)
                 VALUES (?1, {now}, ?2, ?3)",
                now = NOW
            ),
            params![user_id, ip, port],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Drop the account's live session. Unknown names are ignored.
    pub fn user_logout(&self, name: &str) -> Result<(), PersistenceError> {
        let conn = self.lock()?;
        let user_id: Option<i64> = conn
            .query_row(
                "SELECT id FROM users WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = user_id {
            conn.execute("DELETE FROM active_users WHERE user = ?1", params![id])?;
        }
        Ok(())
    }

    /// Every account ever seen, by name.
    pub fn users_list(&self) -> Result<Vec<UserRecord>, PersistenceError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT name, last_login FROM users ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(UserRecord {
                name: row.get(0)?,
                last_login: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn active_users_list(&self) -> Result<Vec<ActiveUser>, PersistenceError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT u.name, a.ip_address, a.port, a.login_time
             FROM active_users a JOIN users u ON a.user = u.id
             ORDER BY a.id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ActiveUser {
                name: row.get(0)?,
                ip_address: row.get(1)?,
                port: row.get(2)?,
                login_time: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Login history, oldest first, for one account or all of them.
    pub fn login_history(&self, name: Option<&str>) -> Result<Vec<LoginRecord>, PersistenceError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT u.name, h.date_time, h.ip, h.port
             FROM login_history h JOIN users u ON h.user = u.id
             WHERE ?1 IS NULL OR u.name = ?1
             ORDER BY h.id",
        )?;
        let rows = stmt.query_map(params![name], |row| {
            Ok(LoginRecord {
                name: row.get(0)?,
                date_time: row.get(1)?,
                ip: row.get(2)?,
                port: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}

impl SessionStore for SqliteStore {
    fn on_login(&self, account_name: &str, peer: SocketAddr) -> Result<(), StoreError> {
        self.user_login(account_name, &peer.ip().to_string(), peer.port())
            .map_err(StoreError::from)
    }

    fn on_logout(&self, account_name: &str) -> Result<(), StoreError> {
        self.user_logout(account_name).map_err(StoreError::from)
    }
}
