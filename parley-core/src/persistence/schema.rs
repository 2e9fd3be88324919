use rusqlite::{Connection, Result as SqlResult};

/// Create all tables if they do not exist yet.
pub fn create_tables(conn: &Connection) -> SqlResult<()> {
    conn.execute_batch(SCHEMA_SQL)
}

/// Forget sessions left behind by a previous run.
pub fn clear_active_users(conn: &Connection) -> SqlResult<()> {
    conn.execute_batch("DELETE FROM active_users;")
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    last_login TEXT NOT NULL
);

-- One row per currently connected account.
CREATE TABLE IF NOT EXISTS active_users (
    id INTEGER PRIMARY KEY,
    user INTEGER NOT NULL UNIQUE REFERENCES users(id),
    ip_address TEXT NOT NULL,
    port INTEGER NOT NULL,
    login_time TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS login_history (
    id INTEGER PRIMARY KEY,
    user INTEGER NOT NULL REFERENCES users(id),
    date_time TEXT NOT NULL,
    ip TEXT NOT NULL,
    port INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_login_history_user ON login_history(user);
";
