//! Operator console for the relay: reads commands from stdin and answers
//! from the session database.

use std::io::{self, BufRead, Write};

use parley_core::persistence::PersistenceError;
use parley_core::SqliteStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Users,
    Connected,
    LogHistory(Option<String>),
    Exit,
    Empty,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Command::Empty;
        };
        match head {
            "help" => Command::Help,
            "users" => Command::Users,
            "connected" => Command::Connected,
            "loghist" => Command::LogHistory(words.next().map(str::to_string)),
            "exit" => Command::Exit,
            other => Command::Unknown(other.to_string()),
        }
    }
}

pub fn print_help<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out, "Commands:")?;
    writeln!(out, "  users           - all known accounts")?;
    writeln!(out, "  connected       - accounts connected right now")?;
    writeln!(out, "  loghist [name]  - login history, for one account or all")?;
    writeln!(out, "  exit            - stop the server")?;
    writeln!(out, "  help            - this list")
}

/// Run one command. Returns `false` when the console should stop.
pub fn execute<W: Write>(command: &Command, store: &SqliteStore, out: &mut W) -> io::Result<bool> {
    match command {
        Command::Help => print_help(out)?,
        Command::Empty => {}
        Command::Exit => return Ok(false),
        Command::Unknown(word) => writeln!(out, "Unknown command '{}'. Type 'help'.", word)?,
        Command::Users => match store.users_list() {
            Ok(users) if users.is_empty() => writeln!(out, "No known users.")?,
            Ok(users) => {
                for user in users {
                    writeln!(out, "{}  last login {}", user.name, user.last_login)?;
                }
            }
            Err(e) => report(out, e)?,
        },
        Command::Connected => match store.active_users_list() {
            Ok(active) if active.is_empty() => writeln!(out, "Nobody is connected.")?,
            Ok(active) => {
                for user in active {
                    writeln!(
                        out,
                        "{}  from {}:{}  since {}",
                        user.name, user.ip_address, user.port, user.login_time
                    )?;
                }
            }
            Err(e) => report(out, e)?,
        },
        Command::LogHistory(name) => match store.login_history(name.as_deref()) {
            Ok(records) if records.is_empty() => writeln!(out, "No logins recorded.")?,
            Ok(records) => {
                for record in records {
                    writeln!(
                        out,
                        "{}  at {}  from {}:{}",
                        record.name, record.date_time, record.ip, record.port
                    )?;
                }
            }
            Err(e) => report(out, e)?,
        },
    }
    Ok(true)
}

fn report<W: Write>(out: &mut W, e: PersistenceError) -> io::Result<()> {
    log::error!("console query failed: {}", e);
    writeln!(out, "Query failed: {}", e)
}

/// Read commands until `exit` or end of input. Returns `true` if the
/// operator asked the server to stop.
pub fn run<R: BufRead, W: Write>(input: R, out: &mut W, store: &SqliteStore) -> io::Result<bool> {
    print_help(out)?;
    for line in input.lines() {
        let command = Command::parse(&line?);
        if !execute(&command, store, out)? {
            return Ok(true);
        }
        out.flush()?;
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output_of(command: &Command, store: &SqliteStore) -> String {
        let mut out = Vec::new();
        execute(command, store, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn parse_commands() {
        assert_eq!(Command::parse("users"), Command::Users);
        assert_eq!(Command::parse("  connected "), Command::Connected);
        assert_eq!(Command::parse("loghist"), Command::LogHistory(None));
        assert_eq!(
            Command::parse("loghist alice"),
            Command::LogHistory(Some("alice".into()))
        );
        assert_eq!(Command::parse(""), Command::Empty);
        assert_eq!(Command::parse("quit"), Command::Unknown("quit".into()));
    }

    #[test]
    fn listings_come_from_the_store() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(output_of(&Command::Connected, &store), "Nobody is connected.\n");

        store.user_login("alice", "10.0.0.1", 4000).unwrap();
        store.user_login("bob", "10.0.0.2", 4001).unwrap();
        store.user_logout("bob").unwrap();

        let users = output_of(&Command::Users, &store);
        assert!(users.contains("alice") && users.contains("bob"));

        let connected = output_of(&Command::Connected, &store);
        assert!(connected.contains("alice  from 10.0.0.1:4000"));
        assert!(!connected.contains("bob"));

        let history = output_of(&Command::LogHistory(Some("bob".into())), &store);
        assert_eq!(history.lines().count(), 1);
        assert!(history.contains("10.0.0.2:4001"));
    }

    #[test]
    fn run_stops_on_exit_only() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut out = Vec::new();
        assert!(run("users\nexit\nusers\n".as_bytes(), &mut out, &store).unwrap());

        let mut out = Vec::new();
        assert!(!run("users\nhelp\n".as_bytes(), &mut out, &store).unwrap());
    }
}
