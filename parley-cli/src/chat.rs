//! Line handling for the interactive chat client.

use parley_types::{ChatMessage, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Help,
    Exit,
    /// Switch the destination for following messages.
    To(String),
    Message(String),
    Empty,
}

impl Input {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Input::Empty;
        }
        match trimmed {
            "#help" => Input::Help,
            "#exit" => Input::Exit,
            _ => match trimmed.strip_prefix("#to ") {
                Some(name) if !name.trim().is_empty() => Input::To(name.trim().to_string()),
                _ => Input::Message(line.trim_end_matches(&['\r', '\n'][..]).to_string()),
            },
        }
    }
}

pub const HELP: &str = "Commands:\n  #to <name>  - send following messages to <name>\n  #exit       - leave the chat\n  #help       - this list\nAnything else is sent as a message.";

/// How an inbound message is shown on the console.
pub fn format_incoming(message: &ChatMessage) -> String {
    match &message.time {
        Timestamp::Clock(clock) => format!("{} [from {}]: {}", clock, message.sender, message.message_text),
        _ => format!("[from {}]: {}", message.sender, message.message_text),
    }
}
