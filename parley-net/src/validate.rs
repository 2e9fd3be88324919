//! Classification of decoded payloads into protocol envelopes.
//!
//! Rules are checked in order and the first match wins:
//! 1. `action == "presence"` with `time` and `user.account_name`
//! 2. `action == "message"` with `destination`, `time`, `sender`, `message_text`
//! 3. `action == "exit"` with `account_name`
//! 4. anything else is `Invalid`

use serde_json::{Map, Value};

use parley_types::protocol::{
    ACCOUNT_NAME, ACTION, DESTINATION, EXIT, MESSAGE, MESSAGE_TEXT, PRESENCE, SENDER, TIME, USER,
};
use parley_types::{ChatMessage, Envelope, Exit, Presence, Timestamp, User};

/// Classify a decoded JSON object. Pure; never fails.
pub fn classify(payload: &Map<String, Value>) -> Envelope {
    let action = str_field(payload, ACTION);

    if action == Some(PRESENCE) {
        if let Some(presence) = presence(payload) {
            return Envelope::Presence(presence);
        }
    }
    if action == Some(MESSAGE) {
        if let Some(message) = chat_message(payload) {
            return Envelope::ChatMessage(message);
        }
    }
    if action == Some(EXIT) {
        if let Some(exit) = exit(payload) {
            return Envelope::Exit(exit);
        }
    }
    Envelope::Invalid
}

fn presence(payload: &Map<String, Value>) -> Option<Presence> {
    let time = timestamp(payload)?;
    let user = payload.get(USER)?.as_object()?;
    let account_name = str_field(user, ACCOUNT_NAME)?;
    Some(Presence {
        time,
        user: User {
            account_name: account_name.to_string(),
        },
    })
}

fn chat_message(payload: &Map<String, Value>) -> Option<ChatMessage> {
    let destination = str_field(payload, DESTINATION)?;
    let time = timestamp(payload)?;
    let sender = str_field(payload, SENDER)?;
    let message_text = str_field(payload, MESSAGE_TEXT)?;
    Some(ChatMessage {
        time,
        sender: sender.to_string(),
        destination: destination.to_string(),
        message_text: message_text.to_string(),
    })
}

fn exit(payload: &Map<String, Value>) -> Option<Exit> {
    let account_name = str_field(payload, ACCOUNT_NAME)?;
    let time = timestamp(payload);
    Some(Exit {
        account_name: account_name.to_string(),
        time,
    })
}

fn str_field<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

/// `time` counts as present whatever its JSON type.
fn timestamp(map: &Map<String, Value>) -> Option<Timestamp> {
    Some(match map.get(TIME)? {
        Value::Number(n) => Timestamp::Epoch(n.clone()),
        Value::String(s) => Timestamp::Clock(s.clone()),
        other => Timestamp::Other(other.clone()),
    })
}
