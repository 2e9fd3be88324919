//! Wire protocol types for the parley relay.
//!
//! Every frame on the wire is a UTF-8 JSON object with an `action` tag.
//! Server replies carry a `response` status instead.

use serde::{Deserialize, Serialize};

/// `action` value of a presence announcement.
pub const PRESENCE: &str = "presence";
/// `action` value of an addressed chat message.
pub const MESSAGE: &str = "message";
/// `action` value of a clean disconnect.
pub const EXIT: &str = "exit";

pub const ACTION: &str = "action";
pub const TIME: &str = "time";
pub const USER: &str = "user";
pub const ACCOUNT_NAME: &str = "account_name";
pub const SENDER: &str = "sender";
pub const DESTINATION: &str = "destination";
pub const MESSAGE_TEXT: &str = "message_text";
pub const RESPONSE: &str = "response";
pub const ERROR: &str = "error";

/// Status code for an accepted request.
pub const OK: u16 = 200;
/// Status code for a rejected request.
pub const WRONG_REQUEST: u16 = 400;

pub const ERR_NAME_TAKEN: &str = "name taken";
pub const ERR_BAD_REQUEST: &str = "bad request";
pub const ERR_ALREADY_REGISTERED: &str = "already registered";

/// Client-supplied request time.
///
/// Clients send either seconds since the epoch or a wall-clock string
/// such as `"14:03:59"`. The server never interprets it, so any other JSON
/// value is carried through as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Epoch(serde_json::Number),
    Clock(String),
    Other(serde_json::Value),
}

impl From<&str> for Timestamp {
    fn from(clock: &str) -> Self {
        Timestamp::Clock(clock.to_string())
    }
}

impl From<u64> for Timestamp {
    fn from(secs: u64) -> Self {
        Timestamp::Epoch(secs.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub account_name: String,
}

/// Presence announcement: the first frame a client sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presence {
    pub time: Timestamp,
    pub user: User,
}

impl Presence {
    pub fn new(account_name: impl Into<String>, time: Timestamp) -> Self {
        Self {
            time,
            user: User {
                account_name: account_name.into(),
            },
        }
    }

    pub fn account_name(&self) -> &str {
        &self.user.account_name
    }
}

/// Text addressed from one account to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub time: Timestamp,
    pub sender: String,
    pub destination: String,
    pub message_text: String,
}

/// Clean disconnect of an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exit {
    pub account_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<Timestamp>,
}

/// One classified protocol message.
///
/// Produced by the server-side validator from a decoded JSON object; any
/// object that matches none of the known shapes becomes `Invalid`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action")]
pub enum Envelope {
    #[serde(rename = "presence")]
    Presence(Presence),
    #[serde(rename = "message")]
    ChatMessage(ChatMessage),
    #[serde(rename = "exit")]
    Exit(Exit),
    #[serde(rename = "invalid")]
    Invalid,
}

impl Envelope {
    /// The `action` tag this envelope is sent with.
    pub fn action(&self) -> &'static str {
        match self {
            Envelope::Presence(_) => PRESENCE,
            Envelope::ChatMessage(_) => MESSAGE,
            Envelope::Exit(_) => EXIT,
            Envelope::Invalid => "invalid",
        }
    }
}

impl From<Presence> for Envelope {
    fn from(p: Presence) -> Self {
        Envelope::Presence(p)
    }
}

impl From<ChatMessage> for Envelope {
    fn from(m: ChatMessage) -> Self {
        Envelope::ChatMessage(m)
    }
}

impl From<Exit> for Envelope {
    fn from(e: Exit) -> Self {
        Envelope::Exit(e)
    }
}

/// Server reply to `presence` and to unrecognized requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub response: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            response: OK,
            error: None,
        }
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self {
            response: WRONG_REQUEST,
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.response == OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn presence_serializes_with_nested_user() {
        let env = Envelope::from(Presence::new("alice", Timestamp::from("12:00:00")));
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(
            value,
            json!({"action": "presence", "time": "12:00:00", "user": {"account_name": "alice"}})
        );
    }

    #[test]
    fn exit_omits_missing_time() {
        let env = Envelope::from(Exit {
            account_name: "bob".into(),
            time: None,
        });
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value, json!({"action": "exit", "account_name": "bob"}));
    }

    #[test]
    fn response_error_field_is_optional() {
        assert_eq!(serde_json::to_value(Response::ok()).unwrap(), json!({"response": 200}));
        assert_eq!(
            serde_json::to_value(Response::bad_request(ERR_NAME_TAKEN)).unwrap(),
            json!({"response": 400, "error": "name taken"})
        );

        let parsed: Response = serde_json::from_str(r#"{"response": 200}"#).unwrap();
        assert!(parsed.is_ok());
    }

    #[test]
    fn timestamp_accepts_numbers_and_strings() {
        let epoch: Timestamp = serde_json::from_str("1700000000.5").unwrap();
        assert!(matches!(epoch, Timestamp::Epoch(_)));
        let clock: Timestamp = serde_json::from_str("\"09:15:00\"").unwrap();
        assert_eq!(clock, Timestamp::from("09:15:00"));
        let other: Timestamp = serde_json::from_str("null").unwrap();
        assert_eq!(other, Timestamp::Other(serde_json::Value::Null));
        let nested: Timestamp = serde_json::from_str(r#"{"ts": 1}"#).unwrap();
        assert!(matches!(nested, Timestamp::Other(serde_json::Value::Object(_))));
    }
}
