//! Bounded JSON framing for TCP messages.
//!
//! Wire format: one UTF-8 JSON object per frame, at most [`MAX_FRAME_SIZE`]
//! bytes, no length prefix or delimiter. Every read consumes up to one
//! frame's worth of bytes and is decoded on its own; a payload that spans
//! two reads is undecodable.

use std::io::{self, Read, Write};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use parley_types::{Envelope, Response};

use crate::validate::classify;

/// Largest frame the relay will read or write.
pub const MAX_FRAME_SIZE: usize = 1024;

/// Why a frame could not be turned into a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// Serialize an envelope into frame bytes.
pub fn encode(envelope: &Envelope) -> Vec<u8> {
    to_frame(envelope)
}

/// Serialize a server response into frame bytes.
pub fn encode_response(response: &Response) -> Vec<u8> {
    to_frame(response)
}

fn to_frame<T: Serialize>(value: &T) -> Vec<u8> {
    // Our wire types only hold strings, numbers and nested structs, which
    // serde_json cannot fail on.
    serde_json::to_vec(value).unwrap_or_default()
}

/// Parse frame bytes into a JSON object without classifying it.
pub fn decode_payload(bytes: &[u8]) -> Result<Map<String, Value>, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Malformed("empty frame".into()));
    }
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(DecodeError::Malformed(format!(
            "frame too large: {} bytes (max {})",
            bytes.len(),
            MAX_FRAME_SIZE
        )));
    }

    let text = std::str::from_utf8(bytes)
        .map_err(|e| DecodeError::Malformed(format!("invalid utf-8: {}", e)))?;

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(DecodeError::Malformed(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(DecodeError::Malformed(e.to_string())),
    }
}

/// Decode frame bytes into a classified envelope.
pub fn decode(bytes: &[u8]) -> Result<Envelope, DecodeError> {
    decode_payload(bytes).map(|payload| classify(&payload))
}

/// Decode frame bytes as a server response.
pub fn decode_response(bytes: &[u8]) -> Result<Option<Response>, DecodeError> {
    let payload = decode_payload(bytes)?;
    if !payload.contains_key(parley_types::protocol::RESPONSE) {
        return Ok(None);
    }
    serde_json::from_value(Value::Object(payload))
        .map(Some)
        .map_err(|e| DecodeError::Malformed(e.to_string()))
}

/// Read a single frame with one `read` call.
///
/// Returns `Ok(None)` when the peer has closed the stream.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut buf = [0u8; MAX_FRAME_SIZE];
    let n = reader.read(&mut buf)?;
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(buf[..n].to_vec()))
}

/// Write a single frame.
pub fn write_frame<W: Write>(writer: &mut W, frame: &[u8]) -> io::Result<()> {
    if frame.len() > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame too large: {} bytes", frame.len()),
        ));
    }
    writer.write_all(frame)?;
    writer.flush()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
