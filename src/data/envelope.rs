//! Event envelope decoding.
//!
//! The Client pushes `[messageType, eventName, body]` arrays where `body`
//! carries `eventType`, `uri` and `data`. Anything else is out-of-protocol
//! noise and decodes to `None`.

use serde_json::Value;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Create,
    Update,
    Delete,
}

impl Opcode {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Create" => Some(Self::Create),
            "Update" => Some(Self::Update),
            "Delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    pub opcode: Opcode,
    pub resource_path: String,
    /// `None` when the frame carried `null` or no `data` at all.
    pub payload: Option<Value>,
}

/// Decode one text frame. Returns `None` for anything malformed.
#[must_use]
pub fn parse_frame(text: &str) -> Option<EventEnvelope> {
    let Ok(Value::Array(mut parts)) = serde_json::from_str::<Value>(text) else {
        trace!(len = text.len(), "envelope: not a JSON array");
        return None;
    };
    if parts.len() != 3 {
        trace!(arity = parts.len(), "envelope: wrong arity");
        return None;
    }
    let Value::Object(mut body) = parts.swap_remove(2) else {
        trace!("envelope: body is not an object");
        return None;
    };

    let opcode = match body.get("eventType") {
        Some(Value::String(s)) => Opcode::parse(s)?,
        _ => return None,
    };
    let resource_path = match body.get("uri") {
        Some(Value::String(s)) => s.clone(),
        _ => return None,
    };
    let payload = match body.remove("data") {
        None | Some(Value::Null) => None,
        Some(v) => Some(v),
    };

    Some(EventEnvelope { opcode, resource_path, payload })
}
