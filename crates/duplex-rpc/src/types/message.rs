//! Envelope types for the duplex JSON-RPC wire format.
//!
//! One connection carries both directions, so an inbound value is decoded into a
//! permissive [`Envelope`] first and only then classified by its shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Any decoded message unit, before classification.
///
/// Only JSON objects decode. Key presence is preserved: an absent key is `None`,
/// an explicit `null` is `Some(Value::Null)`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct Envelope {
    pub method: Option<String>,
    pub params: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<Value>,
    pub id: Option<Value>,
}

impl TryFrom<Map<String, Value>> for Envelope {
    type Error = String;

    fn try_from(mut object: Map<String, Value>) -> Result<Self, Self::Error> {
        let method = match object.remove("method") {
            None | Some(Value::Null) => None,
            Some(Value::String(method)) => Some(method),
            Some(other) => return Err(format!("method must be a string, got {other}")),
        };
        Ok(Self {
            method,
            params: object.remove("params"),
            result: object.remove("result"),
            error: object.remove("error"),
            id: object.remove("id"),
        })
    }
}

fn is_set(value: &Option<Value>) -> bool {
    matches!(value, Some(v) if !v.is_null())
}

impl Envelope {
    fn has_method(&self) -> bool {
        self.method.as_deref().is_some_and(|m| !m.is_empty())
    }

    /// Request shape: method, params and id set; no result and no error.
    pub fn is_request(&self) -> bool {
        self.has_method()
            && is_set(&self.params)
            && is_set(&self.id)
            && !is_set(&self.result)
            && !is_set(&self.error)
    }

    /// Response shape: a result key or a non-null error, an id, and no method or params.
    pub fn is_response(&self) -> bool {
        (self.result.is_some() || is_set(&self.error))
            && is_set(&self.id)
            && !self.has_method()
            && !is_set(&self.params)
    }

    /// Classify the envelope. `None` means it matches neither shape.
    pub fn into_message(self) -> Option<Message> {
        if self.is_request() {
            Some(Message::Request(InboundRequest {
                method: self.method.unwrap_or_default(),
                params: self.params,
                id: self.id.unwrap_or(Value::Null),
            }))
        } else if self.is_response() {
            Some(Message::Response(InboundResponse {
                id: self.id.unwrap_or(Value::Null),
                result: self.result,
                error: self.error.filter(|e| !e.is_null()),
            }))
        } else {
            None
        }
    }
}

/// A classified envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(InboundRequest),
    Response(InboundResponse),
}

/// A call made by the peer against one of our services.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundRequest {
    pub method: String,
    pub params: Option<Value>,
    pub id: Value,
}

/// The peer's answer to one of our outstanding calls.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundResponse {
    pub id: Value,
    pub result: Option<Value>,
    pub error: Option<Value>,
}

impl InboundResponse {
    /// Correlation id as issued by this side, if the peer echoed one we could have sent.
    pub fn correlation_id(&self) -> Option<u64> {
        self.id.as_u64()
    }
}

/// Outbound call: `{"method": "Service.Method", "params": [arg], "id": n}`.
#[derive(Debug, Serialize)]
pub struct OutgoingRequest<'a, A: Serialize> {
    pub method: &'a str,
    pub params: [&'a A; 1],
    pub id: u64,
}

impl<'a, A: Serialize> OutgoingRequest<'a, A> {
    pub fn new(method: &'a str, argument: &'a A, id: u64) -> Self {
        Self {
            method,
            params: [argument],
            id,
        }
    }
}

/// Outbound reply. Both `result` and `error` are always written; the unused one is `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingResponse {
    pub id: Value,
    pub result: Value,
    pub error: Option<String>,
}

impl OutgoingResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            result,
            error: None,
        }
    }

    pub fn failure(id: Value, message: impl Into<String>) -> Self {
        Self {
            id,
            result: Value::Null,
            error: Some(message.into()),
        }
    }
}

/// Render a remote error value as text. Strings are taken verbatim.
pub fn error_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
