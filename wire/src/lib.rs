//! Shared envelope model and JSON codec for the dev-console RPC transport.
//!
//! This crate owns the wire representation used by the `client` runtime and
//! the `cli` tool. Outbound calls are JSON-RPC shaped; inbound frames wrap
//! the real payload in a server-tagged envelope so the router can classify
//! them without inspecting the payload itself.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version stamped on every outbound envelope.
pub const PROTOCOL_VERSION: &str = "2.0";

/// Reserved method name for tearing down a server-side subscription.
pub const UNSUBSCRIBE_METHOD: &str = "unsubscribe";

/// Error returned by [`decode_inbound`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The raw text could not be decoded as an inbound envelope.
    #[error("failed to decode inbound frame: {0}")]
    Decode(#[from] serde_json::Error),
    /// The envelope carried neither a `result` nor an `error` member.
    #[error("inbound frame {0} has neither result nor error")]
    EmptyEnvelope(u64),
}

/// Server-declared tag distinguishing how an inbound frame is routed.
///
/// Variant names match the wire strings exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// Terminal reply to a request-style call.
    Response,
    /// Acknowledgement with no payload (subscription setup ack).
    Void,
    /// One item on an open subscription stream.
    SubscriptionMessage,
    /// Response variant signalling the backend restarted or recompiled.
    HotReload,
    /// Any tag this client does not know; routed to a warning, never a
    /// decode failure.
    #[serde(other)]
    Unknown,
}

/// An outbound method-call envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Protocol version, always [`PROTOCOL_VERSION`].
    pub jsonrpc: String,
    /// Fully qualified method name, `"<namespace>.<name>"`.
    pub method: String,
    /// Call parameters. Arbitrary JSON; `{}` when the caller has none.
    pub params: Value,
    /// Correlation id. Monotonic per client, never reused.
    pub id: u64,
}

impl Request {
    /// Build a call envelope for a fully qualified method.
    #[must_use]
    pub fn call(method: impl Into<String>, params: Value, id: u64) -> Self {
        Self {
            jsonrpc: PROTOCOL_VERSION.to_owned(),
            method: method.into(),
            params,
            id,
        }
    }

    /// Build the unsubscribe envelope for a subscription id.
    #[must_use]
    pub fn unsubscribe(id: u64) -> Self {
        Self::call(UNSUBSCRIBE_METHOD, Value::Object(serde_json::Map::new()), id)
    }
}

/// The `result` member of a successful inbound envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerResult {
    /// Routing tag declared by the server.
    #[serde(rename = "messageType")]
    pub message_type: MessageKind,
    /// The actual payload, unwrapped by the router before delivery.
    #[serde(default)]
    pub object: Value,
}

/// One inbound frame: either a tagged result or a top-level error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Inbound {
    /// Correlation id of the originating call.
    pub id: u64,
    /// Present on success; wraps kind + payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ServerResult>,
    /// Present on failure; carried to the caller verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

/// Encode an outbound envelope to JSON text.
///
/// # Panics
///
/// Never panics in practice; a `Value`-backed struct serializes infallibly.
#[must_use]
pub fn encode_request(request: &Request) -> String {
    serde_json::to_string(request).unwrap_or_default()
}

/// Decode JSON text into an inbound envelope.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed JSON and
/// [`CodecError::EmptyEnvelope`] when the frame has neither `result` nor
/// `error`.
pub fn decode_inbound(text: &str) -> Result<Inbound, CodecError> {
    let inbound: Inbound = serde_json::from_str(text)?;
    if inbound.result.is_none() && inbound.error.is_none() {
        return Err(CodecError::EmptyEnvelope(inbound.id));
    }
    Ok(inbound)
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
