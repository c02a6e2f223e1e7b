//! Error taxonomy for the RPC runtime.

use serde_json::Value;

use crate::methods::CallKind;

/// Errors surfaced to callers of the runtime.
///
/// Transport-level failures never appear here: connection loss is absorbed
/// by the reconnect loop and only shows up through the telemetry sink.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The fully qualified method is in neither name set. Fails before any
    /// network traffic.
    #[error("method not recognized: {0}")]
    MethodNotRecognized(String),
    /// The method exists but is not of the kind this entry point handles.
    #[error("method {method} is not a {expected} method")]
    KindMismatch {
        /// Fully qualified method name.
        method: String,
        /// The kind the caller asked for.
        expected: CallKind,
    },
    /// The server rejected the call. The payload is carried verbatim.
    #[error("server error: {0}")]
    Server(Value),
    /// The optional per-call deadline elapsed before a response arrived.
    /// The registry entry has been removed.
    #[error("call deadline elapsed")]
    DeadlineElapsed,
    /// The runtime was dropped while the call was still in flight.
    #[error("client runtime is gone")]
    ClientClosed,
    /// A base URL could not be turned into a socket endpoint.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}
