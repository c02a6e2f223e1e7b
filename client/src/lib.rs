//! Client-side RPC runtime for the dev-console socket protocol.
//!
//! One persistent WebSocket connection multiplexes every console service.
//! Outgoing calls are classified against build-time name tables into
//! request/response exchanges or long-lived subscriptions, correlated by a
//! monotonic id, and the connection survives transport loss transparently:
//! frames submitted while disconnected wait in a FIFO buffer and in-flight
//! exchanges simply keep waiting.

mod client;
mod config;
mod connection;
mod error;
mod methods;
mod observer;
mod registry;
mod router;
mod telemetry;

pub use client::{Call, CallOptions, Client, PendingCall, Service};
pub use config::{ClientConfig, WS_PATH, endpoint_from_base_url};
pub use connection::ConnectionState;
pub use error::RpcError;
pub use methods::{CallKind, MethodSets};
pub use observer::Subscription;
pub use telemetry::{Direction, Level, NoopSink, TelemetrySink, TracingSink};
