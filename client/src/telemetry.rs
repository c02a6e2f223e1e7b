//! Telemetry side-channel consumed by the dev-console log viewer.
//!
//! DESIGN
//! ======
//! The hook is a trait so the log viewer (out of scope here) can plug in any
//! sink. The runtime wraps every sink call in `catch_unwind`: a broken sink
//! must never take the protocol down with it. Library diagnostics still go
//! through `tracing` separately; this channel carries the frame-level feed
//! the console renders to users.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// Severity of a telemetry event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => f.write_str("info"),
            Self::Warning => f.write_str("warning"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// Which way the reported frame travelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Frame transmitted to the server.
    Outbound,
    /// Frame received from the server.
    Inbound,
    /// Connection lifecycle event, no frame attached.
    Internal,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outbound => f.write_str("out"),
            Self::Inbound => f.write_str("in"),
            Self::Internal => f.write_str("internal"),
        }
    }
}

/// Consumer of the per-frame event feed.
pub trait TelemetrySink: Send + Sync {
    /// Report one event. Implementations must not block.
    fn emit(&self, level: Level, direction: Direction, text: &str);
}

/// Default sink: drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn emit(&self, _level: Level, _direction: Direction, _text: &str) {}
}

/// Sink forwarding events to `tracing` at the matching level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn emit(&self, level: Level, direction: Direction, text: &str) {
        match level {
            Level::Info => tracing::info!(%direction, "{text}"),
            Level::Warning => tracing::warn!(%direction, "{text}"),
            Level::Error => tracing::error!(%direction, "{text}"),
        }
    }
}

/// Shared handle the runtime emits through. Isolates sink panics.
#[derive(Clone)]
pub(crate) struct Telemetry {
    sink: Arc<dyn TelemetrySink>,
}

impl Telemetry {
    pub(crate) fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self { sink }
    }

    pub(crate) fn emit(&self, level: Level, direction: Direction, text: &str) {
        let result = catch_unwind(AssertUnwindSafe(|| {
            self.sink.emit(level, direction, text);
        }));
        if result.is_err() {
            tracing::warn!("telemetry sink panicked; event dropped");
        }
    }
}

#[cfg(test)]
#[path = "telemetry_test.rs"]
mod tests;
