//! Caller-facing subscription handle.
//!
//! The handle is deliberately callback-shaped: items are pushed as fast as
//! frames arrive, with no buffering or backpressure. A caller that has not
//! installed `on_next` yet simply misses those items: the subscribe frame
//! goes out synchronously at invoke time, so installing callbacks first is
//! the caller's job.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::connection::OutboundFrame;
use crate::registry::Registry;

type Callback = Box<dyn FnMut(Value) + Send>;

/// Callback slots shared between the registry entry and the caller's handle.
pub(crate) struct ObserverSlots {
    next: Mutex<Option<Callback>>,
    error: Mutex<Option<Callback>>,
}

impl ObserverSlots {
    pub(crate) fn new() -> Self {
        Self {
            next: Mutex::new(None),
            error: Mutex::new(None),
        }
    }

    pub(crate) fn set_next(&self, callback: Callback) {
        *self.next.lock() = Some(callback);
    }

    pub(crate) fn set_error(&self, callback: Callback) {
        *self.error.lock() = Some(callback);
    }

    /// Push one item to the caller. Dropped when no slot is installed.
    pub(crate) fn deliver_next(&self, value: Value) {
        if let Some(callback) = self.next.lock().as_mut() {
            callback(value);
        }
    }

    /// Push a server error to the caller. Dropped when no slot is installed.
    pub(crate) fn deliver_error(&self, value: Value) {
        if let Some(callback) = self.error.lock().as_mut() {
            callback(value);
        }
    }
}

/// Handle for one open subscription stream.
///
/// Dropping the handle does NOT cancel the stream; only [`Subscription::cancel`]
/// tears down the server side.
pub struct Subscription {
    id: u64,
    slots: Arc<ObserverSlots>,
    telemeter: bool,
    registry: Arc<Registry>,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .finish()
    }
}

impl Subscription {
    pub(crate) fn new(
        id: u64,
        slots: Arc<ObserverSlots>,
        telemeter: bool,
        registry: Arc<Registry>,
        outbound: mpsc::UnboundedSender<OutboundFrame>,
    ) -> Self {
        Self {
            id,
            slots,
            telemeter,
            registry,
            outbound,
        }
    }

    /// Correlation id of this stream.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Install the item callback. Chainable; last write wins.
    pub fn on_next(&self, callback: impl FnMut(Value) + Send + 'static) -> &Self {
        self.slots.set_next(Box::new(callback));
        self
    }

    /// Install the error callback. Chainable; last write wins.
    pub fn on_error(&self, callback: impl FnMut(Value) + Send + 'static) -> &Self {
        self.slots.set_error(Box::new(callback));
        self
    }

    /// Tear the stream down: drop the registry entry and send an explicit
    /// unsubscribe frame (buffered while disconnected). Calling this again
    /// is a no-op; the entry is already gone, no second frame goes out.
    pub fn cancel(&self) {
        if !self.registry.remove_subscription(self.id) {
            return;
        }
        let json = wire::encode_request(&wire::Request::unsubscribe(self.id));
        let _ = self.outbound.send(OutboundFrame {
            json,
            telemeter: self.telemeter,
        });
    }
}

#[cfg(test)]
#[path = "observer_test.rs"]
mod tests;
