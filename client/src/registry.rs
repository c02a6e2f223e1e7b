//! Correlation registry: pending requests, active subscriptions, id space.
//!
//! Both maps share one monotonic id counter so an id can never be live in
//! the two registries at once, and ids are never recycled.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::RpcError;
use crate::observer::ObserverSlots;

/// One in-flight request/response exchange.
pub(crate) struct PendingRequest {
    /// Settles the caller's deferred result, exactly once.
    pub settle: oneshot::Sender<Result<Value, RpcError>>,
    /// Whether this exchange feeds the telemetry sink.
    pub telemeter: bool,
}

/// One open stream of server-pushed items.
#[derive(Clone)]
pub(crate) struct ActiveSubscription {
    /// Callback slots owned jointly with the caller's handle.
    pub observer: Arc<ObserverSlots>,
    /// Whether this exchange feeds the telemetry sink.
    pub telemeter: bool,
}

pub(crate) struct Registry {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, PendingRequest>>,
    subscriptions: Mutex<HashMap<u64, ActiveSubscription>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Hand out the next correlation id. Never reused.
    pub(crate) fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn insert_pending(
        &self,
        id: u64,
        settle: oneshot::Sender<Result<Value, RpcError>>,
        telemeter: bool,
    ) {
        self.pending
            .lock()
            .insert(id, PendingRequest { settle, telemeter });
    }

    /// Remove and return the pending entry for `id`, settling path.
    pub(crate) fn take_pending(&self, id: u64) -> Option<PendingRequest> {
        self.pending.lock().remove(&id)
    }

    /// Drop the pending entry for `id` without settling it (deadline path).
    /// Returns whether an entry existed.
    pub(crate) fn forget_pending(&self, id: u64) -> bool {
        self.pending.lock().remove(&id).is_some()
    }

    pub(crate) fn insert_subscription(&self, id: u64, observer: Arc<ObserverSlots>, telemeter: bool) {
        self.subscriptions
            .lock()
            .insert(id, ActiveSubscription { observer, telemeter });
    }

    /// Look up the subscription for `id` without removing it.
    pub(crate) fn subscription(&self, id: u64) -> Option<ActiveSubscription> {
        self.subscriptions.lock().get(&id).cloned()
    }

    /// Remove the subscription for `id`. Returns whether an entry existed.
    pub(crate) fn remove_subscription(&self, id: u64) -> bool {
        self.subscriptions.lock().remove(&id).is_some()
    }

    #[cfg(test)]
    pub(crate) fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
