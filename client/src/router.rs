//! Inbound frame routing.
//!
//! DESIGN
//! ======
//! The connection task hands every received text frame to [`Router::handle_text`]
//! and gets back the frames the runtime wants transmitted in reaction (today
//! only hygiene unsubscribes for orphaned streams) plus a hot-reload marker.
//! The router itself never touches the socket, which keeps all of this
//! logic synchronous and directly testable.

use std::sync::Arc;

use serde_json::Value;
use wire::MessageKind;

use crate::connection::OutboundFrame;
use crate::error::RpcError;
use crate::registry::Registry;
use crate::telemetry::{Direction, Level, Telemetry};

/// What one inbound frame asked the connection task to do.
#[derive(Default)]
pub(crate) struct DispatchOutcome {
    /// Frames to transmit in reaction, in order.
    pub replies: Vec<OutboundFrame>,
    /// The server announced a hot reload; the connection stays up but the
    /// state machine should reflect it.
    pub hot_reload: bool,
}

pub(crate) struct Router {
    registry: Arc<Registry>,
    telemetry: Telemetry,
}

impl Router {
    pub(crate) fn new(registry: Arc<Registry>, telemetry: Telemetry) -> Self {
        Self {
            registry,
            telemetry,
        }
    }

    /// Route one received text frame.
    pub(crate) fn handle_text(&self, text: &str) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        let inbound = match wire::decode_inbound(text) {
            Ok(inbound) => inbound,
            Err(error) => {
                self.telemetry.emit(
                    Level::Warning,
                    Direction::Inbound,
                    &format!("undecodable frame dropped: {error}"),
                );
                return outcome;
            }
        };

        if let Some(error) = inbound.error {
            self.route_error(inbound.id, error, text);
            return outcome;
        }
        let Some(result) = inbound.result else {
            return outcome;
        };

        match result.message_type {
            MessageKind::Void => {
                // Subscription setup ack; nothing to route.
                if let Some(entry) = self.registry.subscription(inbound.id) {
                    if entry.telemeter {
                        self.telemetry.emit(Level::Info, Direction::Inbound, text);
                    }
                }
            }
            MessageKind::Response | MessageKind::HotReload => {
                if result.message_type == MessageKind::HotReload {
                    outcome.hot_reload = true;
                }
                self.settle_pending(inbound.id, result.object, text);
            }
            MessageKind::SubscriptionMessage => {
                self.route_item(inbound.id, result.object, text, &mut outcome);
            }
            MessageKind::Unknown => {
                self.telemetry.emit(
                    Level::Warning,
                    Direction::Inbound,
                    &format!("frame with unrecognized kind for id {} dropped", inbound.id),
                );
            }
        }

        outcome
    }

    fn settle_pending(&self, id: u64, payload: Value, text: &str) {
        match self.registry.take_pending(id) {
            Some(entry) => {
                if entry.telemeter {
                    self.telemetry.emit(Level::Info, Direction::Inbound, text);
                }
                let _ = entry.settle.send(Ok(payload));
            }
            None => {
                self.telemetry.emit(
                    Level::Warning,
                    Direction::Inbound,
                    &format!("response for unknown id {id} dropped"),
                );
            }
        }
    }

    fn route_item(&self, id: u64, payload: Value, text: &str, outcome: &mut DispatchOutcome) {
        match self.registry.subscription(id) {
            Some(entry) => {
                if entry.telemeter {
                    self.telemetry.emit(Level::Info, Direction::Inbound, text);
                }
                entry.observer.deliver_next(payload);
            }
            None => {
                // The server clearly still tracks this stream; tell it to stop.
                self.telemetry.emit(
                    Level::Warning,
                    Direction::Inbound,
                    &format!("item for unknown subscription {id}; unsubscribing"),
                );
                outcome.replies.push(OutboundFrame {
                    json: wire::encode_request(&wire::Request::unsubscribe(id)),
                    telemeter: true,
                });
            }
        }
    }

    fn route_error(&self, id: u64, error: Value, text: &str) {
        if let Some(entry) = self.registry.take_pending(id) {
            if entry.telemeter {
                self.telemetry.emit(Level::Error, Direction::Inbound, text);
            }
            let _ = entry.settle.send(Err(RpcError::Server(error)));
            return;
        }
        if let Some(entry) = self.registry.subscription(id) {
            if entry.telemeter {
                self.telemetry.emit(Level::Error, Direction::Inbound, text);
            }
            entry.observer.deliver_error(error);
            return;
        }
        self.telemetry.emit(
            Level::Warning,
            Direction::Inbound,
            &format!("error for unknown id {id} dropped"),
        );
    }
}

#[cfg(test)]
#[path = "router_test.rs"]
mod tests;
