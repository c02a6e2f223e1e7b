//! Connection manager: one transport, hidden failures.
//!
//! LIFECYCLE
//! =========
//! 1. `Connecting` → dial the endpoint
//! 2. `Connected` → drain the send buffer FIFO, then relay frames both ways
//! 3. transport close or error → `Disconnected`, fixed-delay sleep, retry
//!
//! The loop retries forever; connection loss settles nothing. Frames
//! submitted while not connected wait in the buffer in submission order and
//! are transmitted exactly once on open. The task exits only when every
//! handle to the outbound channel is gone, i.e. the client was dropped.

use std::collections::VecDeque;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::router::Router;
use crate::telemetry::{Direction, Level, Telemetry};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle state of the logical connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// A dial attempt is in progress.
    Connecting,
    /// The transport is open.
    Connected,
    /// The backend announced a restart/recompile; the transport is still open.
    Reloaded,
    /// No transport; a retry is scheduled (or the task has not started yet).
    Disconnected,
}

impl ConnectionState {
    /// Whether frames can currently be transmitted.
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::Reloaded)
    }
}

/// One serialized outbound frame plus its telemetry flag.
pub(crate) struct OutboundFrame {
    pub json: String,
    pub telemeter: bool,
}

/// Why a connected session ended.
enum SessionEnd {
    /// The transport closed or errored; the retry loop takes over.
    Transport,
    /// All senders are gone; the client was dropped, stop for good.
    HandlesGone,
}

pub(crate) struct ConnectionTask {
    url: String,
    retry_delay: Duration,
    rx: mpsc::UnboundedReceiver<OutboundFrame>,
    state: watch::Sender<ConnectionState>,
    telemetry: Telemetry,
    router: Router,
    buffer: VecDeque<OutboundFrame>,
}

impl ConnectionTask {
    pub(crate) fn new(
        url: String,
        retry_delay: Duration,
        rx: mpsc::UnboundedReceiver<OutboundFrame>,
        state: watch::Sender<ConnectionState>,
        telemetry: Telemetry,
        router: Router,
    ) -> Self {
        Self {
            url,
            retry_delay,
            rx,
            state,
            telemetry,
            router,
            buffer: VecDeque::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            self.state.send_replace(ConnectionState::Connecting);
            self.telemetry.emit(
                Level::Info,
                Direction::Internal,
                &format!("connecting to {}", self.url),
            );

            match connect_async(self.url.as_str()).await {
                Ok((stream, _)) => {
                    self.state.send_replace(ConnectionState::Connected);
                    self.telemetry
                        .emit(Level::Info, Direction::Internal, "connection open");
                    let end = self.relay(stream).await;
                    self.state.send_replace(ConnectionState::Disconnected);
                    if matches!(end, SessionEnd::HandlesGone) {
                        return;
                    }
                    self.telemetry
                        .emit(Level::Warning, Direction::Internal, "connection lost");
                }
                Err(error) => {
                    self.state.send_replace(ConnectionState::Disconnected);
                    self.telemetry.emit(
                        Level::Warning,
                        Direction::Internal,
                        &format!("connect failed: {error}"),
                    );
                }
            }

            if self.wait_before_retry().await {
                return;
            }
        }
    }

    /// Relay frames both ways until the transport dies.
    async fn relay(&mut self, stream: WsStream) -> SessionEnd {
        let Self {
            rx,
            state,
            telemetry,
            router,
            buffer,
            ..
        } = self;
        let (mut sink, mut source) = stream.split();

        // Frames queued while disconnected go out first, oldest first,
        // transmitted once and never re-buffered.
        while let Some(frame) = buffer.pop_front() {
            if transmit(&mut sink, telemetry, frame).await.is_err() {
                return SessionEnd::Transport;
            }
        }

        loop {
            tokio::select! {
                command = rx.recv() => {
                    let Some(frame) = command else {
                        return SessionEnd::HandlesGone;
                    };
                    if transmit(&mut sink, telemetry, frame).await.is_err() {
                        return SessionEnd::Transport;
                    }
                }
                message = source.next() => {
                    let Some(Ok(message)) = message else {
                        // Read error or EOF; both funnel into the close path.
                        return SessionEnd::Transport;
                    };
                    match message {
                        Message::Text(text) => {
                            let outcome = router.handle_text(text.as_str());
                            if outcome.hot_reload {
                                state.send_replace(ConnectionState::Reloaded);
                                telemetry.emit(
                                    Level::Info,
                                    Direction::Internal,
                                    "hot reload announced by server",
                                );
                            }
                            for reply in outcome.replies {
                                if transmit(&mut sink, telemetry, reply).await.is_err() {
                                    return SessionEnd::Transport;
                                }
                            }
                        }
                        Message::Close(_) => return SessionEnd::Transport,
                        _ => {}
                    }
                }
            }
        }
    }

    /// Sleep the fixed retry delay, buffering frames submitted meanwhile.
    /// Returns `true` when every sender is gone and the task should exit.
    async fn wait_before_retry(&mut self) -> bool {
        let sleep = tokio::time::sleep(self.retry_delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = &mut sleep => return false,
                command = self.rx.recv() => match command {
                    Some(frame) => self.buffer.push_back(frame),
                    None => return true,
                },
            }
        }
    }
}

async fn transmit(
    sink: &mut futures_util::stream::SplitSink<WsStream, Message>,
    telemetry: &Telemetry,
    frame: OutboundFrame,
) -> Result<(), ()> {
    if sink
        .send(Message::Text(frame.json.clone().into()))
        .await
        .is_err()
    {
        return Err(());
    }
    if frame.telemeter {
        telemetry.emit(Level::Info, Direction::Outbound, &frame.json);
    }
    Ok(())
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;
