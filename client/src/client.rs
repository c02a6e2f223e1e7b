//! The client runtime: one logical connection, many multiplexed services.
//!
//! ARCHITECTURE
//! ============
//! `Client` is a cheap handle over shared internals. `invoke` classifies the
//! call against the build-time name tables, allocates a correlation id,
//! registers the exchange, and hands the serialized envelope to the
//! connection task. Inbound routing lives in [`crate::router`]; the task in
//! [`crate::connection`]. There is no global state: independent clients are
//! fully isolated, which is what lets the tests run sessions side by side.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Duration;

use crate::config::ClientConfig;
use crate::connection::{ConnectionState, ConnectionTask, OutboundFrame};
use crate::error::RpcError;
use crate::methods::{CallKind, MethodSets};
use crate::observer::{ObserverSlots, Subscription};
use crate::registry::Registry;
use crate::router::Router;
use crate::telemetry::{Direction, Level, NoopSink, Telemetry, TelemetrySink};

/// Per-call knobs. The defaults match the plain `invoke` path.
#[derive(Clone, Copy, Debug)]
pub struct CallOptions {
    /// Feed this exchange to the telemetry sink. The log viewer's own
    /// traffic turns this off to avoid feeding on itself.
    pub telemeter: bool,
    /// Reject the deferred result and drop the registry entry after this
    /// long. `None` falls back to the config default.
    pub deadline: Option<Duration>,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            telemeter: true,
            deadline: None,
        }
    }
}

/// What `invoke` produced, decided by classification.
pub enum Call {
    /// A request-style exchange; await the response.
    Response(PendingCall),
    /// A subscription-style exchange; items arrive through the handle.
    Stream(Subscription),
}

impl std::fmt::Debug for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Call::Response(pending) => f.debug_tuple("Response").field(&pending.id).finish(),
            Call::Stream(sub) => f.debug_tuple("Stream").field(&sub.id()).finish(),
        }
    }
}

impl std::fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCall").field("id", &self.id).finish()
    }
}

/// Deferred result of a request-style call.
pub struct PendingCall {
    id: u64,
    rx: oneshot::Receiver<Result<Value, RpcError>>,
    deadline: Option<Duration>,
    registry: Arc<Registry>,
}

impl PendingCall {
    /// Correlation id of this exchange.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the server's response.
    ///
    /// Connection loss does not fail this future; it resolves when a
    /// genuine response arrives on whatever connection is up by then, or
    /// when the deadline (if any) elapses.
    ///
    /// # Errors
    ///
    /// [`RpcError::Server`] with the payload verbatim when the server
    /// rejects the call, [`RpcError::DeadlineElapsed`] on expiry,
    /// [`RpcError::ClientClosed`] when the runtime is gone.
    pub async fn wait(self) -> Result<Value, RpcError> {
        match self.deadline {
            Some(limit) => match tokio::time::timeout(limit, self.rx).await {
                Ok(settled) => settled.unwrap_or(Err(RpcError::ClientClosed)),
                Err(_) => {
                    self.registry.forget_pending(self.id);
                    Err(RpcError::DeadlineElapsed)
                }
            },
            None => self.rx.await.unwrap_or(Err(RpcError::ClientClosed)),
        }
    }
}

struct Inner {
    methods: MethodSets,
    config: ClientConfig,
    registry: Arc<Registry>,
    telemetry: Telemetry,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    state: watch::Receiver<ConnectionState>,
    /// Parked connection task; taken exactly once by `ensure_started`.
    task: Mutex<Option<ConnectionTask>>,
}

/// Handle to one logical dev-console session.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Build a client with no telemetry sink.
    #[must_use]
    pub fn new(config: ClientConfig, methods: MethodSets) -> Self {
        Self::with_telemetry(config, methods, Arc::new(NoopSink))
    }

    /// Build a client reporting every frame to `sink`.
    #[must_use]
    pub fn with_telemetry(
        config: ClientConfig,
        methods: MethodSets,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        let telemetry = Telemetry::new(sink);
        let registry = Arc::new(Registry::new());
        let (outbound, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let task = ConnectionTask::new(
            config.endpoint.clone(),
            config.retry_delay,
            rx,
            state_tx,
            telemetry.clone(),
            Router::new(Arc::clone(&registry), telemetry.clone()),
        );

        Self {
            inner: Arc::new(Inner {
                methods,
                config,
                registry,
                telemetry,
                outbound,
                state,
                task: Mutex::new(Some(task)),
            }),
        }
    }

    /// Start the connection loop if it is not already running. Idempotent;
    /// `invoke` calls this on the first successful classification.
    pub fn ensure_started(&self) {
        let Some(task) = self.inner.task.lock().take() else {
            return;
        };
        self.inner
            .telemetry
            .emit(Level::Info, Direction::Internal, "starting connection loop");
        tokio::spawn(task.run());
    }

    /// Observe connection lifecycle transitions, hot reloads included.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.clone()
    }

    /// Call a remote operation; classification picks the exchange shape.
    ///
    /// # Errors
    ///
    /// [`RpcError::MethodNotRecognized`] when `namespace.name` is in
    /// neither name table. Nothing is sent in that case.
    pub fn invoke(&self, namespace: &str, name: &str, params: Value) -> Result<Call, RpcError> {
        self.invoke_with(namespace, name, params, CallOptions::default())
    }

    /// [`Client::invoke`] with explicit per-call options.
    ///
    /// # Errors
    ///
    /// See [`Client::invoke`].
    pub fn invoke_with(
        &self,
        namespace: &str,
        name: &str,
        params: Value,
        options: CallOptions,
    ) -> Result<Call, RpcError> {
        let method = MethodSets::qualify(namespace, name);
        match self.inner.methods.classify(&method) {
            Some(CallKind::Request) => {
                Ok(Call::Response(self.start_request(method, params, options)))
            }
            Some(CallKind::Subscription) => {
                Ok(Call::Stream(self.start_subscription(method, params, options)))
            }
            None => Err(RpcError::MethodNotRecognized(method)),
        }
    }

    fn start_request(&self, method: String, params: Value, options: CallOptions) -> PendingCall {
        self.ensure_started();
        let id = self.inner.registry.allocate_id();
        let json = wire::encode_request(&wire::Request::call(method, params, id));

        let (settle, rx) = oneshot::channel();
        self.inner
            .registry
            .insert_pending(id, settle, options.telemeter);
        self.send_raw(json, options.telemeter);

        PendingCall {
            id,
            rx,
            deadline: options.deadline.or(self.inner.config.default_deadline),
            registry: Arc::clone(&self.inner.registry),
        }
    }

    fn start_subscription(
        &self,
        method: String,
        params: Value,
        options: CallOptions,
    ) -> Subscription {
        self.ensure_started();
        let id = self.inner.registry.allocate_id();
        let json = wire::encode_request(&wire::Request::call(method, params, id));

        let slots = Arc::new(ObserverSlots::new());
        self.inner
            .registry
            .insert_subscription(id, Arc::clone(&slots), options.telemeter);
        self.send_raw(json, options.telemeter);

        Subscription::new(
            id,
            slots,
            options.telemeter,
            Arc::clone(&self.inner.registry),
            self.inner.outbound.clone(),
        )
    }

    /// Fluent per-namespace wrapper over [`Client::invoke`].
    #[must_use]
    pub fn service(&self, namespace: &str) -> Service {
        Service {
            client: self.clone(),
            namespace: namespace.to_owned(),
        }
    }

    fn send_raw(&self, json: String, telemeter: bool) {
        // Fails only when the task is gone, i.e. the runtime is shutting down.
        let _ = self.inner.outbound.send(OutboundFrame { json, telemeter });
    }
}

/// Thin namespace-scoped view of a [`Client`].
#[derive(Clone)]
pub struct Service {
    client: Client,
    namespace: String,
}

impl Service {
    /// Namespace this view is scoped to.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Call an operation in this namespace; classification picks the shape.
    ///
    /// # Errors
    ///
    /// See [`Client::invoke`].
    pub fn call(&self, name: &str, params: Value) -> Result<Call, RpcError> {
        self.client.invoke(&self.namespace, name, params)
    }

    /// Call a request-style operation.
    ///
    /// # Errors
    ///
    /// [`RpcError::KindMismatch`] when the name classifies as a
    /// subscription (nothing is sent); otherwise see [`Client::invoke`].
    pub fn request(&self, name: &str, params: Value) -> Result<PendingCall, RpcError> {
        let method = self.check_kind(name, CallKind::Request)?;
        Ok(self
            .client
            .start_request(method, params, CallOptions::default()))
    }

    /// Call a subscription-style operation.
    ///
    /// # Errors
    ///
    /// [`RpcError::KindMismatch`] when the name classifies as a request
    /// (nothing is sent); otherwise see [`Client::invoke`].
    pub fn subscribe(&self, name: &str, params: Value) -> Result<Subscription, RpcError> {
        let method = self.check_kind(name, CallKind::Subscription)?;
        Ok(self
            .client
            .start_subscription(method, params, CallOptions::default()))
    }

    /// Reject misses and kind mismatches before any frame is produced.
    fn check_kind(&self, name: &str, expected: CallKind) -> Result<String, RpcError> {
        let method = MethodSets::qualify(&self.namespace, name);
        match self.client.inner.methods.classify(&method) {
            Some(kind) if kind == expected => Ok(method),
            Some(_) => Err(RpcError::KindMismatch { method, expected }),
            None => Err(RpcError::MethodNotRecognized(method)),
        }
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
