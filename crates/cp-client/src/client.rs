//! Public realtime client.
//!
//! `RealtimeClient` is a cheap-to-clone handle. Construct one at startup and
//! hand clones to every consumer; all of them share one connection, one
//! topic registry and one set of listeners.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use url::Url;

use cp_common::{RealtimeConfig, TransportMode};
use cp_protocol::{CheckpointUpdate, GroupStatusUpdate, HeartBeat, HelpQueueUpdate, Topic};

use crate::backoff::ReconnectPolicy;
use crate::connection::{self, ConnectionState, ManagerCommand};
use crate::events::{listener, Event, EventKind, Fanout, Listener};
use crate::registry::{SubscriptionId, TopicRegistry};
use crate::transport::{Connector, TransportError, WsConnector};

/// Connection settings for a [`RealtimeClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub endpoint: Url,
    pub transport: TransportMode,
    pub reconnect: ReconnectPolicy,
    /// Heart-beats offered in CONNECT.
    pub heart_beat: HeartBeat,
    pub connect_timeout: Duration,
}

impl ClientOptions {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            transport: TransportMode::default(),
            reconnect: ReconnectPolicy::default(),
            heart_beat: HeartBeat::new(
                cp_protocol::DEFAULT_HEARTBEAT_MS,
                cp_protocol::DEFAULT_HEARTBEAT_MS,
            ),
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn from_config(cfg: &RealtimeConfig) -> Result<Self, TransportError> {
        let endpoint = Url::parse(&cfg.url)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", cfg.url, e)))?;
        Ok(Self {
            endpoint,
            transport: cfg.transport,
            reconnect: ReconnectPolicy::from_config(cfg),
            heart_beat: HeartBeat::new(cfg.heartbeat_outgoing_ms, cfg.heartbeat_incoming_ms),
            connect_timeout: cfg.connect_timeout(),
        })
    }
}

/// Handle to the running connection manager.
struct Manager {
    commands: mpsc::UnboundedSender<ManagerCommand>,
    task: JoinHandle<()>,
}

struct Inner {
    state: ConnectionState,
    /// Bumped by `disconnect()`; a manager only acts while its generation is current.
    generation: u64,
    registry: TopicRegistry,
    manager: Option<Manager>,
}

/// State shared between client handles and the connection manager task.
pub(crate) struct Shared {
    pub options: ClientOptions,
    pub connector: Arc<dyn Connector>,
    inner: Mutex<Inner>,
    listeners: Fanout,
    state_tx: watch::Sender<ConnectionState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    /// Move to `state` and notify status listeners if it changed.
    pub fn set_state(&self, generation: u64, state: ConnectionState) {
        {
            let mut inner = self.lock();
            if inner.generation != generation || inner.state == state {
                return;
            }
            inner.state = state;
        }
        tracing::info!(%state, "Connection state changed");
        self.state_tx.send_replace(state);
        self.dispatch(generation, &Event::Status(state));
    }

    /// Fresh handles for desired topics; empty for a stale manager.
    pub fn reconcile(&self, generation: u64) -> Vec<(SubscriptionId, Topic)> {
        let mut inner = self.lock();
        if inner.generation != generation {
            return Vec::new();
        }
        inner.registry.reconcile()
    }

    pub fn invalidate(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation {
            inner.registry.invalidate();
        }
    }

    pub fn resolve(&self, generation: u64, subscription: &str) -> Option<Topic> {
        let inner = self.lock();
        if inner.generation != generation {
            return None;
        }
        inner.registry.resolve(subscription).cloned()
    }

    /// Fan an event out unless the client was disconnected meanwhile.
    pub fn dispatch(&self, generation: u64, event: &Event) -> usize {
        if !self.is_current(generation) {
            return 0;
        }
        self.listeners.dispatch(event)
    }

    /// Invalidate the current generation, clear topics and listeners and tell
    /// the manager to release live handles and exit.
    fn stop(&self) -> Option<JoinHandle<()>> {
        let (manager, live) = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.state = ConnectionState::Disconnected;
            let live = inner.registry.clear();
            (inner.manager.take(), live)
        };
        self.listeners.clear();
        self.state_tx.send_replace(ConnectionState::Disconnected);

        let manager = manager?;
        for id in live {
            let _ = manager.commands.send(ManagerCommand::Release(id));
        }
        let _ = manager.commands.send(ManagerCommand::Shutdown);
        tracing::info!("Realtime client disconnected");
        Some(manager.task)
    }
}

/// Held by every clone of a [`RealtimeClient`]; the manager task does not
/// hold one, so dropping the last handle stops the manager.
struct HandleGuard(Arc<Shared>);

impl Drop for HandleGuard {
    fn drop(&mut self) {
        let _ = self.0.stop();
    }
}

/// Reconnecting pub/sub client for checkpoint, group and help-queue updates.
#[derive(Clone)]
pub struct RealtimeClient {
    shared: Arc<Shared>,
    _guard: Arc<HandleGuard>,
}

impl RealtimeClient {
    /// Client using the WebSocket transport named in `options`.
    pub fn new(options: ClientOptions) -> Self {
        let connector = WsConnector::new(options.transport);
        Self::with_connector(options, connector)
    }

    pub fn with_connector(options: ClientOptions, connector: impl Connector) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let shared = Arc::new(Shared {
            options,
            connector: Arc::new(connector),
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                generation: 0,
                registry: TopicRegistry::default(),
                manager: None,
            }),
            listeners: Fanout::default(),
            state_tx,
        });
        Self {
            _guard: Arc::new(HandleGuard(Arc::clone(&shared))),
            shared,
        }
    }

    // ─── Lifecycle ───────────────────────────────────────────

    /// Start connecting. No-op when already started or when called
    /// outside a tokio runtime.
    pub fn init(&self) {
        let mut inner = self.shared.lock();
        if inner.manager.is_some() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!("RealtimeClient::init called outside a tokio runtime");
            return;
        };

        let (commands, rx) = mpsc::unbounded_channel();
        let task = runtime.spawn(connection::connection_manager(
            Arc::clone(&self.shared),
            inner.generation,
            rx,
        ));
        inner.manager = Some(Manager { commands, task });
        tracing::debug!(endpoint = %self.shared.options.endpoint, "Realtime client started");
    }

    /// Release every topic, drop every listener and stop the connection
    /// manager. Safe to call repeatedly; a later `init()` starts clean.
    /// Dropping the last clone of the client does the same.
    pub fn disconnect(&self) {
        self.shared.stop();
    }

    /// `disconnect()` and wait until the manager has sent DISCONNECT and exited.
    pub async fn shutdown(&self) {
        if let Some(task) = self.shared.stop() {
            if let Err(e) = task.await {
                tracing::warn!("Connection manager ended abnormally: {}", e);
            }
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Watch connection state from async code.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    // ─── Topics ──────────────────────────────────────────────

    /// Subscribe to a topic, starting the client if needed.
    /// Returns `false` if the topic was already subscribed, or if its id is
    /// empty or contains `/` and the broker would not route it.
    pub fn subscribe(&self, topic: Topic) -> bool {
        if Topic::parse(topic.destination()).is_none() {
            tracing::warn!(destination = %topic, "Refusing unroutable topic");
            return false;
        }
        {
            let mut inner = self.shared.lock();
            if !inner.registry.insert(topic.clone()) {
                tracing::debug!(destination = %topic, "Already subscribed");
                return false;
            }
        }
        tracing::info!(destination = %topic, "Subscribed");
        self.init();
        self.send(ManagerCommand::Reconcile);
        true
    }

    /// Unsubscribe from a destination. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, destination: &str) -> bool {
        let removed = self.shared.lock().registry.remove(destination);
        let Some(subscription) = removed else {
            return false;
        };
        tracing::info!(%destination, "Unsubscribed");
        if let Some(id) = subscription.live {
            self.send(ManagerCommand::Release(id));
        }
        true
    }

    pub fn subscribe_to_lab(&self, lab_id: &str) {
        for topic in Topic::lab(lab_id) {
            self.subscribe(topic);
        }
    }

    pub fn unsubscribe_from_lab(&self, lab_id: &str) {
        for topic in Topic::lab(lab_id) {
            self.unsubscribe(topic.destination());
        }
    }

    pub fn subscribe_to_group(&self, group_id: &str) {
        for topic in Topic::group(group_id) {
            self.subscribe(topic);
        }
    }

    pub fn unsubscribe_from_group(&self, group_id: &str) {
        for topic in Topic::group(group_id) {
            self.unsubscribe(topic.destination());
        }
    }

    /// Subscribe to the legacy multiplexed `/topic/group-updates`.
    pub fn subscribe_legacy(&self) -> bool {
        self.subscribe(Topic::legacy())
    }

    pub fn unsubscribe_legacy(&self) -> bool {
        self.unsubscribe(cp_protocol::topic::LEGACY_GROUP_UPDATES)
    }

    /// Currently desired topics, sorted by destination.
    pub fn topics(&self) -> Vec<Topic> {
        self.shared.lock().registry.topics()
    }

    fn send(&self, command: ManagerCommand) {
        let inner = self.shared.lock();
        if let Some(manager) = &inner.manager {
            let _ = manager.commands.send(command);
        }
    }

    // ─── Listeners ───────────────────────────────────────────

    /// Register `listener` for `kind`. Returns `false` if already registered.
    pub fn add_listener(&self, kind: EventKind, listener: &Listener) -> bool {
        self.shared.listeners.add(kind, listener)
    }

    /// Unregister `listener` from `kind`. Returns `false` if it was not registered.
    pub fn remove_listener(&self, kind: EventKind, listener: &Listener) -> bool {
        self.shared.listeners.remove(kind, listener)
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.shared.listeners.len(kind)
    }

    pub fn on_checkpoint_update<F>(&self, f: F) -> Listener
    where
        F: Fn(&CheckpointUpdate) + Send + Sync + 'static,
    {
        self.register(EventKind::Checkpoint, move |event| {
            if let Event::Checkpoint(update) = event {
                f(update);
            }
        })
    }

    pub fn off_checkpoint_update(&self, listener: &Listener) -> bool {
        self.remove_listener(EventKind::Checkpoint, listener)
    }

    pub fn on_group_status_update<F>(&self, f: F) -> Listener
    where
        F: Fn(&GroupStatusUpdate) + Send + Sync + 'static,
    {
        self.register(EventKind::GroupStatus, move |event| {
            if let Event::GroupStatus(update) = event {
                f(update);
            }
        })
    }

    pub fn off_group_status_update(&self, listener: &Listener) -> bool {
        self.remove_listener(EventKind::GroupStatus, listener)
    }

    pub fn on_help_queue_update<F>(&self, f: F) -> Listener
    where
        F: Fn(&HelpQueueUpdate) + Send + Sync + 'static,
    {
        self.register(EventKind::HelpQueue, move |event| {
            if let Event::HelpQueue(update) = event {
                f(update);
            }
        })
    }

    pub fn off_help_queue_update(&self, listener: &Listener) -> bool {
        self.remove_listener(EventKind::HelpQueue, listener)
    }

    /// Listen to raw payloads from the legacy topic.
    pub fn on_generic_update<F>(&self, f: F) -> Listener
    where
        F: Fn(&serde_json::Value) + Send + Sync + 'static,
    {
        self.register(EventKind::Generic, move |event| {
            if let Event::Generic(value) = event {
                f(value);
            }
        })
    }

    pub fn off_generic_update(&self, listener: &Listener) -> bool {
        self.remove_listener(EventKind::Generic, listener)
    }

    pub fn add_status_listener<F>(&self, f: F) -> Listener
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.register(EventKind::Status, move |event| {
            if let Event::Status(state) = event {
                f(*state);
            }
        })
    }

    pub fn remove_status_listener(&self, listener: &Listener) -> bool {
        self.remove_listener(EventKind::Status, listener)
    }

    fn register<F>(&self, kind: EventKind, f: F) -> Listener
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let listener = listener(f);
        self.shared.listeners.add(kind, &listener);
        listener
    }
}
