//! Session state machine.
//!
//! A session owns one transport connection, an inbound worker that feeds
//! the chunk reassembler, and an outbound worker that forwards events.
//! A driver task consumes [`TransportEvent`]s and reassembled inbound
//! events and moves the session through its states:
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──begin forwarding──▶ Connected
//!      ▲                        │                                │
//!      └────────────── close (transient: reconnect) ◀────────────┘
//! ```
//!
//! Outbound events are held until the remote asks for forwarding. Every
//! socket open writes the client description directly, so it is always
//! the first frame of a connection; the queue stays paused behind it and
//! pauses again whenever the connection drops.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::LinkConfig;
use crate::error::{ConnectionError, Error, Result};
use crate::identifiers::SessionKey;
use crate::protocol::{ConnectionUrl, ControlCommand, Reassembler, SessionEvent};
use crate::transport::{CLOSE_NORMAL, SocketTransport, TransportEvent, TransportEvents};
use crate::worker::{SerialWorker, WorkHandler};

use super::builder::SessionBuilder;
use super::identity::SessionIdentity;
use super::listener::{EventSink, Plugin, SessionListener};
use super::phase::AuthorizerGate;
use super::store::ConnectionStore;

// ============================================================================
// SessionStatus
// ============================================================================

/// Connection status of a single [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No connection.
    Disconnected,
    /// Socket dialed or open, waiting for the remote to start forwarding.
    Connecting,
    /// Forwarding events.
    Connected,
}

// ============================================================================
// Internal Types
// ============================================================================

/// Work for the driver task besides transport events.
enum Signal {
    /// A reassembled inbound event.
    Inbound(SessionEvent),
    /// The reconnect delay elapsed.
    ReconnectDue,
}

/// Channel ends consumed by the driver task.
struct Receivers {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    signals: mpsc::UnboundedReceiver<Signal>,
}

/// Mutable session state.
struct SessionState {
    status: SessionStatus,
    reconnecting: bool,
    terminated: bool,
    /// Close classification that ended the session.
    closed_with: Option<ConnectionError>,
    url: Option<ConnectionUrl>,
    reconnect: Option<JoinHandle<()>>,
}

/// Parses inbound frames and feeds the reassembler.
struct InboundHandler {
    reassembler: Reassembler,
}

#[async_trait]
impl WorkHandler<String> for InboundHandler {
    async fn handle(&self, text: &String) -> Result<bool> {
        let event = SessionEvent::from_json(text)?;
        self.reassembler.on_event(event)?;
        Ok(true)
    }
}

/// Writes outbound events to the socket, keeping them while it is down.
struct OutboundHandler {
    key: SessionKey,
    transport: Arc<dyn SocketTransport>,
}

#[async_trait]
impl WorkHandler<SessionEvent> for OutboundHandler {
    async fn handle(&self, event: &SessionEvent) -> Result<bool> {
        let text = event.to_json()?;
        match self.transport.send(text).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_connection_error() => {
                debug!(session = %self.key, error = %e, "Send failed, event kept");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// Shared session internals.
struct SessionInner {
    key: SessionKey,
    config: Arc<LinkConfig>,
    identity: SessionIdentity,
    transport: Arc<dyn SocketTransport>,
    store: Arc<dyn ConnectionStore>,
    listener: Arc<dyn SessionListener>,
    plugins: Vec<Arc<dyn Plugin>>,
    authorizer: Arc<AuthorizerGate>,
    inbound: SerialWorker<String>,
    outbound: SerialWorker<SessionEvent>,
    /// Client description prepared at construction for the first open.
    handshake: Mutex<Option<SessionEvent>>,
    sink: EventSink,
    events_tx: TransportEvents,
    signal_tx: mpsc::UnboundedSender<Signal>,
    receivers: Mutex<Option<Receivers>>,
    state: Mutex<SessionState>,
}

/// One authenticated connection to a remote inspection session.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.inner.key)
            .field("status", &self.status())
            .field("reconnecting", &self.is_reconnecting())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Session - Construction
// ============================================================================

impl Session {
    /// Creates a session builder.
    #[inline]
    #[must_use]
    pub fn builder(config: Arc<LinkConfig>, identity: SessionIdentity) -> SessionBuilder {
        SessionBuilder::new(config, identity)
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn from_parts(
        key: SessionKey,
        config: Arc<LinkConfig>,
        identity: SessionIdentity,
        transport: Arc<dyn SocketTransport>,
        store: Arc<dyn ConnectionStore>,
        listener: Arc<dyn SessionListener>,
        plugins: Vec<Arc<dyn Plugin>>,
        authorizer: Arc<AuthorizerGate>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        let notify_tx = signal_tx.clone();
        let reassembler = Reassembler::new(Box::new(move |event| {
            let _ = notify_tx.send(Signal::Inbound(event));
        }));

        let inbound = SerialWorker::new(
            format!("{key}-inbound"),
            Arc::new(InboundHandler { reassembler }),
            config.worker,
        );
        let outbound = SerialWorker::new(
            format!("{key}-outbound"),
            Arc::new(OutboundHandler {
                key,
                transport: Arc::clone(&transport),
            }),
            config.worker,
        );

        let handshake = SessionEvent::client_info(config.vendor_id.clone(), &config.client_info());
        let sink = EventSink::new(outbound.clone(), config.vendor_id.clone());

        debug!(session = %key, plugins = plugins.len(), "Session created");

        Self {
            inner: Arc::new(SessionInner {
                key,
                config,
                identity,
                transport,
                store,
                listener,
                plugins,
                authorizer,
                inbound,
                outbound,
                handshake: Mutex::new(Some(handshake)),
                sink,
                events_tx,
                signal_tx,
                receivers: Mutex::new(Some(Receivers {
                    events: events_rx,
                    signals: signal_rx,
                })),
                state: Mutex::new(SessionState {
                    status: SessionStatus::Disconnected,
                    reconnecting: false,
                    terminated: false,
                    closed_with: None,
                    url: None,
                    reconnect: None,
                }),
            }),
        }
    }
}

// ============================================================================
// Session - Accessors
// ============================================================================

impl Session {
    /// Returns the process-local session key.
    #[inline]
    #[must_use]
    pub fn key(&self) -> SessionKey {
        self.inner.key
    }

    /// Returns the credentials this session connects with.
    #[inline]
    #[must_use]
    pub fn identity(&self) -> &SessionIdentity {
        &self.inner.identity
    }

    /// Returns the current status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.inner.state.lock().status
    }

    /// Returns `true` while an automatic reconnect is scheduled.
    #[inline]
    #[must_use]
    pub fn is_reconnecting(&self) -> bool {
        self.inner.state.lock().reconnecting
    }

    /// Returns `true` once the session has been torn down.
    #[inline]
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.inner.state.lock().terminated
    }

    /// Returns the URL of the latest connection attempt.
    #[must_use]
    pub fn connection_url(&self) -> Option<ConnectionUrl> {
        self.inner.state.lock().url.clone()
    }

    /// Returns the number of events waiting to be forwarded.
    #[inline]
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.inner.outbound.len()
    }
}

// ============================================================================
// Session - Operations
// ============================================================================

impl Session {
    /// Opens the connection.
    ///
    /// Missing `sessionId` and `orgId` fall back to the stored connection.
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingOrganization`] if no org id can be resolved
    /// - [`Error::Disconnected`] if a terminal close code ended the session
    /// - [`Error::UnexpectedState`] if the session was otherwise terminated
    /// - [`Error::Url`] if the socket URL cannot be built
    pub fn connect(&self) -> Result<()> {
        SessionInner::connect(&self.inner)
    }

    /// Queues an event for forwarding.
    ///
    /// Queued events are written once the remote begins forwarding. Returns `false` once the session is terminated or the queue is full.
    pub fn queue_event(&self, event: SessionEvent) -> bool {
        self.inner.outbound.offer(event)
    }

    /// Tears the session down intentionally.
    ///
    /// Stops both workers, clears the stored connection and closes the
    /// socket with a normal close code. No reconnect follows.
    pub fn disconnect(&self) {
        info!(session = %self.inner.key, "Disconnecting session");
        self.inner.teardown(None, true);
    }
}

// ============================================================================
// SessionInner - Connection
// ============================================================================

impl SessionInner {
    fn connect(self: &Arc<Self>) -> Result<()> {
        {
            let state = self.state.lock();
            if state.terminated {
                return Err(match state.closed_with {
                    Some(error) => error.into(),
                    None => Error::unexpected_state(format!("session {} is terminated", self.key)),
                });
            }
        }

        let url = self.resolve_url()?;
        let socket_url = url.to_url()?;

        {
            let mut state = self.state.lock();
            state.status = SessionStatus::Connecting;
            state.url = Some(url);
        }

        self.spawn_driver();

        info!(
            session = %self.key,
            host = socket_url.host_str().unwrap_or_default(),
            "Connecting session"
        );
        self.transport.connect(socket_url, self.events_tx.clone());
        Ok(())
    }

    /// Resolves connection parameters, falling back to the stored URL.
    fn resolve_url(&self) -> Result<ConnectionUrl> {
        let stored = match self.store.load() {
            Ok(Some(text)) => ConnectionUrl::parse(&text)
                .inspect_err(|e| warn!(session = %self.key, error = %e, "Ignoring stored connection"))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(session = %self.key, error = %e, "Failed to load stored connection");
                None
            }
        };

        let org_id = self
            .config
            .org_id
            .clone()
            .or_else(|| stored.as_ref().map(|url| url.org_id.clone()))
            .filter(|org| !org.is_empty())
            .ok_or(Error::MissingOrganization)?;

        let session_id = self
            .identity
            .session_id
            .clone()
            .or_else(|| stored.as_ref().map(|url| url.session_id.clone()))
            .unwrap_or_default();

        let host = self
            .identity
            .environment
            .unwrap_or_default()
            .host(&self.config.socket_domain);

        Ok(ConnectionUrl {
            host,
            session_id,
            token: self.identity.token.clone(),
            org_id,
            client_id: self.config.client_id.to_string(),
        })
    }

    fn spawn_driver(self: &Arc<Self>) {
        let Some(receivers) = self.receivers.lock().take() else {
            return;
        };
        tokio::spawn(Self::drive(Arc::downgrade(self), receivers, self.key));
    }

    /// Driver loop. Holds only a weak reference so dropping every
    /// [`Session`] handle ends it.
    async fn drive(weak: Weak<Self>, mut receivers: Receivers, key: SessionKey) {
        enum Next {
            Transport(TransportEvent),
            Signal(Signal),
        }

        loop {
            let next = tokio::select! {
                event = receivers.events.recv() => event.map(Next::Transport),
                signal = receivers.signals.recv() => signal.map(Next::Signal),
            };

            let Some(next) = next else { break };
            let Some(inner) = weak.upgrade() else { break };
            if inner.state.lock().terminated {
                break;
            }

            match next {
                Next::Transport(event) => inner.on_transport_event(event).await,
                Next::Signal(Signal::Inbound(event)) => inner.on_inbound(event),
                Next::Signal(Signal::ReconnectDue) => inner.on_reconnect_due(),
            }

            if inner.state.lock().terminated {
                break;
            }
        }

        debug!(session = %key, "Session driver terminated");
    }
}

// ============================================================================
// SessionInner - Event Handling
// ============================================================================

impl SessionInner {
    async fn on_transport_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::Open => self.on_open().await,
            TransportEvent::Message(text) => {
                if !self.inbound.offer(text) {
                    warn!(session = %self.key, "Inbound queue rejected frame");
                }
            }
            TransportEvent::Error(message) => {
                warn!(session = %self.key, error = %message, "Transport error");
            }
            TransportEvent::Closed { code, reason } => self.on_closed(code, &reason),
        }
    }

    async fn on_open(&self) {
        let url = self.state.lock().url.clone();
        if let Some(url) = url {
            let saved = url
                .to_url()
                .and_then(|socket_url| self.store.save(socket_url.as_str()));
            if let Err(e) = saved {
                warn!(session = %self.key, error = %e, "Failed to persist connection");
            }
        }

        info!(session = %self.key, "Session socket open");
        self.inbound.start();

        // Outbound stays blocked until the remote begins forwarding; the
        // client description is the only frame written before that.
        let first = self.outbound.start_paused();
        let prepared = if first { self.handshake.lock().take() } else { None };
        let hello = prepared.unwrap_or_else(|| {
            SessionEvent::client_info(self.config.vendor_id.clone(), &self.config.client_info())
        });

        let sent = match hello.to_json() {
            Ok(text) => self.transport.send(text).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            warn!(session = %self.key, first, error = %e, "Failed to send client info");
        }
    }

    fn on_closed(self: &Arc<Self>, code: u16, reason: &str) {
        match ConnectionError::from_close_code(code) {
            Some(ConnectionError::Normal) => {
                info!(session = %self.key, code, reason, "Session closed by remote");
                self.teardown(None, false);
            }
            Some(error) if error.is_terminal() => {
                warn!(session = %self.key, code, reason, %error, "Session closed");
                self.teardown(Some(error), false);
            }
            error => self.on_transient_close(error, code, reason),
        }
    }

    fn on_transient_close(self: &Arc<Self>, error: Option<ConnectionError>, code: u16, reason: &str) {
        self.state.lock().status = SessionStatus::Disconnected;
        self.outbound.pause();

        for plugin in &self.plugins {
            plugin.on_disconnect();
        }

        let reconnecting = !self.authorizer.is_active();
        if reconnecting {
            self.schedule_reconnect();
        } else {
            debug!(session = %self.key, "Authorizer active, not reconnecting");
        }
        self.state.lock().reconnecting = reconnecting;

        warn!(session = %self.key, code, reason, reconnecting, "Session connection lost");
        self.listener.on_disconnected(error, reconnecting);
    }

    /// Schedules one reconnect, replacing any pending one.
    fn schedule_reconnect(&self) {
        let delay = self.config.reconnect_delay;
        let signals = self.signal_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = signals.send(Signal::ReconnectDue);
        });

        if let Some(previous) = self.state.lock().reconnect.replace(task) {
            previous.abort();
        }
        debug!(session = %self.key, ?delay, "Reconnect scheduled");
    }

    fn on_reconnect_due(self: &Arc<Self>) {
        let due = {
            let mut state = self.state.lock();
            state.reconnect = None;
            state.reconnecting = false;
            !state.terminated && state.status == SessionStatus::Disconnected
        };
        if !due {
            return;
        }

        info!(session = %self.key, "Reconnecting session");
        if let Err(e) = Self::connect(self) {
            error!(session = %self.key, error = %e, "Reconnect failed");
            self.teardown(None, true);
        }
    }

    fn on_inbound(&self, event: SessionEvent) {
        match ControlCommand::parse(&event) {
            Some(ControlCommand::BeginForwarding) => self.begin_forwarding(),
            Some(command) => {
                debug!(session = %self.key, command = command.name(), "Control command");
                for plugin in &self.plugins {
                    plugin.on_control(&command, &self.sink);
                }
            }
            None => {
                for plugin in &self.plugins {
                    plugin.on_event(&event);
                }
            }
        }
    }

    fn begin_forwarding(&self) {
        {
            let mut state = self.state.lock();
            if state.status == SessionStatus::Connected {
                debug!(session = %self.key, "Already forwarding");
                return;
            }
            state.status = SessionStatus::Connected;
            state.reconnecting = false;
        }

        self.outbound.resume();
        info!(session = %self.key, "Forwarding started");

        self.listener.on_connected();
        for plugin in &self.plugins {
            plugin.on_connect(&self.sink);
        }
    }

    /// Full teardown. Runs at most once.
    fn teardown(&self, error: Option<ConnectionError>, close_transport: bool) {
        let reconnect = {
            let mut state = self.state.lock();
            if state.terminated {
                return;
            }
            state.terminated = true;
            state.closed_with = error;
            state.status = SessionStatus::Disconnected;
            state.reconnecting = false;
            state.reconnect.take()
        };

        self.inbound.stop();
        self.outbound.stop();

        if let Err(e) = self.store.clear() {
            warn!(session = %self.key, error = %e, "Failed to clear stored connection");
        }

        self.listener.on_disconnected(error, false);
        for plugin in &self.plugins {
            plugin.on_terminate();
        }

        if let Some(task) = reconnect {
            task.abort();
        }
        if close_transport {
            self.transport.disconnect(CLOSE_NORMAL, "session terminated");
        }

        info!(session = %self.key, "Session terminated");
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(task) = state.reconnect.take() {
            task.abort();
        }
        if !state.terminated {
            self.transport.disconnect(CLOSE_NORMAL, "session dropped");
        }
        self.inbound.stop();
        self.outbound.stop();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use serde_json::json;

    use crate::protocol::EventType;
    use crate::session::phase::AuthorizationKind;
    use crate::session::store::MemoryStore;
    use crate::transport::testing::RecordingTransport;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Connected,
        Disconnected(Option<ConnectionError>, bool),
    }

    #[derive(Default)]
    struct RecordingListener {
        calls: Mutex<Vec<Call>>,
    }

    impl RecordingListener {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        fn last(&self) -> Option<Call> {
            self.calls.lock().last().cloned()
        }
    }

    impl SessionListener for RecordingListener {
        fn on_connected(&self) {
            self.calls.lock().push(Call::Connected);
        }

        fn on_disconnected(&self, error: Option<ConnectionError>, reconnecting: bool) {
            self.calls.lock().push(Call::Disconnected(error, reconnecting));
        }
    }

    #[derive(Default)]
    struct RecordingPlugin {
        lifecycle: Mutex<Vec<&'static str>>,
        events: Mutex<Vec<SessionEvent>>,
        controls: Mutex<Vec<ControlCommand>>,
    }

    impl Plugin for RecordingPlugin {
        fn name(&self) -> &str {
            "recording"
        }

        fn on_connect(&self, _sink: &EventSink) {
            self.lifecycle.lock().push("connect");
        }

        fn on_disconnect(&self) {
            self.lifecycle.lock().push("disconnect");
        }

        fn on_terminate(&self) {
            self.lifecycle.lock().push("terminate");
        }

        fn on_event(&self, event: &SessionEvent) {
            self.events.lock().push(event.clone());
        }

        fn on_control(&self, command: &ControlCommand, sink: &EventSink) {
            self.controls.lock().push(command.clone());
            if *command == ControlCommand::TakeScreenshot {
                sink.send(SessionEvent::blob(sink.vendor_id(), "image/png", b"png"));
            }
        }
    }

    struct Harness {
        session: Session,
        transport: Arc<RecordingTransport>,
        store: Arc<MemoryStore>,
        listener: Arc<RecordingListener>,
        plugin: Arc<RecordingPlugin>,
        authorizer: Arc<AuthorizerGate>,
    }

    fn config(org_id: Option<&str>) -> Arc<LinkConfig> {
        let mut builder = LinkConfig::builder()
            .vendor_id("acme")
            .socket_domain("inspect.example.com")
            .registrar_base("https://api.example.com/quickconnect");
        if let Some(org_id) = org_id {
            builder = builder.org_id(org_id);
        }
        Arc::new(builder.build().expect("valid config"))
    }

    fn harness_with(config: Arc<LinkConfig>, identity: SessionIdentity) -> Harness {
        let transport = Arc::new(RecordingTransport::default());
        let store = Arc::new(MemoryStore::new());
        let listener = Arc::new(RecordingListener::default());
        let plugin = Arc::new(RecordingPlugin::default());
        let authorizer = Arc::new(AuthorizerGate::new());

        let session = Session::builder(config, identity)
            .transport(transport.clone())
            .store(store.clone())
            .listener(listener.clone())
            .plugin(plugin.clone())
            .authorizer(authorizer.clone())
            .build();

        Harness {
            session,
            transport,
            store,
            listener,
            plugin,
            authorizer,
        }
    }

    fn harness() -> Harness {
        harness_with(
            config(Some("org-1")),
            SessionIdentity::new("123456").with_session_id("sess-1"),
        )
    }

    /// Lets every task run until idle.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    fn log_event(message: &str) -> SessionEvent {
        SessionEvent::log("acme", "info", message)
    }

    fn begin_forwarding() -> SessionEvent {
        ControlCommand::BeginForwarding.to_event("remote")
    }

    fn closed(code: u16) -> TransportEvent {
        TransportEvent::Closed {
            code,
            reason: String::new(),
        }
    }

    fn sent_types(transport: &RecordingTransport) -> Vec<EventType> {
        transport
            .sent_events()
            .iter()
            .map(SessionEvent::event_type)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_without_org_fails_fast() {
        let h = harness_with(config(None), SessionIdentity::new("123456"));

        let err = h.session.connect().unwrap_err();
        assert!(matches!(err, Error::MissingOrganization));
        assert!(h.transport.connects().is_empty());
        assert_eq!(h.session.status(), SessionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_falls_back_to_stored_connection() {
        let h = harness_with(config(None), SessionIdentity::new("654321"));
        h.store
            .save("wss://inspect.example.com/client/v1?sessionId=old&token=x&orgId=org-stored&clientId=c")
            .expect("save");

        h.session.connect().expect("connect");

        let url = ConnectionUrl::parse(h.transport.connects()[0].as_str()).expect("url");
        assert_eq!(url.org_id, "org-stored");
        assert_eq!(url.session_id, "old");
        assert_eq!(url.token, "654321");
        assert_eq!(h.session.status(), SessionStatus::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_open_persists_url_and_sends_client_info_first() {
        let h = harness();
        assert!(h.session.queue_event(log_event("early")));

        h.session.connect().expect("connect");
        h.transport.emit(TransportEvent::Open);
        settle().await;

        assert_eq!(sent_types(&h.transport), vec![EventType::ClientInfo]);
        assert_eq!(h.session.pending_events(), 1);
        let stored = h.store.load().expect("load");
        assert_eq!(stored.as_deref(), Some(h.transport.connects()[0].as_str()));

        h.transport.emit_event(&begin_forwarding());
        settle().await;
        assert_eq!(sent_types(&h.transport), vec![EventType::ClientInfo, EventType::Log]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_connection_withholds_events_until_forwarding() {
        let h = harness();
        h.session.connect().expect("connect");
        h.transport.emit(TransportEvent::Open);
        settle().await;

        assert!(h.session.queue_event(log_event("after open")));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(sent_types(&h.transport), vec![EventType::ClientInfo]);
        assert_eq!(h.session.status(), SessionStatus::Connecting);

        h.transport.emit_event(&begin_forwarding());
        settle().await;
        assert_eq!(h.session.status(), SessionStatus::Connected);
        let sent = h.transport.sent_events();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].payload_str("message"), Some("after open"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abnormal_close_reconnects_then_terminal_close_clears_store() {
        let h = harness();
        h.session.connect().expect("connect");
        h.transport.emit(TransportEvent::Open);
        h.transport.emit_event(&begin_forwarding());
        settle().await;
        assert_eq!(h.session.status(), SessionStatus::Connected);

        h.transport.emit(closed(1006));
        settle().await;
        assert_eq!(
            h.listener.last(),
            Some(Call::Disconnected(Some(ConnectionError::Abnormal), true))
        );
        assert!(h.session.is_reconnecting());
        assert_eq!(h.transport.connects().len(), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.transport.connects().len(), 2);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.transport.connects().len(), 2);

        // Reconnected: client info goes out directly, queued events wait.
        h.transport.emit(TransportEvent::Open);
        settle().await;
        assert!(h.session.queue_event(log_event("while paused")));
        settle().await;
        assert_eq!(
            sent_types(&h.transport),
            vec![EventType::ClientInfo, EventType::ClientInfo]
        );

        h.transport.emit_event(&begin_forwarding());
        settle().await;
        assert_eq!(
            sent_types(&h.transport),
            vec![EventType::ClientInfo, EventType::ClientInfo, EventType::Log]
        );

        h.transport.emit(closed(4900));
        settle().await;
        assert_eq!(h.store.load().expect("load"), None);
        assert_eq!(
            h.listener.last(),
            Some(Call::Disconnected(Some(ConnectionError::OrgMismatch), false))
        );
        assert!(h.session.is_terminated());
        assert!(matches!(
            h.session.connect(),
            Err(Error::Disconnected(ConnectionError::OrgMismatch))
        ));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.transport.connects().len(), 2);
        assert!(!h.session.queue_event(log_event("too late")));
        assert_eq!(
            *h.plugin.lifecycle.lock(),
            vec!["connect", "disconnect", "connect", "terminate"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_transient_closes_schedule_one_reconnect() {
        let h = harness();
        h.session.connect().expect("connect");
        h.transport.emit(TransportEvent::Open);
        settle().await;

        h.transport.emit(closed(1006));
        settle().await;
        h.transport.emit(closed(1006));
        settle().await;

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(h.transport.connects().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmapped_close_is_transient_without_error() {
        let h = harness();
        h.session.connect().expect("connect");
        h.transport.emit(TransportEvent::Open);
        h.transport.emit(closed(4000));
        settle().await;

        assert_eq!(h.listener.last(), Some(Call::Disconnected(None, true)));
        assert!(!h.session.is_terminated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_authorizer_suppresses_reconnect() {
        let h = harness();
        h.authorizer
            .claim(AuthorizationKind::QuickConnect)
            .expect("claim");

        h.session.connect().expect("connect");
        h.transport.emit(TransportEvent::Open);
        h.transport.emit(closed(1006));
        settle().await;

        assert_eq!(
            h.listener.last(),
            Some(Call::Disconnected(Some(ConnectionError::Abnormal), false))
        );
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.transport.connects().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_begin_forwarding_notifies_once() {
        let h = harness();
        h.session.connect().expect("connect");
        h.transport.emit(TransportEvent::Open);
        h.transport.emit_event(&begin_forwarding());
        h.transport.emit_event(&begin_forwarding());
        settle().await;

        assert_eq!(h.listener.calls(), vec![Call::Connected]);
        assert_eq!(*h.plugin.lifecycle.lock(), vec!["connect"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_tears_down() {
        let h = harness();
        h.session.connect().expect("connect");
        h.transport.emit(TransportEvent::Open);
        settle().await;
        assert!(h.store.load().expect("load").is_some());

        h.session.disconnect();
        h.session.disconnect();

        assert_eq!(h.transport.disconnects(), vec![CLOSE_NORMAL]);
        assert_eq!(h.store.load().expect("load"), None);
        assert_eq!(h.listener.calls(), vec![Call::Disconnected(None, false)]);
        assert_eq!(*h.plugin.lifecycle.lock(), vec!["terminate"]);
        assert!(!h.session.queue_event(log_event("after")));
        assert!(matches!(
            h.session.connect(),
            Err(Error::UnexpectedState { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_events_reach_plugins() {
        let h = harness();
        h.session.connect().expect("connect");
        h.transport.emit(TransportEvent::Open);
        h.transport.emit_event(&ControlCommand::TakeScreenshot.to_event("remote"));

        let chunk = |sequence: u64, data: &str| {
            let mut payload = crate::protocol::Payload::new();
            payload.insert("chunkData".into(), json!(data));
            SessionEvent::new("remote", EventType::Generic, payload)
                .with_metadata("chunkId", json!("c1"))
                .with_metadata("chunkSequence", json!(sequence))
                .with_metadata("chunkTotal", json!(2))
        };
        h.transport.emit_event(&chunk(1, "\"world\"}"));
        h.transport.emit_event(&chunk(0, "{\"hello\":"));
        settle().await;

        assert_eq!(*h.plugin.controls.lock(), vec![ControlCommand::TakeScreenshot]);

        let events = h.plugin.events.lock().clone();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload_str("hello"), Some("world"));

        // The screenshot reply waits for forwarding like any other event.
        assert_eq!(sent_types(&h.transport), vec![EventType::ClientInfo]);
        h.transport.emit_event(&begin_forwarding());
        settle().await;
        assert_eq!(
            sent_types(&h.transport),
            vec![EventType::ClientInfo, EventType::Blob]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frame_is_dropped() {
        let h = harness();
        h.session.connect().expect("connect");
        h.transport.emit(TransportEvent::Open);
        h.transport.emit(TransportEvent::Message("not json".into()));
        h.transport.emit_event(&log_event("after garbage"));
        settle().await;

        assert_eq!(h.plugin.events.lock().len(), 1);
    }
}
