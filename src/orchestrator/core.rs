//! Session orchestrator.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::LinkConfig;
use crate::error::{ConnectionError, Error, Result};
use crate::identifiers::SessionKey;
use crate::protocol::{ConnectionUrl, SessionEvent};
use crate::session::{
    AuthorizationKind, AuthorizerGate, ConnectionStore, Plugin, Session, SessionIdentity,
    SessionListener, SessionPhase, SessionStatus,
};

use super::builder::{OrchestratorBuilder, TransportFactory};

// ============================================================================
// Types
// ============================================================================

/// The single live session.
struct ActiveSession {
    session: Session,
    kind: Option<AuthorizationKind>,
}

/// Shared orchestrator internals.
struct OrchestratorInner {
    config: Arc<LinkConfig>,
    store: Arc<dyn ConnectionStore>,
    transports: TransportFactory,
    authorizer: Arc<AuthorizerGate>,
    plugins: Mutex<Vec<Arc<dyn Plugin>>>,
    /// Lock order: `buffer` before `active`.
    buffer: Mutex<Vec<SessionEvent>>,
    active: Mutex<Option<ActiveSession>>,
    is_active: AtomicBool,
    phase: watch::Sender<SessionPhase>,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Owns at most one [`Session`] and buffers events while none is forwarding.
///
/// Cloning yields another handle to the same orchestrator.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<OrchestratorInner>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("phase", &self.phase())
            .field("is_active", &self.is_active())
            .field("buffered", &self.buffered_events())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator builder.
    #[inline]
    #[must_use]
    pub fn builder(config: LinkConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    pub(super) fn from_parts(
        config: Arc<LinkConfig>,
        store: Arc<dyn ConnectionStore>,
        transports: TransportFactory,
        plugins: Vec<Arc<dyn Plugin>>,
    ) -> Self {
        let (phase, _) = watch::channel(SessionPhase::default());
        Self {
            inner: Arc::new(OrchestratorInner {
                config,
                store,
                transports,
                authorizer: Arc::new(AuthorizerGate::new()),
                plugins: Mutex::new(plugins),
                buffer: Mutex::new(Vec::new()),
                active: Mutex::new(None),
                is_active: AtomicBool::new(false),
                phase,
            }),
        }
    }
}

// ============================================================================
// Orchestrator - Accessors
// ============================================================================

impl Orchestrator {
    /// Returns the shared configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &LinkConfig {
        &self.inner.config
    }

    /// Returns the current phase.
    #[inline]
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        *self.inner.phase.borrow()
    }

    /// Subscribes to phase changes.
    #[must_use]
    pub fn subscribe_phase(&self) -> watch::Receiver<SessionPhase> {
        self.inner.phase.subscribe()
    }

    /// Returns `true` while a session exists.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.is_active.load(Ordering::Acquire)
    }

    /// Returns the live session, if any.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.inner
            .active
            .lock()
            .as_ref()
            .map(|active| active.session.clone())
    }

    /// Returns the number of buffered events.
    #[inline]
    #[must_use]
    pub fn buffered_events(&self) -> usize {
        self.inner.buffer.lock().len()
    }
}

// ============================================================================
// Orchestrator - Sessions
// ============================================================================

impl Orchestrator {
    /// Creates and connects a session, replacing one of the same kind.
    ///
    /// The new session is seeded with the buffered events, which are written
    /// once the remote begins forwarding. `kind` is `None` for sessions that
    /// were not authorized interactively (resumed or deep-linked); such a
    /// session is replaced by any new session.
    ///
    /// # Errors
    ///
    /// - [`Error::UnexpectedState`] if an interactively authorized session of
    ///   a different kind is active
    /// - Any error from [`Session::connect`]
    pub fn create_session(
        &self,
        identity: SessionIdentity,
        kind: Option<AuthorizationKind>,
    ) -> Result<Session> {
        let previous = {
            let mut active = self.inner.active.lock();
            if let Some(current) = active.as_ref()
                && current.kind.is_some()
                && current.kind != kind
            {
                return Err(Error::unexpected_state(format!(
                    "session {} of kind {:?} is active, cannot create {:?}",
                    current.session.key(),
                    current.kind,
                    kind
                )));
            }
            active.take()
        };

        if let Some(previous) = previous {
            info!(session = %previous.session.key(), "Replacing session");
            previous.session.disconnect();
        }

        let key = SessionKey::next();
        let listener = Arc::new(PhaseListener {
            orchestrator: Arc::downgrade(&self.inner),
            key,
        });
        let plugins = self.inner.plugins.lock().clone();

        let session = Session::builder(Arc::clone(&self.inner.config), identity)
            .key(key)
            .transport((self.inner.transports)())
            .store(Arc::clone(&self.inner.store))
            .listener(listener)
            .plugins(plugins)
            .authorizer(Arc::clone(&self.inner.authorizer))
            .build();

        {
            let buffer = self.inner.buffer.lock();
            for event in buffer.iter() {
                session.queue_event(event.clone());
            }
            debug!(session = %key, seeded = buffer.len(), "Session seeded with buffer");

            *self.inner.active.lock() = Some(ActiveSession {
                session: session.clone(),
                kind,
            });
            self.inner.is_active.store(true, Ordering::Release);
        }

        if let Err(e) = session.connect() {
            warn!(session = %key, error = %e, "Session connect failed");
            self.remove_session(key);
            return Err(e);
        }

        Ok(session)
    }

    /// Restores a session from the stored connection.
    ///
    /// Returns `Ok(false)` when nothing is stored.
    ///
    /// # Errors
    ///
    /// - Storage or URL parse errors
    /// - Any error from [`Orchestrator::create_session`]
    pub fn resume_from_store(&self) -> Result<bool> {
        let Some(text) = self.inner.store.load()? else {
            debug!("No stored connection to resume");
            return Ok(false);
        };

        let url = ConnectionUrl::parse(&text)?;
        let identity = SessionIdentity::from_connection(&url, &self.inner.config.socket_domain);
        info!(host = %url.host, "Resuming stored connection");
        self.create_session(identity, None)?;
        Ok(true)
    }

    /// Ends the live session, if any.
    ///
    /// `purge_buffer` also drops buffered events that were never forwarded.
    pub fn terminate_session(&self, purge_buffer: bool) {
        let previous = self.inner.active.lock().take();
        self.inner.is_active.store(false, Ordering::Release);

        if let Some(previous) = previous {
            info!(session = %previous.session.key(), purge_buffer, "Terminating session");
            previous.session.disconnect();
        }
        if purge_buffer {
            self.inner.buffer.lock().clear();
        }

        self.inner.phase.send_replace(SessionPhase::default());
    }

    /// Forwards `event` to the live session and buffers it until a session
    /// is forwarding.
    pub fn queue_event(&self, event: SessionEvent) {
        let mut buffer = self.inner.buffer.lock();
        let session = self.session();

        let forwarding = session
            .as_ref()
            .is_some_and(|session| session.status() == SessionStatus::Connected);

        if !forwarding {
            if buffer.len() >= self.inner.config.worker.capacity {
                warn!("Event buffer full, dropping oldest event");
                buffer.remove(0);
            }
            buffer.push(event.clone());
        }

        if let Some(session) = session
            && !session.queue_event(event)
        {
            warn!(session = %session.key(), "Session rejected event");
        }
    }

    /// Drops `key`'s session if it is still the live one.
    fn remove_session(&self, key: SessionKey) {
        Self::remove_if_current(&self.inner, key);
    }

    fn remove_if_current(inner: &OrchestratorInner, key: SessionKey) {
        let removed = {
            let mut active = inner.active.lock();
            match active.as_ref() {
                Some(current) if current.session.key() == key => active.take(),
                _ => None,
            }
        };
        if removed.is_some() {
            inner.is_active.store(false, Ordering::Release);
        }
    }
}

// ============================================================================
// Orchestrator - Authorizers
// ============================================================================

impl Orchestrator {
    /// Marks an authorizer of `kind` as running.
    ///
    /// Sessions do not reconnect on their own while it runs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedState`] if another kind is running.
    pub fn claim_authorizer(&self, kind: AuthorizationKind) -> Result<()> {
        self.inner.authorizer.claim(kind)?;
        self.inner.phase.send_replace(SessionPhase::Authorizing(kind));
        Ok(())
    }

    /// Marks the authorizer of `kind` as finished.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedState`] if another kind is running.
    pub fn release_authorizer(&self, kind: AuthorizationKind) -> Result<()> {
        self.inner.authorizer.release(kind)?;
        self.inner.phase.send_if_modified(|phase| {
            if *phase == SessionPhase::Authorizing(kind) {
                *phase = SessionPhase::default();
                true
            } else {
                false
            }
        });
        Ok(())
    }

    /// Returns the running authorizer, if any.
    #[inline]
    #[must_use]
    pub fn active_authorizer(&self) -> Option<AuthorizationKind> {
        self.inner.authorizer.active()
    }
}

// ============================================================================
// Orchestrator - Plugins
// ============================================================================

impl Orchestrator {
    /// Registers a plugin for sessions created from now on.
    pub fn register_plugin(&self, plugin: Arc<dyn Plugin>) {
        debug!(plugin = plugin.name(), "Plugin registered");
        self.inner.plugins.lock().push(plugin);
    }

    /// Unregisters plugins named `name`. Returns `true` if any was removed.
    pub fn unregister_plugin(&self, name: &str) -> bool {
        let mut plugins = self.inner.plugins.lock();
        let before = plugins.len();
        plugins.retain(|plugin| plugin.name() != name);
        before != plugins.len()
    }
}

// ============================================================================
// PhaseListener
// ============================================================================

/// Maps one session's callbacks onto the orchestrator's phase and buffer.
struct PhaseListener {
    orchestrator: Weak<OrchestratorInner>,
    key: SessionKey,
}

impl PhaseListener {
    fn is_current(&self, inner: &OrchestratorInner) -> bool {
        inner
            .active
            .lock()
            .as_ref()
            .is_some_and(|active| active.session.key() == self.key)
    }
}

impl SessionListener for PhaseListener {
    fn on_connected(&self) {
        let Some(inner) = self.orchestrator.upgrade() else {
            return;
        };
        if !self.is_current(&inner) {
            return;
        }

        let cleared = {
            let mut buffer = inner.buffer.lock();
            let count = buffer.len();
            buffer.clear();
            count
        };
        debug!(session = %self.key, cleared, "Buffer cleared on connect");
        inner.phase.send_replace(SessionPhase::Connected);
    }

    fn on_disconnected(&self, error: Option<ConnectionError>, reconnecting: bool) {
        let Some(inner) = self.orchestrator.upgrade() else {
            return;
        };
        if !self.is_current(&inner) {
            return;
        }

        let session_over = !reconnecting
            && inner
                .active
                .lock()
                .as_ref()
                .is_some_and(|active| active.session.is_terminated());
        if session_over {
            Orchestrator::remove_if_current(&inner, self.key);
        }

        inner
            .phase
            .send_replace(SessionPhase::Disconnected { error, reconnecting });
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::protocol::{ControlCommand, EventType};
    use crate::session::MemoryStore;
    use crate::transport::testing::RecordingTransport;
    use crate::transport::{SocketTransport, TransportEvent};

    struct Harness {
        orchestrator: Orchestrator,
        transports: Arc<Mutex<Vec<Arc<RecordingTransport>>>>,
        store: Arc<MemoryStore>,
    }

    impl Harness {
        fn transport(&self, index: usize) -> Arc<RecordingTransport> {
            Arc::clone(&self.transports.lock()[index])
        }

        fn latest(&self) -> Arc<RecordingTransport> {
            let transports = self.transports.lock();
            Arc::clone(transports.last().expect("a transport was created"))
        }
    }

    fn harness() -> Harness {
        let config = LinkConfig::builder()
            .vendor_id("acme")
            .socket_domain("inspect.example.com")
            .registrar_base("https://api.example.com/quickconnect")
            .org_id("org-1")
            .build()
            .expect("valid config");

        let transports: Arc<Mutex<Vec<Arc<RecordingTransport>>>> = Arc::default();
        let created = Arc::clone(&transports);
        let factory: TransportFactory = Arc::new(move || {
            let transport = Arc::new(RecordingTransport::default());
            created.lock().push(Arc::clone(&transport));
            transport as Arc<dyn SocketTransport>
        });
        let store = Arc::new(MemoryStore::new());

        let orchestrator = Orchestrator::builder(config)
            .store(store.clone())
            .transports(factory)
            .build();

        Harness {
            orchestrator,
            transports,
            store,
        }
    }

    fn pin() -> SessionIdentity {
        SessionIdentity::new("123456").with_session_id("sess-1")
    }

    fn log_event(message: &str) -> SessionEvent {
        SessionEvent::log("acme", "info", message)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    fn sent_messages(transport: &RecordingTransport) -> Vec<String> {
        transport
            .sent_events()
            .iter()
            .filter(|event| event.event_type() == EventType::Log)
            .filter_map(|event| event.payload_str("message").map(str::to_string))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffer_is_delivered_and_cleared_on_connect() {
        let h = harness();
        h.orchestrator.queue_event(log_event("one"));
        h.orchestrator.queue_event(log_event("two"));
        assert_eq!(h.orchestrator.buffered_events(), 2);

        h.orchestrator
            .create_session(pin(), Some(AuthorizationKind::Pin))
            .expect("create");
        assert!(h.orchestrator.is_active());

        let transport = h.latest();
        transport.emit(TransportEvent::Open);
        settle().await;

        let types: Vec<_> = transport
            .sent_events()
            .iter()
            .map(SessionEvent::event_type)
            .collect();
        assert_eq!(types, vec![EventType::ClientInfo]);
        assert!(sent_messages(&transport).is_empty());
        assert_eq!(h.orchestrator.buffered_events(), 2);

        transport.emit_event(&ControlCommand::BeginForwarding.to_event("remote"));
        settle().await;
        assert_eq!(sent_messages(&transport), vec!["one", "two"]);
        assert_eq!(h.orchestrator.buffered_events(), 0);
        assert_eq!(h.orchestrator.phase(), SessionPhase::Connected);

        // Forwarding: events go straight to the session.
        h.orchestrator.queue_event(log_event("three"));
        settle().await;
        assert_eq!(h.orchestrator.buffered_events(), 0);
        assert_eq!(sent_messages(&transport), vec!["one", "two", "three"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_close_keeps_buffer() {
        let h = harness();
        h.orchestrator
            .create_session(pin(), Some(AuthorizationKind::Pin))
            .expect("create");
        let transport = h.latest();
        transport.emit(TransportEvent::Open);
        transport.emit_event(&ControlCommand::BeginForwarding.to_event("remote"));
        settle().await;

        transport.emit(TransportEvent::Closed {
            code: 1006,
            reason: String::new(),
        });
        settle().await;
        assert_eq!(
            h.orchestrator.phase(),
            SessionPhase::Disconnected {
                error: Some(ConnectionError::Abnormal),
                reconnecting: true
            }
        );

        h.orchestrator.queue_event(log_event("while down"));
        assert_eq!(h.orchestrator.buffered_events(), 1);
        assert!(h.orchestrator.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_kind_mismatch_is_rejected() {
        let h = harness();
        let first = h
            .orchestrator
            .create_session(pin(), Some(AuthorizationKind::Pin))
            .expect("create");

        let err = h
            .orchestrator
            .create_session(pin(), Some(AuthorizationKind::QuickConnect))
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedState { .. }));

        let current = h.orchestrator.session().expect("session kept");
        assert_eq!(current.key(), first.key());
        assert!(h.transport(0).disconnects().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resumed_session_is_replaced_by_authorized_one() {
        let h = harness();
        h.store
            .save("wss://inspect.example.com/client/v1?sessionId=old&token=1&orgId=org-1&clientId=c")
            .expect("save");
        assert!(h.orchestrator.resume_from_store().expect("resume"));
        let resumed = h.orchestrator.session().expect("resumed");

        let authorized = h
            .orchestrator
            .create_session(pin(), Some(AuthorizationKind::Pin))
            .expect("replace resumed");
        assert_ne!(resumed.key(), authorized.key());
        assert!(resumed.is_terminated());

        // An authorized session is not displaced by a resume.
        let err = h.orchestrator.create_session(pin(), None).unwrap_err();
        assert!(matches!(err, Error::UnexpectedState { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_kind_replaces_session_and_keeps_buffer() {
        let h = harness();
        h.orchestrator.queue_event(log_event("kept"));

        let first = h
            .orchestrator
            .create_session(pin(), Some(AuthorizationKind::Pin))
            .expect("create");
        let second = h
            .orchestrator
            .create_session(pin(), Some(AuthorizationKind::Pin))
            .expect("replace");

        assert_ne!(first.key(), second.key());
        assert!(first.is_terminated());
        assert_eq!(h.transport(0).disconnects(), vec![1000]);
        assert_eq!(h.orchestrator.buffered_events(), 1);
        assert_eq!(second.pending_events(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_session() {
        let h = harness();
        h.orchestrator.queue_event(log_event("buffered"));
        h.orchestrator
            .create_session(pin(), Some(AuthorizationKind::Pin))
            .expect("create");

        h.orchestrator.terminate_session(false);
        assert!(!h.orchestrator.is_active());
        assert_eq!(h.orchestrator.buffered_events(), 1);
        assert_eq!(h.orchestrator.phase(), SessionPhase::default());

        h.orchestrator.terminate_session(true);
        assert_eq!(h.orchestrator.buffered_events(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_close_drops_session() {
        let h = harness();
        h.orchestrator
            .create_session(pin(), Some(AuthorizationKind::Pin))
            .expect("create");
        let transport = h.latest();
        transport.emit(TransportEvent::Open);
        transport.emit(TransportEvent::Closed {
            code: 4903,
            reason: "deleted".into(),
        });
        settle().await;

        assert!(!h.orchestrator.is_active());
        assert!(h.orchestrator.session().is_none());
        assert_eq!(
            h.orchestrator.phase(),
            SessionPhase::Disconnected {
                error: Some(ConnectionError::SessionDeleted),
                reconnecting: false
            }
        );
        assert_eq!(h.store.load().expect("load"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_from_store() {
        let h = harness();
        assert!(!h.orchestrator.resume_from_store().expect("resume"));

        h.store
            .save("wss://qa.inspect.example.com/client/v1?sessionId=stored&token=999&orgId=org-1&clientId=c")
            .expect("save");
        assert!(h.orchestrator.resume_from_store().expect("resume"));

        let url = ConnectionUrl::parse(h.latest().connects()[0].as_str()).expect("url");
        assert_eq!(url.host, "qa.inspect.example.com");
        assert_eq!(url.session_id, "stored");
        assert_eq!(url.token, "999");
    }

    #[tokio::test(start_paused = true)]
    async fn test_authorizer_claims_drive_phase() {
        let h = harness();
        let mut phases = h.orchestrator.subscribe_phase();

        h.orchestrator
            .claim_authorizer(AuthorizationKind::QuickConnect)
            .expect("claim");
        assert!(phases.has_changed().expect("sender alive"));
        assert_eq!(
            *phases.borrow_and_update(),
            SessionPhase::Authorizing(AuthorizationKind::QuickConnect)
        );

        assert!(h.orchestrator.claim_authorizer(AuthorizationKind::Pin).is_err());

        h.orchestrator
            .release_authorizer(AuthorizationKind::QuickConnect)
            .expect("release");
        assert_eq!(h.orchestrator.phase(), SessionPhase::default());
        assert_eq!(h.orchestrator.active_authorizer(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_plugins_registration() {
        struct Named;
        impl Plugin for Named {
            fn name(&self) -> &str {
                "named"
            }
        }

        let h = harness();
        h.orchestrator.register_plugin(Arc::new(Named));
        assert!(h.orchestrator.unregister_plugin("named"));
        assert!(!h.orchestrator.unregister_plugin("named"));
    }
}
