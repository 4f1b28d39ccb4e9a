//! Builder for [`Session`].

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use crate::config::LinkConfig;
use crate::identifiers::SessionKey;
use crate::transport::{SocketTransport, WsTransport};

use super::core::Session;
use super::identity::SessionIdentity;
use super::listener::{NoopListener, Plugin, SessionListener};
use super::phase::AuthorizerGate;
use super::store::{ConnectionStore, MemoryStore};

// ============================================================================
// SessionBuilder
// ============================================================================

/// Builder for [`Session`].
///
/// Every collaborator has a default: a [`WsTransport`], a [`MemoryStore`],
/// a [`NoopListener`], no plugins and a private [`AuthorizerGate`].
pub struct SessionBuilder {
    key: Option<SessionKey>,
    config: Arc<LinkConfig>,
    identity: SessionIdentity,
    transport: Option<Arc<dyn SocketTransport>>,
    store: Option<Arc<dyn ConnectionStore>>,
    listener: Option<Arc<dyn SessionListener>>,
    plugins: Vec<Arc<dyn Plugin>>,
    authorizer: Option<Arc<AuthorizerGate>>,
}

impl SessionBuilder {
    pub(super) fn new(config: Arc<LinkConfig>, identity: SessionIdentity) -> Self {
        Self {
            key: None,
            config,
            identity,
            transport: None,
            store: None,
            listener: None,
            plugins: Vec::new(),
            authorizer: None,
        }
    }

    /// Uses a key allocated by the caller.
    #[inline]
    #[must_use]
    pub(crate) fn key(mut self, key: SessionKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Sets the socket transport.
    #[inline]
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn SocketTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the reconnection store.
    #[inline]
    #[must_use]
    pub fn store(mut self, store: Arc<dyn ConnectionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the lifecycle listener.
    #[inline]
    #[must_use]
    pub fn listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Adds a plugin.
    #[inline]
    #[must_use]
    pub fn plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Adds several plugins.
    #[inline]
    #[must_use]
    pub fn plugins(mut self, plugins: impl IntoIterator<Item = Arc<dyn Plugin>>) -> Self {
        self.plugins.extend(plugins);
        self
    }

    /// Shares an authorizer gate with the caller.
    #[inline]
    #[must_use]
    pub fn authorizer(mut self, gate: Arc<AuthorizerGate>) -> Self {
        self.authorizer = Some(gate);
        self
    }

    /// Builds the session. Nothing is dialed until [`Session::connect`].
    #[must_use]
    pub fn build(self) -> Session {
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(WsTransport::new()));
        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let listener = self.listener.unwrap_or_else(|| Arc::new(NoopListener));
        let authorizer = self.authorizer.unwrap_or_default();

        Session::from_parts(
            self.key.unwrap_or_else(SessionKey::next),
            self.config,
            self.identity,
            transport,
            store,
            listener,
            self.plugins,
            authorizer,
        )
    }
}
