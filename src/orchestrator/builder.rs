//! Builder for [`Orchestrator`].

use std::sync::Arc;

use crate::config::LinkConfig;
use crate::session::{ConnectionStore, MemoryStore, Plugin};
use crate::transport::{SocketTransport, WsTransport};

use super::core::Orchestrator;

/// Creates one transport per session.
pub type TransportFactory = Arc<dyn Fn() -> Arc<dyn SocketTransport> + Send + Sync>;

/// Builder for [`Orchestrator`].
///
/// Defaults to a [`WsTransport`] per session and a [`MemoryStore`].
pub struct OrchestratorBuilder {
    config: LinkConfig,
    store: Option<Arc<dyn ConnectionStore>>,
    transports: Option<TransportFactory>,
    plugins: Vec<Arc<dyn Plugin>>,
}

impl OrchestratorBuilder {
    pub(super) fn new(config: LinkConfig) -> Self {
        Self {
            config,
            store: None,
            transports: None,
            plugins: Vec::new(),
        }
    }

    /// Sets the reconnection store shared by every session.
    #[inline]
    #[must_use]
    pub fn store(mut self, store: Arc<dyn ConnectionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the transport factory.
    #[inline]
    #[must_use]
    pub fn transports(mut self, factory: TransportFactory) -> Self {
        self.transports = Some(factory);
        self
    }

    /// Registers a plugin attached to every session.
    #[inline]
    #[must_use]
    pub fn plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Builds the orchestrator.
    #[must_use]
    pub fn build(self) -> Orchestrator {
        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let transports = self.transports.unwrap_or_else(|| {
            Arc::new(|| Arc::new(WsTransport::new()) as Arc<dyn SocketTransport>)
        });

        Orchestrator::from_parts(Arc::new(self.config), store, transports, self.plugins)
    }
}
