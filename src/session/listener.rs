//! Session callbacks: the lifecycle listener and plugins.

// ============================================================================
// Imports
// ============================================================================

use crate::error::ConnectionError;
use crate::protocol::{ControlCommand, SessionEvent};
use crate::worker::SerialWorker;

// ============================================================================
// SessionListener
// ============================================================================

/// Receives session lifecycle transitions.
pub trait SessionListener: Send + Sync {
    /// Called once per transition into forwarding.
    fn on_connected(&self);

    /// Called when the connection ends.
    ///
    /// `reconnecting` is `true` when an automatic reconnect is scheduled.
    fn on_disconnected(&self, error: Option<ConnectionError>, reconnecting: bool);
}

/// Listener that ignores every callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl SessionListener for NoopListener {
    fn on_connected(&self) {}

    fn on_disconnected(&self, _error: Option<ConnectionError>, _reconnecting: bool) {}
}

// ============================================================================
// EventSink
// ============================================================================

/// Lets plugins send events back through the session's outbound queue.
#[derive(Debug, Clone)]
pub struct EventSink {
    outbound: SerialWorker<SessionEvent>,
    vendor_id: String,
}

impl EventSink {
    pub(crate) fn new(outbound: SerialWorker<SessionEvent>, vendor_id: String) -> Self {
        Self {
            outbound,
            vendor_id,
        }
    }

    /// Vendor id to stamp on events built by plugins.
    #[inline]
    #[must_use]
    pub fn vendor_id(&self) -> &str {
        &self.vendor_id
    }

    /// Queues `event` for delivery. Returns `false` if the session is gone
    /// or its queue is full.
    pub fn send(&self, event: SessionEvent) -> bool {
        self.outbound.offer(event)
    }
}

// ============================================================================
// Plugin
// ============================================================================

/// Host extension notified of session activity.
///
/// Every method has an empty default so plugins only implement what they
/// need. Callbacks run on the session's driver task and must not block.
pub trait Plugin: Send + Sync {
    /// Name used in logs and for unregistering.
    fn name(&self) -> &str;

    /// Forwarding started.
    fn on_connect(&self, _sink: &EventSink) {}

    /// Connection dropped; a reconnect may follow.
    fn on_disconnect(&self) {}

    /// Session ended for good.
    fn on_terminate(&self) {}

    /// Inbound non-control event.
    fn on_event(&self, _event: &SessionEvent) {}

    /// Inbound control command other than begin-forwarding.
    fn on_control(&self, _command: &ControlCommand, _sink: &EventSink) {}
}
