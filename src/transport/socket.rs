//! Socket transport abstraction.
//!
//! A transport reports everything that happens on the wire as
//! [`TransportEvent`]s on a channel supplied at connect time. The session
//! consumes that channel as plain messages, so its reconnect policy does
//! not depend on any callback mechanism.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

/// Close code sent for an intentional local disconnect.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code reported when the connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Close code reported when a close frame carried no status.
pub const CLOSE_NO_STATUS: u16 = 1005;

// ============================================================================
// TransportEvent
// ============================================================================

/// Something that happened on the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection established.
    Open,
    /// Text frame received.
    Message(String),
    /// Connection ended.
    Closed {
        /// Close code (1006 when no close frame was received).
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// Transport-level failure; a `Closed` event follows.
    Error(String),
}

/// Channel on which a transport reports its events.
pub type TransportEvents = mpsc::UnboundedSender<TransportEvent>;

// ============================================================================
// SocketTransport
// ============================================================================

/// Duplex connection owned by exactly one session.
#[async_trait]
pub trait SocketTransport: Send + Sync + 'static {
    /// Opens a connection to `url`, replacing any previous one.
    ///
    /// Returns immediately; the outcome arrives on `events` as
    /// [`TransportEvent::Open`] or [`TransportEvent::Closed`].
    fn connect(&self, url: Url, events: TransportEvents);

    /// Sends a text frame on the current connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`](crate::Error::ConnectionClosed)
    /// if there is no open connection.
    async fn send(&self, text: String) -> Result<()>;

    /// Closes the current connection with `code`.
    ///
    /// No [`TransportEvent::Closed`] is reported for a local close.
    fn disconnect(&self, code: u16, reason: &str);
}
