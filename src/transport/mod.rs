//! Socket transport layer.
//!
//! This module handles the duplex connection between this client and the
//! cloud-hosted inspection session.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Session (Rust) │                              │  Inspection     │
//! │                 │       WebSocket (wss)        │  Session        │
//! │  WsTransport    │◄────────────────────────────►│  (cloud)        │
//! │  → events chan  │   /client/v1?sessionId=...   │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `SocketTransport::connect` - Dial in the background
//! 2. `TransportEvent::Open` - Connection ready
//! 3. `SocketTransport::send` - Outbound worker writes frames
//! 4. `TransportEvent::Message` - Inbound frames to the inbound worker
//! 5. `TransportEvent::Closed` - Close code drives the session's policy
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | tokio-tungstenite client and event loop |
//! | `socket` | Transport trait and events |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket client and event loop.
pub mod connection;

/// Transport trait and events.
pub mod socket;

/// Scriptable transport for tests.
#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::WsTransport;
pub use socket::{
    CLOSE_ABNORMAL, CLOSE_NORMAL, SocketTransport, TransportEvent, TransportEvents,
};
