//! Inspector Session - remote inspection session protocol engine.
//!
//! This library connects a host application to a cloud-hosted inspection
//! session, forwards the host's telemetry events in order, and accepts
//! control commands from the remote operator.
//!
//! # Architecture
//!
//! The engine follows a one-session-per-orchestrator model:
//!
//! - **Orchestrator**: Owns at most one session and buffers events while
//!   none is forwarding
//! - **Session**: Drives one socket connection through its close-code policy
//! - **Workers**: One task per direction drains a strict FIFO queue
//!
//! Key design principles:
//!
//! - Outbound delivery is at-least-once: a failed send keeps the event at
//!   the head of the queue
//! - Transient closes reconnect once after a fixed delay; terminal close
//!   codes end the session for good
//! - Inbound events split into chunks are reassembled before dispatch
//!
//! # Quick Start
//!
//! ```no_run
//! use inspector_session::{
//!     AuthorizationKind, LinkConfig, Orchestrator, Result, SessionEvent, SessionIdentity,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = LinkConfig::builder()
//!         .vendor_id("acme")
//!         .socket_domain("inspect.example.com")
//!         .registrar_base("https://api.example.com/quickconnect")
//!         .org_id("org-42")
//!         .build()?;
//!
//!     let orchestrator = Orchestrator::builder(config).build();
//!     orchestrator.queue_event(SessionEvent::log("acme", "info", "app started"));
//!
//!     let identity = SessionIdentity::new("123456").with_session_id("session-id");
//!     orchestrator.create_session(identity, Some(AuthorizationKind::Pin))?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | [`LinkConfig`] and its builder |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`orchestrator`] | [`Orchestrator`] entry point |
//! | [`protocol`] | Events, control commands, URLs, chunk reassembly |
//! | [`registration`] | QuickConnect device registration |
//! | [`session`] | [`Session`] state machine and callbacks |
//! | [`transport`] | WebSocket transport layer |
//! | [`worker`] | Serial FIFO workers |

// ============================================================================
// Modules
// ============================================================================

/// Link configuration.
///
/// Use [`LinkConfig::builder()`] to create a validated configuration.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Session orchestration.
pub mod orchestrator;

/// Session protocol message types.
pub mod protocol;

/// QuickConnect device registration.
pub mod registration;

/// Sessions, listeners, plugins and reconnection stores.
pub mod session;

/// WebSocket transport layer.
pub mod transport;

/// Serial FIFO workers.
pub mod worker;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration
pub use config::{LinkConfig, LinkConfigBuilder};

// Error types
pub use error::{ConnectionError, Error, RegistrationError, Result};

// Identifier types
pub use identifiers::{ClientId, EventId, SessionKey};

// Orchestrator
pub use orchestrator::{Orchestrator, OrchestratorBuilder, TransportFactory};

// Protocol types
pub use protocol::{ControlCommand, Environment, EventType, SessionEvent};

// Registration
pub use registration::{
    HttpRegistrar, QuickConnect, Registrar, RegistrationCallbacks, SessionCredentials,
};

// Session types
pub use session::{
    AuthorizationKind, ConnectionStore, EventSink, FileStore, MemoryStore, Plugin, Session,
    SessionIdentity, SessionListener, SessionPhase, SessionStatus,
};

// Transport
pub use transport::{SocketTransport, WsTransport};
