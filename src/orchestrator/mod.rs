//! Session orchestration.
//!
//! The [`Orchestrator`] is the entry point for host applications. It keeps
//! at most one [`Session`](crate::Session), buffers events while no session
//! is forwarding, and publishes a single [`SessionPhase`](crate::SessionPhase).
//!
//! # Buffer Lifecycle
//!
//! | Event | Buffer |
//! |-------|--------|
//! | `queue_event` while not forwarding | Appended |
//! | Session reaches Connected | Cleared |
//! | Transient close | Kept |
//! | `terminate_session(true)` | Cleared |
//!
//! # Example
//!
//! ```no_run
//! use inspector_session::{AuthorizationKind, LinkConfig, Orchestrator, SessionIdentity};
//!
//! # async fn example() -> inspector_session::Result<()> {
//! let config = LinkConfig::builder()
//!     .vendor_id("acme")
//!     .socket_domain("inspect.example.com")
//!     .registrar_base("https://api.example.com/quickconnect")
//!     .org_id("org-42")
//!     .build()?;
//!
//! let orchestrator = Orchestrator::builder(config).build();
//! let identity = SessionIdentity::new("123456").with_session_id("session-id");
//! orchestrator.create_session(identity, Some(AuthorizationKind::Pin))?;
//! # Ok(())
//! # }
//! ```

mod builder;
mod core;

pub use builder::{OrchestratorBuilder, TransportFactory};
pub use core::Orchestrator;
