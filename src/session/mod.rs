//! Remote inspection sessions.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Session`] | Connection state machine with inbound and outbound workers |
//! | [`SessionBuilder`] | Wires transport, store, listener and plugins |
//! | [`SessionIdentity`] | Credentials selecting the remote session |
//! | [`SessionPhase`] | Phase published by the orchestrator |
//! | [`AuthorizerGate`] | Which authorizer currently suppresses reconnects |
//! | [`ConnectionStore`] | Persisted reconnection URL |
//! | [`SessionListener`], [`Plugin`] | Callbacks |
//!
//! # Close Handling
//!
//! | Close | Effect |
//! |-------|--------|
//! | 1000 or a terminal code | Full teardown, stored URL cleared, no reconnect |
//! | 1006 or an unmapped code | Outbound paused, one reconnect after the delay |

// ============================================================================
// Submodules
// ============================================================================

mod builder;
mod core;
mod identity;
mod listener;
mod phase;

/// Reconnection stores.
pub mod store;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::SessionBuilder;
pub use core::{Session, SessionStatus};
pub use identity::SessionIdentity;
pub use listener::{EventSink, NoopListener, Plugin, SessionListener};
pub use phase::{AuthorizationKind, AuthorizerGate, SessionPhase};
pub use store::{ConnectionStore, FileStore, MemoryStore};
