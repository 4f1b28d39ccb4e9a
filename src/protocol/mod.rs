//! Session protocol message types.
//!
//! This module defines the events exchanged with the inspection session,
//! the control commands it sends, the socket URL format, and inbound chunk
//! reassembly.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | `clientInfo` event | Client → Session | Announces the client on connect |
//! | `control` event | Session → Client | Commands such as `startForwarding` |
//! | `log` / `generic` / `blob` events | Both | Telemetry and plugin traffic |
//!
//! Any inbound event may be split into chunks (see [`chunk`]).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `chunk` | Chunk group reassembly |
//! | `control` | Control command parsing |
//! | `event` | Session event type and monotonic clock |
//! | `url` | Connection URL and environments |

// ============================================================================
// Submodules
// ============================================================================

/// Chunk group reassembly.
pub mod chunk;

/// Control command parsing.
pub mod control;

/// Session event message type.
pub mod event;

/// Connection URL construction and parsing.
pub mod url;

// ============================================================================
// Re-exports
// ============================================================================

pub use chunk::{ReassembledHandler, Reassembler};
pub use control::ControlCommand;
pub use event::{ClientInfo, EventType, Metadata, Payload, SessionEvent, next_timestamp};
pub use url::{ConnectionUrl, Environment};
