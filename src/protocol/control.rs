//! Inbound control commands.
//!
//! Control events carry a `command` field in their payload. Only
//! `startForwarding` changes session state; the rest are handed to plugins.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use super::event::{EventType, Payload, SessionEvent};

// ============================================================================
// ControlCommand
// ============================================================================

/// A parsed control command.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    /// Remote is ready; unblock outbound forwarding.
    BeginForwarding,
    /// Capture the host's screen and send it back as a blob.
    TakeScreenshot,
    /// Command this client does not know.
    Unknown {
        /// Command name.
        command: String,
        /// Full control payload.
        payload: Payload,
    },
}

impl ControlCommand {
    /// Wire name of [`ControlCommand::BeginForwarding`].
    pub const BEGIN_FORWARDING: &'static str = "startForwarding";

    /// Wire name of [`ControlCommand::TakeScreenshot`].
    pub const TAKE_SCREENSHOT: &'static str = "takeScreenshot";

    /// Parses a control event.
    ///
    /// Returns `None` if the event is not a control event.
    #[must_use]
    pub fn parse(event: &SessionEvent) -> Option<Self> {
        if event.event_type() != EventType::Control {
            return None;
        }

        let command = event.payload_str("command").unwrap_or_default();
        Some(match command {
            Self::BEGIN_FORWARDING => Self::BeginForwarding,
            Self::TAKE_SCREENSHOT => Self::TakeScreenshot,
            other => Self::Unknown {
                command: other.to_string(),
                payload: event.payload().clone(),
            },
        })
    }

    /// Builds a control event for this command.
    #[must_use]
    pub fn to_event(&self, vendor_id: &str) -> SessionEvent {
        let mut payload = match self {
            Self::Unknown { payload, .. } => payload.clone(),
            _ => Payload::new(),
        };
        payload.insert("command".into(), Value::String(self.name().to_string()));
        SessionEvent::new(vendor_id, EventType::Control, payload)
    }

    /// Returns the command's wire name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::BeginForwarding => Self::BEGIN_FORWARDING,
            Self::TakeScreenshot => Self::TAKE_SCREENSHOT,
            Self::Unknown { command, .. } => command,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
