//! Observable session phase and the authorizer claim.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{ConnectionError, Error, Result};

// ============================================================================
// AuthorizationKind
// ============================================================================

/// How a session was authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthorizationKind {
    /// Operator shared a PIN with the user.
    Pin,
    /// Device registered itself and the operator approved it.
    QuickConnect,
}

impl fmt::Display for AuthorizationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pin => f.write_str("pin"),
            Self::QuickConnect => f.write_str("quickconnect"),
        }
    }
}

// ============================================================================
// SessionPhase
// ============================================================================

/// Connection phase published by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No forwarding session.
    Disconnected {
        /// Why the last session ended, if it ended with an error.
        error: Option<ConnectionError>,
        /// `true` while an automatic reconnect is scheduled.
        reconnecting: bool,
    },
    /// An authorizer is obtaining credentials.
    Authorizing(AuthorizationKind),
    /// Forwarding events.
    Connected,
}

impl SessionPhase {
    /// Returns `true` for [`SessionPhase::Connected`].
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl Default for SessionPhase {
    fn default() -> Self {
        Self::Disconnected {
            error: None,
            reconnecting: false,
        }
    }
}

// ============================================================================
// AuthorizerGate
// ============================================================================

/// Tracks which authorizer, if any, is currently in control.
///
/// While an authorizer is active, sessions do not schedule automatic
/// reconnects; the authorizer decides what happens next.
#[derive(Debug, Default)]
pub struct AuthorizerGate {
    active: Mutex<Option<AuthorizationKind>>,
}

impl AuthorizerGate {
    /// Creates a gate with no active authorizer.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the active authorizer kind.
    #[inline]
    #[must_use]
    pub fn active(&self) -> Option<AuthorizationKind> {
        *self.active.lock()
    }

    /// Returns `true` if any authorizer is active.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Claims the gate for `kind`. Claiming twice with the same kind is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedState`] if another kind holds the gate.
    pub fn claim(&self, kind: AuthorizationKind) -> Result<()> {
        let mut active = self.active.lock();
        match *active {
            Some(current) if current != kind => Err(Error::unexpected_state(format!(
                "cannot claim {kind} authorizer while {current} is active"
            ))),
            _ => {
                *active = Some(kind);
                debug!(%kind, "Authorizer claimed");
                Ok(())
            }
        }
    }

    /// Releases the gate held by `kind`. Releasing an idle gate is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedState`] if another kind holds the gate.
    pub fn release(&self, kind: AuthorizationKind) -> Result<()> {
        let mut active = self.active.lock();
        match *active {
            Some(current) if current != kind => Err(Error::unexpected_state(format!(
                "cannot release {kind} authorizer while {current} is active"
            ))),
            Some(_) => {
                *active = None;
                debug!(%kind, "Authorizer released");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_phase_is_idle_disconnect() {
        assert_eq!(
            SessionPhase::default(),
            SessionPhase::Disconnected {
                error: None,
                reconnecting: false
            }
        );
        assert!(!SessionPhase::default().is_connected());
    }

    #[test]
    fn test_claim_and_release() {
        let gate = AuthorizerGate::new();
        assert!(!gate.is_active());

        gate.claim(AuthorizationKind::Pin).expect("claim");
        gate.claim(AuthorizationKind::Pin).expect("reclaim same kind");
        assert_eq!(gate.active(), Some(AuthorizationKind::Pin));

        gate.release(AuthorizationKind::Pin).expect("release");
        assert!(!gate.is_active());
        gate.release(AuthorizationKind::Pin).expect("release idle");
    }

    #[test]
    fn test_mismatched_kind_is_rejected() {
        let gate = AuthorizerGate::new();
        gate.claim(AuthorizationKind::QuickConnect).expect("claim");

        let err = gate.claim(AuthorizationKind::Pin).unwrap_err();
        assert!(matches!(err, Error::UnexpectedState { .. }));
        let err = gate.release(AuthorizationKind::Pin).unwrap_err();
        assert!(matches!(err, Error::UnexpectedState { .. }));

        assert_eq!(gate.active(), Some(AuthorizationKind::QuickConnect));
    }
}
