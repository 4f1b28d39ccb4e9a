//! Error types for the inspector session engine.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use inspector_session::{Orchestrator, Result};
//!
//! async fn example(orchestrator: &Orchestrator) -> Result<()> {
//!     orchestrator.terminate_session(true).await;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::MissingOrganization`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::Disconnected`] |
//! | Protocol | [`Error::Protocol`], [`Error::MalformedChunk`], [`Error::UnexpectedState`] |
//! | Registration | [`Error::Registration`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Url`], [`Error::Http`], [`Error::ChannelClosed`] |
//!
//! Observable connection failures are reported as [`ConnectionError`], a
//! closed set derived from socket close codes. QuickConnect failures are
//! reported as [`RegistrationError`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when link configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// No organization id could be resolved for a connection.
    ///
    /// Neither the configuration nor the stored connection URL supplied one.
    #[error("Organization id could not be resolved")]
    MissingOrganization,

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Socket connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Socket closed while an operation was in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Session ended with a classified connection error.
    #[error("Disconnected: {0}")]
    Disconnected(ConnectionError),

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected message.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// A chunk group could not be reassembled.
    ///
    /// Non-fatal: the group is discarded and processing continues.
    #[error("Malformed chunk group {chunk_id}: {message}")]
    MalformedChunk {
        /// Chunk group identifier.
        chunk_id: String,
        /// Description of the failure.
        message: String,
    },

    /// Operation is not valid in the current orchestrator state.
    #[error("Unexpected state: {message}")]
    UnexpectedState {
        /// Description of the state conflict.
        message: String,
    },

    // ========================================================================
    // Registration Errors
    // ========================================================================
    /// QuickConnect registration failed.
    #[error("Registration failed: {0}")]
    Registration(RegistrationError),

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a malformed chunk error.
    #[inline]
    pub fn malformed_chunk(chunk_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedChunk {
            chunk_id: chunk_id.into(),
            message: message.into(),
        }
    }

    /// Creates an unexpected state error.
    #[inline]
    pub fn unexpected_state(message: impl Into<String>) -> Self {
        Self::UnexpectedState {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a configuration error.
    #[inline]
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::MissingOrganization)
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionClosed
                | Self::Disconnected(_)
                | Self::WebSocket(_)
                | Self::ChannelClosed(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::ConnectionClosed | Self::WebSocket(_) => true,
            Self::Disconnected(error) => !error.is_terminal(),
            Self::Registration(error) => error.is_transient(),
            Self::Http(error) => error.is_timeout() || error.is_connect(),
            _ => false,
        }
    }
}

// ============================================================================
// ConnectionError
// ============================================================================

/// Classified reason a session connection ended.
///
/// Derived from the socket close code. Terminal errors require a brand-new
/// session; transient ones are retried by the session's reconnect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionError {
    /// Intentional close (1000).
    Normal,
    /// Abnormal close without a close frame (1006).
    Abnormal,
    /// Client organization does not match the session (4900).
    OrgMismatch,
    /// Malformed or expired request (4400).
    ClientError,
    /// Too many clients connected to the session (4901).
    ConnectionLimit,
    /// Client exceeded the event rate limit (4902).
    EventRateLimit,
    /// Session was deleted by the operator (4903).
    SessionDeleted,
}

impl ConnectionError {
    /// Maps a socket close code to a classification.
    ///
    /// Returns `None` for unmapped codes, which are non-error disconnects.
    #[must_use]
    pub fn from_close_code(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::Normal),
            1006 => Some(Self::Abnormal),
            4900 => Some(Self::OrgMismatch),
            4400 => Some(Self::ClientError),
            4901 => Some(Self::ConnectionLimit),
            4902 => Some(Self::EventRateLimit),
            4903 => Some(Self::SessionDeleted),
            _ => None,
        }
    }

    /// Returns the close code this classification was derived from.
    #[inline]
    #[must_use]
    pub const fn close_code(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::Abnormal => 1006,
            Self::OrgMismatch => 4900,
            Self::ClientError => 4400,
            Self::ConnectionLimit => 4901,
            Self::EventRateLimit => 4902,
            Self::SessionDeleted => 4903,
        }
    }

    /// Returns `true` if the session must be torn down for good.
    ///
    /// [`ConnectionError::Normal`] is terminal as well: it is the
    /// user-initiated path.
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Abnormal)
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Normal => "normal closure",
            Self::Abnormal => "abnormal closure",
            Self::OrgMismatch => "organization mismatch",
            Self::ClientError => "client error",
            Self::ConnectionLimit => "connection limit reached",
            Self::EventRateLimit => "event rate limit exceeded",
            Self::SessionDeleted => "session deleted",
        };
        write!(f, "{text} ({})", self.close_code())
    }
}

// ============================================================================
// RegistrationError
// ============================================================================

/// Failure reported by the QuickConnect registration workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// The request could not be built (missing org id, bad URL).
    InvalidRequest(String),
    /// No response or a timeout; may succeed on retry.
    Network(String),
    /// Registrar answered with a non-success status.
    Rejected {
        /// HTTP status code.
        status: u16,
    },
    /// Operator never approved within the attempt cap.
    RetryLimitReached {
        /// Number of status checks performed.
        attempts: u32,
    },
    /// The caller cancelled the workflow.
    Cancelled,
}

impl RegistrationError {
    /// Returns `true` for failures a retry may fix.
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest(message) => write!(f, "invalid request: {message}"),
            Self::Network(message) => write!(f, "network error: {message}"),
            Self::Rejected { status } => write!(f, "rejected with status {status}"),
            Self::RetryLimitReached { attempts } => {
                write!(f, "not approved after {attempts} status checks")
            }
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

impl From<RegistrationError> for Error {
    fn from(error: RegistrationError) -> Self {
        Self::Registration(error)
    }
}

impl From<ConnectionError> for Error {
    fn from(error: ConnectionError) -> Self {
        Self::Disconnected(error)
    }
}

// ============================================================================
// Tests
// ============================================================================
