//! Link configuration.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`LinkConfig`] | Validated settings shared by sessions and QuickConnect |
//! | [`LinkConfigBuilder`] | Fluent configuration builder |
//!
//! # Example
//!
//! ```no_run
//! use inspector_session::LinkConfig;
//!
//! # fn example() -> inspector_session::Result<()> {
//! let config = LinkConfig::builder()
//!     .vendor_id("acme")
//!     .socket_domain("inspect.example.com")
//!     .registrar_base("https://api.example.com/quickconnect")
//!     .org_id("org-42")
//!     .device_name("Pixel 9")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder for [`LinkConfig`].
pub mod builder;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::identifiers::ClientId;
use crate::protocol::ClientInfo;
use crate::worker::WorkerOptions;

pub use builder::LinkConfigBuilder;

// ============================================================================
// Constants
// ============================================================================

/// Delay before an automatic reconnect after a transient close.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Delay between QuickConnect status checks.
pub const DEFAULT_STATUS_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Maximum number of QuickConnect status checks.
pub const DEFAULT_MAX_STATUS_ATTEMPTS: u32 = 300;

// ============================================================================
// LinkConfig
// ============================================================================

/// Validated link settings.
///
/// Use [`LinkConfig::builder()`] to create one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Vendor id stamped on outbound events.
    pub vendor_id: String,
    /// Production socket domain; environments prefix it.
    pub socket_domain: String,
    /// Base URL of the QuickConnect registrar.
    pub registrar_base: String,
    /// Organization id, if known up front.
    pub org_id: Option<String>,
    /// Installation id.
    pub client_id: ClientId,
    /// Human readable device name.
    pub device_name: String,
    /// Host platform name.
    pub platform: String,
    /// Delay before an automatic reconnect.
    pub reconnect_delay: Duration,
    /// Delay between QuickConnect status checks.
    pub status_poll_interval: Duration,
    /// Maximum number of QuickConnect status checks.
    pub max_status_attempts: u32,
    /// Tuning for the inbound and outbound workers.
    pub worker: WorkerOptions,
}

impl LinkConfig {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> LinkConfigBuilder {
        LinkConfigBuilder::new()
    }

    /// Returns the client description sent on connect.
    #[must_use]
    pub fn client_info(&self) -> ClientInfo {
        ClientInfo {
            client_id: self.client_id.to_string(),
            device_name: self.device_name.clone(),
            platform: self.platform.clone(),
            sdk_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
