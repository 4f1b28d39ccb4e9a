//! Builder pattern for link configuration.
//!
//! Provides a fluent API for configuring and validating [`LinkConfig`].

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::ClientId;
use crate::worker::WorkerOptions;

use super::{
    DEFAULT_MAX_STATUS_ATTEMPTS, DEFAULT_RECONNECT_DELAY, DEFAULT_STATUS_POLL_INTERVAL, LinkConfig,
};

// ============================================================================
// Constants
// ============================================================================

/// Device name used when none is configured.
const DEFAULT_DEVICE_NAME: &str = "Unknown device";

// ============================================================================
// LinkConfigBuilder
// ============================================================================

/// Builder for [`LinkConfig`].
///
/// Use [`LinkConfig::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct LinkConfigBuilder {
    vendor_id: Option<String>,
    socket_domain: Option<String>,
    registrar_base: Option<String>,
    org_id: Option<String>,
    client_id: Option<ClientId>,
    device_name: Option<String>,
    platform: Option<String>,
    reconnect_delay: Option<Duration>,
    status_poll_interval: Option<Duration>,
    max_status_attempts: Option<u32>,
    worker: Option<WorkerOptions>,
}

// ============================================================================
// LinkConfigBuilder Implementation
// ============================================================================

impl LinkConfigBuilder {
    /// Creates a new builder with no configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the vendor id stamped on outbound events.
    #[inline]
    #[must_use]
    pub fn vendor_id(mut self, vendor_id: impl Into<String>) -> Self {
        self.vendor_id = Some(vendor_id.into());
        self
    }

    /// Sets the production socket domain (e.g. `inspect.example.com`).
    #[inline]
    #[must_use]
    pub fn socket_domain(mut self, domain: impl Into<String>) -> Self {
        self.socket_domain = Some(domain.into());
        self
    }

    /// Sets the QuickConnect registrar base URL.
    #[inline]
    #[must_use]
    pub fn registrar_base(mut self, base: impl Into<String>) -> Self {
        self.registrar_base = Some(base.into());
        self
    }

    /// Sets the organization id.
    #[inline]
    #[must_use]
    pub fn org_id(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    /// Sets the installation id. A random one is generated otherwise.
    #[inline]
    #[must_use]
    pub fn client_id(mut self, client_id: ClientId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    /// Sets the device name shown to operators.
    #[inline]
    #[must_use]
    pub fn device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    /// Sets the platform name. Defaults to the compile target OS.
    #[inline]
    #[must_use]
    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// Sets the delay before an automatic reconnect.
    #[inline]
    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = Some(delay);
        self
    }

    /// Sets the delay between QuickConnect status checks.
    #[inline]
    #[must_use]
    pub fn status_poll_interval(mut self, interval: Duration) -> Self {
        self.status_poll_interval = Some(interval);
        self
    }

    /// Sets the maximum number of QuickConnect status checks.
    #[inline]
    #[must_use]
    pub fn max_status_attempts(mut self, attempts: u32) -> Self {
        self.max_status_attempts = Some(attempts);
        self
    }

    /// Sets worker queue tuning.
    #[inline]
    #[must_use]
    pub fn worker_options(mut self, options: WorkerOptions) -> Self {
        self.worker = Some(options);
        self
    }

    /// Builds the configuration with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if vendor id, socket domain or registrar base is
    ///   missing or invalid
    /// - [`Error::Config`] if a numeric limit is zero
    pub fn build(self) -> Result<LinkConfig> {
        let vendor_id = self.validate_vendor_id()?;
        let socket_domain = self.validate_socket_domain()?;
        let registrar_base = self.validate_registrar_base()?;
        let worker = self.worker.unwrap_or_default();
        let max_status_attempts = self
            .max_status_attempts
            .unwrap_or(DEFAULT_MAX_STATUS_ATTEMPTS);

        if worker.capacity == 0 {
            return Err(Error::config("Worker capacity must be at least 1"));
        }
        if max_status_attempts == 0 {
            return Err(Error::config("Max status attempts must be at least 1"));
        }

        Ok(LinkConfig {
            vendor_id,
            socket_domain,
            registrar_base,
            org_id: self.org_id.filter(|org| !org.is_empty()),
            client_id: self.client_id.unwrap_or_else(ClientId::generate),
            device_name: self
                .device_name
                .unwrap_or_else(|| DEFAULT_DEVICE_NAME.to_string()),
            platform: self
                .platform
                .unwrap_or_else(|| std::env::consts::OS.to_string()),
            reconnect_delay: self.reconnect_delay.unwrap_or(DEFAULT_RECONNECT_DELAY),
            status_poll_interval: self
                .status_poll_interval
                .unwrap_or(DEFAULT_STATUS_POLL_INTERVAL),
            max_status_attempts,
            worker,
        })
    }
}

// ============================================================================
// Validation
// ============================================================================

impl LinkConfigBuilder {
    /// Validates the vendor id.
    fn validate_vendor_id(&self) -> Result<String> {
        match self.vendor_id.as_deref() {
            Some(id) if !id.trim().is_empty() => Ok(id.to_string()),
            _ => Err(Error::config(
                "Vendor id is required. Use .vendor_id() to set it.",
            )),
        }
    }

    /// Validates the socket domain by rendering a URL with it.
    fn validate_socket_domain(&self) -> Result<String> {
        let domain = self.socket_domain.clone().ok_or_else(|| {
            Error::config(
                "Socket domain is required. Use .socket_domain() to set it.\n\
                 Example: LinkConfig::builder().socket_domain(\"inspect.example.com\")",
            )
        })?;

        let url = Url::parse(&format!("wss://{domain}/"))
            .map_err(|e| Error::config(format!("Invalid socket domain {domain:?}: {e}")))?;
        if url.host_str() != Some(domain.as_str()) {
            return Err(Error::config(format!(
                "Socket domain must be a bare host name, got {domain:?}"
            )));
        }

        Ok(domain)
    }

    /// Validates the registrar base URL.
    fn validate_registrar_base(&self) -> Result<String> {
        let base = self.registrar_base.clone().ok_or_else(|| {
            Error::config(
                "Registrar base URL is required. Use .registrar_base() to set it.\n\
                 Example: LinkConfig::builder().registrar_base(\"https://api.example.com/quickconnect\")",
            )
        })?;

        let url = Url::parse(&base)
            .map_err(|e| Error::config(format!("Invalid registrar base {base:?}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "Registrar base must be an http(s) URL, got {base:?}"
            )));
        }

        Ok(base.trim_end_matches('/').to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
