//! Registrar REST calls.
//!
//! | Call | Body | Success |
//! |------|------|---------|
//! | `POST <base>[-<env>]/device/create` | `{orgId, deviceName, clientId}` | 200/201 |
//! | `POST <base>[-<env>]/device/status` | `{orgId, clientId}` | 200/201 with optional `sessionUuid`, `token` |

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, RegistrationError, Result};
use crate::protocol::Environment;
use crate::session::SessionIdentity;

// ============================================================================
// Constants
// ============================================================================

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

// ============================================================================
// Wire Types
// ============================================================================

/// Body of the create call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeviceRequest {
    /// Organization id.
    pub org_id: String,
    /// Device name shown to the operator.
    pub device_name: String,
    /// Installation id.
    pub client_id: String,
}

/// Body of the status call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatusRequest {
    /// Organization id.
    pub org_id: String,
    /// Installation id.
    pub client_id: String,
}

/// Status response. Both fields are set once the operator approved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    /// Remote session id.
    #[serde(default)]
    pub session_uuid: Option<String>,
    /// Session token.
    #[serde(default)]
    pub token: Option<String>,
}

/// Credentials issued for an approved device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    /// Remote session id.
    pub session_id: String,
    /// Session token.
    pub token: String,
}

impl SessionCredentials {
    /// Converts into the identity of the approved session.
    #[must_use]
    pub fn into_identity(self, environment: Environment) -> SessionIdentity {
        SessionIdentity::new(self.token)
            .with_session_id(self.session_id)
            .with_environment(environment)
    }
}

impl DeviceStatus {
    /// Returns the credentials if both fields are non-empty.
    #[must_use]
    pub fn credentials(&self) -> Option<SessionCredentials> {
        let session_id = self.session_uuid.as_deref().filter(|s| !s.is_empty())?;
        let token = self.token.as_deref().filter(|s| !s.is_empty())?;
        Some(SessionCredentials {
            session_id: session_id.to_string(),
            token: token.to_string(),
        })
    }
}

// ============================================================================
// Registrar
// ============================================================================

/// Device registration backend.
#[async_trait]
pub trait Registrar: Send + Sync + 'static {
    /// Registers the device for approval.
    async fn create_device(
        &self,
        request: &CreateDeviceRequest,
    ) -> std::result::Result<(), RegistrationError>;

    /// Checks whether the operator approved the device.
    async fn device_status(
        &self,
        request: &DeviceStatusRequest,
    ) -> std::result::Result<DeviceStatus, RegistrationError>;
}

// ============================================================================
// HttpRegistrar
// ============================================================================

/// [`Registrar`] over HTTPS with reqwest.
#[derive(Debug, Clone)]
pub struct HttpRegistrar {
    client: reqwest::Client,
    base: String,
}

impl HttpRegistrar {
    /// Creates a registrar for `base`, suffixed with `-<env>` outside
    /// production.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the resulting base is not a valid URL
    /// - [`Error::Http`] if the HTTP client cannot be created
    pub fn new(base: &str, environment: Environment) -> Result<Self> {
        let base = base.trim_end_matches('/');
        let base = match environment.prefix() {
            Some(env) => format!("{base}-{env}"),
            None => base.to_string(),
        };
        Url::parse(&base).map_err(|e| Error::config(format!("Invalid registrar URL {base:?}: {e}")))?;

        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, base })
    }

    /// Returns the full URL of `path` under the registrar base.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    /// Posts `body` and returns the raw response text.
    async fn post<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> std::result::Result<String, RegistrationError> {
        let url = self.endpoint(path);
        trace!(url = %url, "Registrar request");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| RegistrationError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            debug!(url = %url, status = status.as_u16(), "Registrar rejected request");
            return Err(RegistrationError::Rejected {
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| RegistrationError::Network(e.to_string()))
    }
}

#[async_trait]
impl Registrar for HttpRegistrar {
    async fn create_device(
        &self,
        request: &CreateDeviceRequest,
    ) -> std::result::Result<(), RegistrationError> {
        self.post("device/create", request).await.map(|_| ())
    }

    async fn device_status(
        &self,
        request: &DeviceStatusRequest,
    ) -> std::result::Result<DeviceStatus, RegistrationError> {
        let text = self.post("device/status", request).await?;
        if text.trim().is_empty() {
            return Ok(DeviceStatus::default());
        }
        serde_json::from_str(&text)
            .map_err(|e| RegistrationError::Network(format!("invalid status response: {e}")))
    }
}

// ============================================================================
// Tests
// ============================================================================
