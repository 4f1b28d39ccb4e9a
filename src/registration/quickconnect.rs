//! QuickConnect device registration workflow.
//!
//! ```text
//! idle ──register──▶ create ──ok──▶ poll ⟲ (pending, network error)
//!   ▲                  │              │
//!   └──── error ◀──────┘              ├──▶ approved: on_success
//!   └──── cancel / retry limit ◀──────┘
//! ```
//!
//! The callbacks receive exactly one outcome per registration.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::LinkConfig;
use crate::error::RegistrationError;

use super::registrar::{
    CreateDeviceRequest, DeviceStatusRequest, Registrar, SessionCredentials,
};

// ============================================================================
// RegistrationCallbacks
// ============================================================================

/// Receives the outcome of one registration.
pub trait RegistrationCallbacks: Send + Sync {
    /// The operator approved the device.
    fn on_success(&self, credentials: SessionCredentials);

    /// Registration ended without credentials.
    fn on_error(&self, error: RegistrationError);
}

// ============================================================================
// QuickConnect
// ============================================================================

/// Registration currently in flight.
struct Running {
    generation: u64,
    task: JoinHandle<()>,
    callbacks: Arc<dyn RegistrationCallbacks>,
}

struct QuickConnectInner {
    registrar: Arc<dyn Registrar>,
    runtime: Handle,
    org_id: Option<String>,
    client_id: String,
    device_name: String,
    poll_interval: Duration,
    max_attempts: u32,
    active: AtomicBool,
    generation: AtomicU64,
    running: Mutex<Option<Running>>,
}

/// Bounded-retry device registration.
///
/// Cloning yields another handle to the same workflow.
#[derive(Clone)]
pub struct QuickConnect {
    inner: Arc<QuickConnectInner>,
}

impl fmt::Debug for QuickConnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuickConnect")
            .field("active", &self.is_active())
            .field("max_attempts", &self.inner.max_attempts)
            .finish_non_exhaustive()
    }
}

impl QuickConnect {
    /// Creates a workflow that runs its tasks on `runtime`.
    #[must_use]
    pub fn new(config: &LinkConfig, registrar: Arc<dyn Registrar>, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(QuickConnectInner {
                registrar,
                runtime,
                org_id: config.org_id.clone(),
                client_id: config.client_id.to_string(),
                device_name: config.device_name.clone(),
                poll_interval: config.status_poll_interval,
                max_attempts: config.max_status_attempts,
                active: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                running: Mutex::new(None),
            }),
        }
    }

    /// Returns `true` while a registration is in flight.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Starts a registration.
    ///
    /// Returns `false` without side effects while one is already running,
    /// and `false` after reporting [`RegistrationError::InvalidRequest`] when
    /// no organization id is configured.
    pub fn register(&self, callbacks: Arc<dyn RegistrationCallbacks>) -> bool {
        if self
            .inner
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Registration already active");
            return false;
        }

        let Some(org_id) = self.inner.org_id.clone() else {
            self.inner.active.store(false, Ordering::Release);
            callbacks.on_error(RegistrationError::InvalidRequest(
                "organization id is required".to_string(),
            ));
            return false;
        };

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let mut running = self.inner.running.lock();
        let inner = Arc::clone(&self.inner);
        let task = self.inner.runtime.spawn(async move {
            let outcome = inner.workflow(org_id).await;
            inner.finish(generation, outcome);
        });
        *running = Some(Running {
            generation,
            task,
            callbacks,
        });

        info!(generation, "Registration started");
        true
    }

    /// Cancels the running registration.
    ///
    /// The callbacks receive [`RegistrationError::Cancelled`] once. Calling
    /// this while idle does nothing.
    pub fn cancel(&self) {
        let Some(running) = self.inner.running.lock().take() else {
            return;
        };

        running.task.abort();
        self.inner.active.store(false, Ordering::Release);
        info!(generation = running.generation, "Registration cancelled");
        running.callbacks.on_error(RegistrationError::Cancelled);
    }
}

impl QuickConnectInner {
    async fn workflow(&self, org_id: String) -> Result<SessionCredentials, RegistrationError> {
        let create = CreateDeviceRequest {
            org_id: org_id.clone(),
            device_name: self.device_name.clone(),
            client_id: self.client_id.clone(),
        };
        self.registrar.create_device(&create).await?;
        info!("Device registered, waiting for approval");

        let status = DeviceStatusRequest {
            org_id,
            client_id: self.client_id.clone(),
        };

        let mut attempts = 0;
        loop {
            tokio::time::sleep(self.poll_interval).await;
            attempts += 1;

            match self.registrar.device_status(&status).await {
                Ok(response) => {
                    if let Some(credentials) = response.credentials() {
                        info!(attempts, "Device approved");
                        return Ok(credentials);
                    }
                    debug!(attempts, "Device not approved yet");
                }
                Err(e) if e.is_transient() => {
                    warn!(attempts, error = %e, "Status check failed");
                }
                Err(e) => return Err(e),
            }

            if attempts >= self.max_attempts {
                return Err(RegistrationError::RetryLimitReached { attempts });
            }
        }
    }

    /// Reports `outcome` unless the registration was cancelled meanwhile.
    fn finish(&self, generation: u64, outcome: Result<SessionCredentials, RegistrationError>) {
        let running = {
            let mut running = self.running.lock();
            match running.as_ref() {
                Some(current) if current.generation == generation => running.take(),
                _ => None,
            }
        };
        let Some(running) = running else {
            return;
        };

        self.active.store(false, Ordering::Release);
        match outcome {
            Ok(credentials) => running.callbacks.on_success(credentials),
            Err(e) => {
                warn!(generation, error = %e, "Registration failed");
                running.callbacks.on_error(e);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
