//! QuickConnect device registration.
//!
//! The device registers itself with the registrar, then polls until an
//! operator approves it and credentials for a session are issued.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`QuickConnect`] | Registration workflow with bounded polling |
//! | [`Registrar`] | Backend seam for the REST calls |
//! | [`HttpRegistrar`] | reqwest implementation of [`Registrar`] |
//! | [`RegistrationCallbacks`] | Receives the single outcome |

mod quickconnect;
mod registrar;

pub use quickconnect::{QuickConnect, RegistrationCallbacks};
pub use registrar::{
    CreateDeviceRequest, DeviceStatus, DeviceStatusRequest, HttpRegistrar, Registrar,
    SessionCredentials,
};
