//! Session event message type.
//!
//! A [`SessionEvent`] is the unit of transport in both directions. Events
//! are immutable once constructed; the builder-style `with_*` methods
//! consume the value.
//!
//! # Format
//!
//! ```json
//! {
//!   "id": "acme:log:1700000000000",
//!   "vendorId": "acme",
//!   "type": "log",
//!   "payload": { "level": "info", "message": "hello" },
//!   "metadata": {},
//!   "timestamp": 1700000000000
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::identifiers::EventId;

// ============================================================================
// Types
// ============================================================================

/// Key-ordered event payload.
pub type Payload = BTreeMap<String, Value>;

/// Key-ordered event metadata.
pub type Metadata = BTreeMap<String, Value>;

// ============================================================================
// Monotonic Clock
// ============================================================================

/// Last timestamp handed out.
static LAST_TIMESTAMP: AtomicU64 = AtomicU64::new(0);

/// Returns a process-wide strictly increasing timestamp in milliseconds.
///
/// Follows the wall clock, but never repeats or goes backwards.
pub fn next_timestamp() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();

    let mut last = LAST_TIMESTAMP.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_TIMESTAMP.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
        {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

// ============================================================================
// EventType
// ============================================================================

/// Closed set of session event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    /// Plugin or host defined event.
    Generic,
    /// Log line.
    Log,
    /// Session control command.
    Control,
    /// Client description sent on connect.
    ClientInfo,
    /// Binary content.
    Blob,
}

impl EventType {
    /// Returns the wire name of this type.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Log => "log",
            Self::Control => "control",
            Self::ClientInfo => "clientInfo",
            Self::Blob => "blob",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ClientInfo
// ============================================================================

/// Description of this client, sent as the first event of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// Client installation id.
    pub client_id: String,
    /// Human readable device name.
    pub device_name: String,
    /// Host platform name.
    pub platform: String,
    /// Version of this crate.
    pub sdk_version: String,
}

// ============================================================================
// SessionEvent
// ============================================================================

/// An event exchanged with the inspection session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "WireEvent")]
pub struct SessionEvent {
    id: EventId,
    vendor_id: String,
    #[serde(rename = "type")]
    event_type: EventType,
    payload: Payload,
    metadata: Metadata,
    timestamp: u64,
}

/// Lenient inbound form: the session may omit `id` and `timestamp`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent {
    #[serde(default)]
    id: Option<EventId>,
    #[serde(default)]
    vendor_id: String,
    #[serde(rename = "type")]
    event_type: EventType,
    #[serde(default)]
    payload: Payload,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    timestamp: Option<u64>,
}

impl From<WireEvent> for SessionEvent {
    fn from(wire: WireEvent) -> Self {
        let timestamp = wire.timestamp.unwrap_or_else(next_timestamp);
        let id = wire
            .id
            .unwrap_or_else(|| EventId::derive(&wire.vendor_id, wire.event_type.as_str(), timestamp));

        Self {
            id,
            vendor_id: wire.vendor_id,
            event_type: wire.event_type,
            payload: wire.payload,
            metadata: wire.metadata,
            timestamp,
        }
    }
}

// ============================================================================
// SessionEvent - Constructors
// ============================================================================

impl SessionEvent {
    /// Creates a new event stamped with the next monotonic timestamp.
    #[must_use]
    pub fn new(vendor_id: impl Into<String>, event_type: EventType, payload: Payload) -> Self {
        let vendor_id = vendor_id.into();
        let timestamp = next_timestamp();

        Self {
            id: EventId::derive(&vendor_id, event_type.as_str(), timestamp),
            vendor_id,
            event_type,
            payload,
            metadata: Metadata::new(),
            timestamp,
        }
    }

    /// Creates a generic event from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if `payload` is not a JSON object.
    pub fn generic(vendor_id: impl Into<String>, payload: Value) -> Result<Self> {
        match payload {
            Value::Object(map) => Ok(Self::new(
                vendor_id,
                EventType::Generic,
                map.into_iter().collect(),
            )),
            other => Err(Error::protocol(format!(
                "event payload must be an object, got {other}"
            ))),
        }
    }

    /// Creates a log event.
    #[must_use]
    pub fn log(
        vendor_id: impl Into<String>,
        level: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let mut payload = Payload::new();
        payload.insert("level".into(), Value::String(level.into()));
        payload.insert("message".into(), Value::String(message.into()));
        Self::new(vendor_id, EventType::Log, payload)
    }

    /// Creates the client-info event announcing this client.
    #[must_use]
    pub fn client_info(vendor_id: impl Into<String>, info: &ClientInfo) -> Self {
        let mut payload = Payload::new();
        payload.insert("clientId".into(), json!(info.client_id));
        payload.insert("deviceName".into(), json!(info.device_name));
        payload.insert("platform".into(), json!(info.platform));
        payload.insert("sdkVersion".into(), json!(info.sdk_version));
        Self::new(vendor_id, EventType::ClientInfo, payload)
    }

    /// Creates a blob event carrying base64-encoded content.
    #[must_use]
    pub fn blob(vendor_id: impl Into<String>, content_type: impl Into<String>, data: &[u8]) -> Self {
        let mut payload = Payload::new();
        payload.insert("contentType".into(), Value::String(content_type.into()));
        payload.insert("data".into(), Value::String(BASE64.encode(data)));
        Self::new(vendor_id, EventType::Blob, payload)
    }

    /// Returns a copy with the given metadata entry set.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns a copy with the metadata replaced.
    #[must_use]
    pub fn with_metadata_map(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

// ============================================================================
// SessionEvent - Accessors
// ============================================================================

impl SessionEvent {
    /// Returns the derived event id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &EventId {
        &self.id
    }

    /// Returns the vendor id.
    #[inline]
    #[must_use]
    pub fn vendor_id(&self) -> &str {
        &self.vendor_id
    }

    /// Returns the event type.
    #[inline]
    #[must_use]
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Returns the payload.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Returns the metadata.
    #[inline]
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Returns the timestamp in milliseconds.
    #[inline]
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Gets a string from the payload.
    #[inline]
    #[must_use]
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Decodes the content of a blob event.
    ///
    /// Returns `None` for non-blob events or invalid base64.
    #[must_use]
    pub fn blob_data(&self) -> Option<Vec<u8>> {
        if self.event_type != EventType::Blob {
            return None;
        }
        BASE64.decode(self.payload_str("data")?).ok()
    }
}

// ============================================================================
// SessionEvent - Serialization
// ============================================================================

impl SessionEvent {
    /// Parses an event from its JSON text form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the text is not a valid event.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serializes the event to its JSON text form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_strictly_increase() {
        let mut previous = next_timestamp();
        for _ in 0..1000 {
            let current = next_timestamp();
            assert!(current > previous);
            previous = current;
        }
    }

    #[test]
    fn test_event_ids_are_unique() {
        let a = SessionEvent::log("acme", "info", "one");
        let b = SessionEvent::log("acme", "info", "one");
        assert_ne!(a.id(), b.id());
        assert!(a.id().as_str().starts_with("acme:log:"));
    }

    #[test]
    fn test_serialization_shape() {
        let event = SessionEvent::log("acme", "warn", "disk low");
        let value: Value = serde_json::from_str(&event.to_json().expect("serialize"))
            .expect("parse json");

        assert_eq!(value["vendorId"], "acme");
        assert_eq!(value["type"], "log");
        assert_eq!(value["payload"]["message"], "disk low");
        assert_eq!(value["timestamp"], event.timestamp());
    }

    #[test]
    fn test_inbound_without_id_gets_one() {
        let json_str = r#"{
            "vendorId": "inspector",
            "type": "control",
            "payload": { "command": "startForwarding" }
        }"#;

        let event = SessionEvent::from_json(json_str).expect("parse event");
        assert_eq!(event.event_type(), EventType::Control);
        assert!(event.id().as_str().starts_with("inspector:control:"));
        assert!(event.metadata().is_empty());
    }

    #[test]
    fn test_client_info_type_name() {
        let info = ClientInfo {
            client_id: "c-1".into(),
            device_name: "Pixel".into(),
            platform: "android".into(),
            sdk_version: "0.1.0".into(),
        };
        let event = SessionEvent::client_info("acme", &info);
        let json = event.to_json().expect("serialize");
        assert!(json.contains(r#""type":"clientInfo""#));
        assert_eq!(event.payload_str("deviceName"), Some("Pixel"));
    }

    #[test]
    fn test_blob_round_trip() {
        let event = SessionEvent::blob("acme", "image/png", &[0x89, 0x50, 0x4e, 0x47]);
        assert_eq!(event.blob_data(), Some(vec![0x89, 0x50, 0x4e, 0x47]));
        assert_eq!(SessionEvent::log("acme", "info", "x").blob_data(), None);
    }

    #[test]
    fn test_generic_rejects_non_object() {
        assert!(SessionEvent::generic("acme", json!([1, 2])).is_err());
        let event = SessionEvent::generic("acme", json!({"b": 1, "a": 2})).expect("object");
        let keys: Vec<_> = event.payload().keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
