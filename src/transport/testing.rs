//! Scriptable transport for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use url::Url;

use crate::error::Result;
use crate::protocol::SessionEvent;

use super::socket::{SocketTransport, TransportEvent, TransportEvents};

#[derive(Default)]
struct Recorded {
    connects: Vec<Url>,
    sent: Vec<String>,
    disconnects: Vec<u16>,
    events: Option<TransportEvents>,
}

/// Records every call and lets the test inject transport events.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    recorded: Mutex<Recorded>,
}

impl RecordingTransport {
    /// Delivers `event` as if it came from the latest connection.
    pub(crate) fn emit(&self, event: TransportEvent) {
        let events = self.recorded.lock().events.clone();
        if let Some(events) = events {
            let _ = events.send(event);
        }
    }

    /// Delivers an inbound session event as a text frame.
    pub(crate) fn emit_event(&self, event: &SessionEvent) {
        let text = event.to_json().expect("serialize event");
        self.emit(TransportEvent::Message(text));
    }

    pub(crate) fn connects(&self) -> Vec<Url> {
        self.recorded.lock().connects.clone()
    }

    pub(crate) fn disconnects(&self) -> Vec<u16> {
        self.recorded.lock().disconnects.clone()
    }

    pub(crate) fn sent_events(&self) -> Vec<SessionEvent> {
        self.recorded
            .lock()
            .sent
            .iter()
            .map(|text| SessionEvent::from_json(text).expect("sent frame is an event"))
            .collect()
    }
}

#[async_trait]
impl SocketTransport for RecordingTransport {
    fn connect(&self, url: Url, events: TransportEvents) {
        let mut recorded = self.recorded.lock();
        recorded.connects.push(url);
        recorded.events = Some(events);
    }

    async fn send(&self, text: String) -> Result<()> {
        self.recorded.lock().sent.push(text);
        Ok(())
    }

    fn disconnect(&self, code: u16, _reason: &str) {
        self.recorded.lock().disconnects.push(code);
    }
}
