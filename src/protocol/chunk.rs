//! Chunk reassembly for inbound events.
//!
//! Large payloads arrive split across several events sharing a `chunkId`.
//! Each chunk carries its 0-based `chunkSequence`; the first one seen also
//! declares `chunkTotal`. Fragments live in `payload.chunkData`.
//!
//! Arrival order is not guaranteed. Fragments are joined in sequence order
//! once the group is complete, and the group is dropped whether or not the
//! joined document parses.
//!
//! At most [`MAX_PENDING_GROUPS`] groups are held. Opening one more evicts
//! the group that was opened first, so a group whose remaining chunks never
//! arrive cannot accumulate for the life of the session.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

use super::event::{Metadata, SessionEvent};

// ============================================================================
// Constants
// ============================================================================

/// Metadata key of the chunk group id.
pub const CHUNK_ID_KEY: &str = "chunkId";

/// Metadata key of the 0-based chunk sequence number.
pub const CHUNK_SEQUENCE_KEY: &str = "chunkSequence";

/// Metadata key of the declared chunk count.
pub const CHUNK_TOTAL_KEY: &str = "chunkTotal";

/// Payload key of the fragment text.
pub const CHUNK_DATA_KEY: &str = "chunkData";

/// Maximum number of incomplete groups held at once.
pub const MAX_PENDING_GROUPS: usize = 64;

// ============================================================================
// Types
// ============================================================================

/// Callback receiving complete (reassembled or non-chunked) events.
pub type ReassembledHandler = Box<dyn Fn(SessionEvent) + Send + Sync>;

/// In-flight chunks for one chunk id.
struct ChunkGroup {
    /// Opening order, used to pick the eviction victim.
    opened: u64,
    /// Declared number of chunks.
    total: u64,
    /// Received chunks keyed by sequence number.
    chunks: BTreeMap<u64, SessionEvent>,
}

// ============================================================================
// Reassembler
// ============================================================================

/// Joins chunked events back into single logical events.
///
/// Runs synchronously on the caller's task and holds no background work,
/// so it can serve directly as the inbound worker's handler.
pub struct Reassembler {
    /// Pending groups by chunk id.
    groups: Mutex<FxHashMap<String, ChunkGroup>>,
    /// Number of groups opened so far.
    opened: AtomicU64,
    /// Receives every complete event.
    notifier: ReassembledHandler,
}

impl Reassembler {
    /// Creates a reassembler delivering complete events to `notifier`.
    #[must_use]
    pub fn new(notifier: ReassembledHandler) -> Self {
        Self {
            groups: Mutex::new(FxHashMap::default()),
            opened: AtomicU64::new(0),
            notifier,
        }
    }

    /// Returns the number of incomplete chunk groups.
    #[inline]
    #[must_use]
    pub fn pending_groups(&self) -> usize {
        self.groups.lock().len()
    }

    /// Processes one inbound event.
    ///
    /// Non-chunked events go straight to the notifier. Chunks are held until
    /// their group completes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedChunk`] if the chunk metadata is unusable or
    /// the joined document does not parse. The error is non-fatal: the
    /// group, if any, has already been discarded.
    pub fn on_event(&self, event: SessionEvent) -> Result<()> {
        let (Some(chunk_id), Some(sequence)) = (
            metadata_string(event.metadata(), CHUNK_ID_KEY),
            event.metadata().get(CHUNK_SEQUENCE_KEY),
        ) else {
            (self.notifier)(event);
            return Ok(());
        };

        let sequence = as_u64(sequence).ok_or_else(|| {
            Error::malformed_chunk(&chunk_id, format!("invalid sequence: {sequence}"))
        })?;

        let complete = {
            let mut groups = self.groups.lock();

            if !groups.contains_key(&chunk_id) {
                let total = event
                    .metadata()
                    .get(CHUNK_TOTAL_KEY)
                    .and_then(as_u64)
                    .filter(|total| *total > 0)
                    .ok_or_else(|| Error::malformed_chunk(&chunk_id, "missing chunk total"))?;

                if groups.len() >= MAX_PENDING_GROUPS {
                    Self::evict_oldest(&mut groups);
                }

                groups.insert(
                    chunk_id.clone(),
                    ChunkGroup {
                        opened: self.opened.fetch_add(1, Ordering::Relaxed),
                        total,
                        chunks: BTreeMap::new(),
                    },
                );
            }

            let Some(group) = groups.get_mut(&chunk_id) else {
                return Ok(());
            };

            if sequence >= group.total {
                let total = group.total;
                groups.remove(&chunk_id);
                return Err(Error::malformed_chunk(
                    &chunk_id,
                    format!("sequence {sequence} out of range for {total} chunks"),
                ));
            }

            if group.chunks.contains_key(&sequence) {
                debug!(chunk_id = %chunk_id, sequence, "Duplicate chunk dropped");
                return Ok(());
            }

            group.chunks.insert(sequence, event);
            trace!(
                chunk_id = %chunk_id,
                sequence,
                received = group.chunks.len(),
                total = group.total,
                "Chunk received"
            );

            if group.chunks.len() as u64 == group.total {
                groups.remove(&chunk_id)
            } else {
                None
            }
        };

        if let Some(group) = complete {
            let event = Self::assemble(&chunk_id, group)?;
            debug!(chunk_id = %chunk_id, "Chunk group reassembled");
            (self.notifier)(event);
        }

        Ok(())
    }

    /// Drops the group that was opened first.
    fn evict_oldest(groups: &mut FxHashMap<String, ChunkGroup>) {
        let oldest = groups
            .iter()
            .min_by_key(|(_, group)| group.opened)
            .map(|(id, _)| id.clone());

        if let Some(id) = oldest
            && let Some(group) = groups.remove(&id)
        {
            warn!(
                chunk_id = %id,
                received = group.chunks.len(),
                total = group.total,
                "Incomplete chunk group evicted"
            );
        }
    }

    /// Joins a complete group into a single event.
    fn assemble(chunk_id: &str, group: ChunkGroup) -> Result<SessionEvent> {
        let mut data = Vec::new();
        for chunk in group.chunks.values() {
            let fragment = chunk.payload_str(CHUNK_DATA_KEY).unwrap_or_default();
            data.extend_from_slice(fragment.as_bytes());
        }

        let Some(first) = group.chunks.into_values().next() else {
            return Err(Error::malformed_chunk(chunk_id, "empty group"));
        };

        let text = String::from_utf8(data)
            .map_err(|e| Error::malformed_chunk(chunk_id, format!("invalid UTF-8: {e}")))?;

        let payload = match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            Ok(other) => {
                return Err(Error::malformed_chunk(
                    chunk_id,
                    format!("reassembled document is not an object: {other}"),
                ));
            }
            Err(e) => {
                warn!(chunk_id = %chunk_id, error = %e, "Failed to parse reassembled chunks");
                return Err(Error::malformed_chunk(chunk_id, e.to_string()));
            }
        };

        let metadata: Metadata = first
            .metadata()
            .iter()
            .filter(|(key, _)| {
                !matches!(
                    key.as_str(),
                    CHUNK_ID_KEY | CHUNK_SEQUENCE_KEY | CHUNK_TOTAL_KEY
                )
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(SessionEvent::new(first.vendor_id(), first.event_type(), payload)
            .with_metadata_map(metadata))
    }
}

// ============================================================================
// Metadata Helpers
// ============================================================================

/// Reads a string metadata value.
fn metadata_string(metadata: &Metadata, key: &str) -> Option<String> {
    match metadata.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reads an integer that may be encoded as a number or numeric string.
fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use proptest::prelude::*;
    use serde_json::json;

    use crate::protocol::EventType;

    fn collector() -> (Reassembler, Arc<Mutex<Vec<SessionEvent>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let reassembler = Reassembler::new(Box::new(move |event| sink.lock().push(event)));
        (reassembler, received)
    }

    fn chunk(chunk_id: &str, sequence: u64, total: u64, data: &str) -> SessionEvent {
        let mut payload = crate::protocol::Payload::new();
        payload.insert(CHUNK_DATA_KEY.into(), json!(data));
        SessionEvent::new("inspector", EventType::Generic, payload)
            .with_metadata(CHUNK_ID_KEY, json!(chunk_id))
            .with_metadata(CHUNK_SEQUENCE_KEY, json!(sequence))
            .with_metadata(CHUNK_TOTAL_KEY, json!(total))
    }

    #[test]
    fn test_non_chunked_event_is_forwarded_unchanged() {
        let (reassembler, received) = collector();
        let event = SessionEvent::log("inspector", "info", "hello");

        reassembler.on_event(event.clone()).expect("forward");

        assert_eq!(received.lock().as_slice(), &[event]);
        assert_eq!(reassembler.pending_groups(), 0);
    }

    #[test]
    fn test_out_of_order_chunks_are_joined_by_sequence() {
        let (reassembler, received) = collector();
        let chunks = [
            chunk("c1", 0, 3, r#"{"a":"#),
            chunk("c1", 1, 3, r#" "b""#),
            chunk("c1", 2, 3, "}"),
        ];

        for index in [2, 0, 1] {
            reassembler.on_event(chunks[index].clone()).expect("chunk");
        }

        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].payload().get("a"), Some(&json!("b")));
        assert_eq!(received[0].event_type(), EventType::Generic);
        assert!(received[0].metadata().is_empty());
        assert_eq!(reassembler.pending_groups(), 0);
    }

    #[test]
    fn test_partial_group_stays_pending() {
        let (reassembler, received) = collector();
        reassembler.on_event(chunk("c1", 1, 2, "}")).expect("chunk");

        assert!(received.lock().is_empty());
        assert_eq!(reassembler.pending_groups(), 1);
    }

    #[test]
    fn test_abandoned_groups_are_evicted_oldest_first() {
        let (reassembler, received) = collector();
        for index in 0..=MAX_PENDING_GROUPS {
            reassembler
                .on_event(chunk(&format!("g{index}"), 0, 2, "{\"n\":"))
                .expect("chunk");
        }
        assert_eq!(reassembler.pending_groups(), MAX_PENDING_GROUPS);

        reassembler.on_event(chunk("g1", 1, 2, "1}")).expect("chunk");
        assert_eq!(received.lock().len(), 1);
        assert_eq!(received.lock()[0].payload().get("n"), Some(&json!(1)));

        // The first group is gone: its last chunk opens a fresh group.
        reassembler.on_event(chunk("g0", 1, 2, "0}")).expect("chunk");
        assert_eq!(received.lock().len(), 1);
        assert_eq!(reassembler.pending_groups(), MAX_PENDING_GROUPS);
    }

    #[test]
    fn test_parse_failure_discards_group() {
        let (reassembler, received) = collector();
        reassembler.on_event(chunk("bad", 0, 2, "{not")).expect("first chunk");

        let result = reassembler.on_event(chunk("bad", 1, 2, " json"));

        assert!(matches!(result, Err(Error::MalformedChunk { .. })));
        assert!(received.lock().is_empty());
        assert_eq!(reassembler.pending_groups(), 0);
    }

    #[test]
    fn test_duplicate_sequence_does_not_complete_group() {
        let (reassembler, received) = collector();
        reassembler.on_event(chunk("c1", 0, 2, "{")).expect("chunk");
        reassembler.on_event(chunk("c1", 0, 2, "{")).expect("duplicate");

        assert!(received.lock().is_empty());
        assert_eq!(reassembler.pending_groups(), 1);

        reassembler.on_event(chunk("c1", 1, 2, "}")).expect("chunk");
        assert_eq!(received.lock().len(), 1);
    }

    #[test]
    fn test_missing_total_is_rejected() {
        let (reassembler, _) = collector();
        let event = SessionEvent::new("inspector", EventType::Generic, Default::default())
            .with_metadata(CHUNK_ID_KEY, json!("c1"))
            .with_metadata(CHUNK_SEQUENCE_KEY, json!(0));

        assert!(reassembler.on_event(event).is_err());
        assert_eq!(reassembler.pending_groups(), 0);
    }

    #[test]
    fn test_string_encoded_numbers_are_accepted() {
        let (reassembler, received) = collector();
        let mut payload = crate::protocol::Payload::new();
        payload.insert(CHUNK_DATA_KEY.into(), json!("{}"));
        let event = SessionEvent::new("inspector", EventType::Log, payload)
            .with_metadata(CHUNK_ID_KEY, json!("c1"))
            .with_metadata(CHUNK_SEQUENCE_KEY, json!("0"))
            .with_metadata(CHUNK_TOTAL_KEY, json!("1"));

        reassembler.on_event(event).expect("single chunk");
        assert_eq!(received.lock()[0].event_type(), EventType::Log);
    }

    #[test]
    fn test_reassembled_event_inherits_extra_metadata() {
        let (reassembler, received) = collector();
        reassembler
            .on_event(chunk("c1", 0, 1, "{}").with_metadata("origin", json!("web")))
            .expect("chunk");

        let received = received.lock();
        assert_eq!(received[0].metadata().get("origin"), Some(&json!("web")));
        assert!(!received[0].metadata().contains_key(CHUNK_ID_KEY));
    }

    fn arb_order() -> impl Strategy<Value = (String, Vec<usize>)> {
        ("[a-z ]{0,40}", 1usize..8).prop_flat_map(|(text, pieces)| {
            (Just(text), Just((0..pieces).collect::<Vec<_>>()).prop_shuffle())
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

        #[test]
        fn prop_any_arrival_order_reassembles((text, order) in arb_order()) {
            let document = json!({ "text": text }).to_string();
            let pieces = order.len();
            let len = document.len();
            let fragments: Vec<&str> = (0..pieces)
                .map(|i| &document[i * len / pieces..(i + 1) * len / pieces])
                .collect();

            let (reassembler, received) = collector();
            for index in order {
                reassembler
                    .on_event(chunk("p", index as u64, pieces as u64, fragments[index]))
                    .expect("chunk");
            }

            let received = received.lock();
            prop_assert_eq!(received.len(), 1);
            prop_assert_eq!(received[0].payload().get("text"), Some(&json!(text)));
            prop_assert_eq!(reassembler.pending_groups(), 0);
        }
    }
}
