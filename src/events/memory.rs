//! In-process event log for tests and embedding.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use super::{Event, EventLog, IdFields};
use crate::error::StoreError;
use crate::utils::date;

#[derive(Default)]
struct Inner {
    events: Vec<Event>,
    next_sequence: i64,
}

/// Cloning shares the same underlying log.
#[derive(Clone, Default)]
pub struct MemoryEventLog {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.events.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl EventLog for MemoryEventLog {
    async fn append_event(&self, event_type: &str, data: Value) -> Result<Event, StoreError> {
        let mut inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        let last = inner.events.last().map(|e| e.timestamp.timestamp_millis()).unwrap_or(0);
        inner.next_sequence += 1;
        let event = Event {
            sequence: inner.next_sequence,
            event_type: event_type.to_string(),
            data,
            timestamp: date::from_millis(date::now_millis().max(last)),
        };
        inner.events.push(event.clone());
        tracing::debug!(sequence = event.sequence, event_type, "Appended event");
        Ok(event)
    }

    async fn get_events(&self, filter: &IdFields, aggregate_id: &str) -> Result<Vec<Event>, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        let mut events: Vec<Event> = inner
            .events
            .iter()
            .filter(|e| filter.matches(&e.data, aggregate_id))
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.timestamp, e.sequence));
        Ok(events)
    }
}
