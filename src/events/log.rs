use std::future::Future;

use serde_json::Value;

use super::{DomainEvent, Event};
use crate::error::StoreError;

/// Payload fields that identify which aggregate an event belongs to.
///
/// An event matches when ANY listed field equals the requested id. The group
/// read model filters on `groupId`, the user read model on `userId`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdFields(Vec<String>);

impl IdFields {
    pub fn single(field: &str) -> Self {
        IdFields(vec![field.to_string()])
    }

    pub fn any<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        IdFields(fields.into_iter().map(Into::into).collect())
    }

    pub fn group() -> Self {
        Self::single("groupId")
    }

    pub fn user() -> Self {
        Self::single("userId")
    }

    pub fn fields(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when `data` carries `aggregate_id` under one of the fields.
    pub fn matches(&self, data: &Value, aggregate_id: &str) -> bool {
        self.0
            .iter()
            .any(|field| data.get(field).and_then(Value::as_str) == Some(aggregate_id))
    }
}

/// Append-only store of domain events.
///
/// No update or delete; appended events are immutable.
pub trait EventLog: Send + Sync {
    /// Persist an event with a store-assigned timestamp. The payload is never
    /// validated here.
    fn append_event(
        &self,
        event_type: &str,
        data: Value,
    ) -> impl Future<Output = Result<Event, StoreError>> + Send;

    /// All events for `aggregate_id`, oldest first; equal timestamps keep
    /// insertion order. No match is an empty vec, not an error.
    fn get_events(
        &self,
        filter: &IdFields,
        aggregate_id: &str,
    ) -> impl Future<Output = Result<Vec<Event>, StoreError>> + Send;

    fn append(&self, event: &DomainEvent) -> impl Future<Output = Result<Event, StoreError>> + Send {
        async move {
            let data = event.to_data()?;
            self.append_event(event.event_type(), data).await
        }
    }

    fn get_events_by_type(
        &self,
        filter: &IdFields,
        aggregate_id: &str,
        event_type: &str,
    ) -> impl Future<Output = Result<Vec<Event>, StoreError>> + Send {
        async move {
            let events = self.get_events(filter, aggregate_id).await?;
            Ok(events
                .into_iter()
                .filter(|e| e.event_type == event_type)
                .collect())
        }
    }
}
