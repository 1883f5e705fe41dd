//! Read-model projection: replay an aggregate's full history and upsert the
//! resulting snapshot.
//!
//! Every rebuild re-reads every event of the aggregate. The snapshot is only a
//! cache of `fold(events)`; it can be thrown away and rebuilt at any time.

use std::fmt::Debug;
use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::StoreError;
use crate::events::{DomainEvent, Event, EventLog, IdFields};

pub mod group;
pub mod store;
pub mod user;

pub use group::{rejection_count, GroupProjection};
pub use store::{MemorySnapshotStore, SnapshotStore, SqliteSnapshotStore};
pub use user::UserProjection;

/// How one aggregate kind folds its events.
pub trait Projection: Send + Sync + 'static {
    /// Namespace of this kind's snapshots in the store.
    const KIND: &'static str;

    type Snapshot: Serialize + DeserializeOwned + Clone + Debug + PartialEq + Send + Sync;

    /// Payload fields that tie an event to this kind's aggregate id.
    fn id_fields() -> IdFields;

    /// Apply one event. Creation events replace the state; incremental events
    /// need an existing state; everything else leaves the state as it was.
    fn apply(
        state: Option<Self::Snapshot>,
        event: &DomainEvent,
        timestamp: DateTime<Utc>,
    ) -> Option<Self::Snapshot>;
}

/// Fold an event history into a snapshot, oldest first, ties by sequence.
pub fn fold<P: Projection>(events: &[Event]) -> Option<P::Snapshot> {
    let mut ordered: Vec<&Event> = events.iter().collect();
    ordered.sort_by_key(|e| (e.timestamp, e.sequence));

    ordered.into_iter().fold(None, |state, event| match event.decode() {
        Ok(domain) => P::apply(state, &domain, event.timestamp),
        Err(e) => {
            tracing::warn!(
                sequence = event.sequence,
                event_type = %event.event_type,
                error = %e,
                "Skipping event with undecodable payload"
            );
            state
        }
    })
}

/// Rebuilds and serves the read model of one aggregate kind.
pub struct ReadModelProjector<P, L, S> {
    events: L,
    store: S,
    _projection: PhantomData<fn() -> P>,
}

pub type GroupReadModel<L, S> = ReadModelProjector<GroupProjection, L, S>;
pub type UserReadModel<L, S> = ReadModelProjector<UserProjection, L, S>;

impl<P, L, S> Clone for ReadModelProjector<P, L, S>
where
    L: Clone,
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            events: self.events.clone(),
            store: self.store.clone(),
            _projection: PhantomData,
        }
    }
}

impl<P, L, S> ReadModelProjector<P, L, S>
where
    P: Projection,
    L: EventLog,
    S: SnapshotStore,
{
    pub fn new(events: L, store: S) -> Self {
        Self {
            events,
            store,
            _projection: PhantomData,
        }
    }

    pub fn event_log(&self) -> &L {
        &self.events
    }

    /// Replay the full history of `aggregate_id` and upsert the result. An
    /// empty history writes nothing.
    pub async fn rebuild_state(&self, aggregate_id: &str) -> Result<(), StoreError> {
        let events = self.events.get_events(&P::id_fields(), aggregate_id).await?;

        let Some(snapshot) = fold::<P>(&events) else {
            tracing::debug!(kind = P::KIND, aggregate_id, "No state to project");
            return Ok(());
        };

        self.store.upsert(P::KIND, aggregate_id, &snapshot).await?;
        tracing::info!(
            kind = P::KIND,
            aggregate_id,
            events = events.len(),
            "Rebuilt state"
        );
        Ok(())
    }

    pub async fn get_by_aggregate_id(&self, aggregate_id: &str) -> Result<Option<P::Snapshot>, StoreError> {
        self.store.get(P::KIND, aggregate_id).await
    }

    pub async fn get_all(&self) -> Result<Vec<P::Snapshot>, StoreError> {
        self.store.all(P::KIND).await
    }
}
