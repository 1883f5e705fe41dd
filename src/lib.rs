//! Event log and read-model projector for StockFellow users and groups.
//!
//! Writes append immutable events; reads come from snapshots that are always
//! recomputed from the full event history of one aggregate.

pub mod commands;
pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod models;
pub mod projections;
pub mod utils;

pub use config::Config;
pub use error::{CommandError, StoreError};
pub use events::{DomainEvent, Event, EventLog, IdFields, MemoryEventLog, SqliteEventLog};
pub use projections::{
    GroupReadModel, MemorySnapshotStore, ReadModelProjector, SnapshotStore, SqliteSnapshotStore,
    UserReadModel,
};
