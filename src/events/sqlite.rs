//! SQLite-backed event log.

use serde_json::Value;
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqlitePool};

use super::{Event, EventLog, IdFields};
use crate::error::StoreError;
use crate::utils::date;

#[derive(Clone, Debug)]
pub struct SqliteEventLog {
    pool: SqlitePool,
}

struct EventRow {
    sequence: i64,
    event_type: String,
    data: String,
    timestamp: i64,
}

impl<'r> FromRow<'r, SqliteRow> for EventRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(EventRow {
            sequence: row.try_get("sequence")?,
            event_type: row.try_get("event_type")?,
            data: row.try_get("data")?,
            timestamp: row.try_get("timestamp")?,
        })
    }
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Event {
            sequence: row.sequence,
            event_type: row.event_type,
            data: serde_json::from_str(&row.data)?,
            timestamp: date::from_millis(row.timestamp),
        })
    }
}

/// JSON path for a payload key. Plain identifiers use the same form as the
/// indexes in the migrations so SQLite can use them.
fn json_path(field: &str) -> String {
    if field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        format!("$.{}", field)
    } else {
        format!("$.\"{}\"", field.replace('"', "\\\""))
    }
}

impl SqliteEventLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

impl EventLog for SqliteEventLog {
    async fn append_event(&self, event_type: &str, data: Value) -> Result<Event, StoreError> {
        let data_json = serde_json::to_string(&data)?;
        // Clamp to the newest stored timestamp so a clock step backwards cannot
        // reorder history.
        let row = sqlx::query(
            r#"
            INSERT INTO events (event_type, data, timestamp)
            VALUES (?1, ?2, MAX(?3, COALESCE((SELECT MAX(timestamp) FROM events), 0)))
            RETURNING sequence, timestamp
            "#,
        )
        .bind(event_type)
        .bind(&data_json)
        .bind(date::now_millis())
        .fetch_one(&self.pool)
        .await?;

        let event = Event {
            sequence: row.try_get("sequence")?,
            event_type: event_type.to_string(),
            data,
            timestamp: date::from_millis(row.try_get("timestamp")?),
        };
        tracing::debug!(
            sequence = event.sequence,
            event_type = %event.event_type,
            "Appended event"
        );
        Ok(event)
    }

    async fn get_events(&self, filter: &IdFields, aggregate_id: &str) -> Result<Vec<Event>, StoreError> {
        if filter.is_empty() {
            return Ok(vec![]);
        }

        // ?1 is the id, ?2.. are the JSON paths.
        let clauses: Vec<String> = (0..filter.fields().len())
            .map(|i| format!("json_extract(data, ?{}) = ?1", i + 2))
            .collect();
        let sql = format!(
            "SELECT sequence, event_type, data, timestamp FROM events WHERE {} ORDER BY timestamp ASC, sequence ASC",
            clauses.join(" OR ")
        );

        let mut query = sqlx::query_as::<_, EventRow>(&sql).bind(aggregate_id);
        for field in filter.fields() {
            query = query.bind(json_path(field));
        }
        let rows = query.fetch_all(&self.pool).await?;

        let events = rows
            .into_iter()
            .map(Event::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(
            aggregate_id,
            fields = ?filter.fields(),
            count = events.len(),
            "Loaded events"
        );
        Ok(events)
    }

    async fn get_events_by_type(
        &self,
        filter: &IdFields,
        aggregate_id: &str,
        event_type: &str,
    ) -> Result<Vec<Event>, StoreError> {
        if filter.is_empty() {
            return Ok(vec![]);
        }

        let clauses: Vec<String> = (0..filter.fields().len())
            .map(|i| format!("json_extract(data, ?{}) = ?1", i + 3))
            .collect();
        let sql = format!(
            "SELECT sequence, event_type, data, timestamp FROM events WHERE event_type = ?2 AND ({}) ORDER BY timestamp ASC, sequence ASC",
            clauses.join(" OR ")
        );

        let mut query = sqlx::query_as::<_, EventRow>(&sql)
            .bind(aggregate_id)
            .bind(event_type);
        for field in filter.fields() {
            query = query.bind(json_path(field));
        }
        let rows = query.fetch_all(&self.pool).await?;

        rows.into_iter().map(Event::try_from).collect()
    }
}
