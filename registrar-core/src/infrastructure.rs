use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::types::Entity;

// The kernel keeps its own state in memory. Durability and audit are owned by
// the collaborators below; any backend satisfying these contracts can be
// plugged into `Registrar`.

/// Top-level JSON field -> expected value. Records match when every field is equal.
pub type Filter = BTreeMap<String, serde_json::Value>;

/// Defines the contract for entity storage backends.
pub trait Repository<T>: Send + Sync
where
    T: Entity + Serialize + DeserializeOwned,
{
    /// Insert or update by id
    fn save(&self, entity: &T) -> Result<()>;

    /// Returns an independent copy of the stored record
    fn find_by_id(&self, id: &str) -> Result<Option<T>>;

    /// All records, optionally narrowed by a field filter
    fn find_all(&self, filter: Option<&Filter>) -> Result<Vec<T>>;

    /// Returns false when nothing was stored under `id`
    fn delete(&self, id: &str) -> Result<bool>;
}

pub(crate) fn matches_filter(record: &serde_json::Value, filter: Option<&Filter>) -> bool {
    match filter {
        None => true,
        Some(filter) => filter
            .iter()
            .all(|(field, expected)| record.get(field) == Some(expected)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Enrollment,
    Scheduling,
    Coordination,
}

/// A typed domain event handed to the event collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub event_type: EventType,
    /// e.g. `enrollment:CS101-A`
    pub stream_id: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(event_type: EventType, stream_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_type,
            stream_id: stream_id.into(),
            payload,
            occurred_at: Utc::now(),
        }
    }
}

/// Receives domain events for audit and observability.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn publish(&self, _event: DomainEvent) {}
}
