use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::marker::PhantomData;

use crate::error::Result;
use crate::infrastructure::{DomainEvent, EventSink, Filter, Repository, matches_filter};
use crate::types::Entity;

/// Repository keeping records as serialized JSON, so every read is a deep copy.
pub struct InMemoryRepository<T> {
    // Map of Entity ID -> serialized record
    records: RwLock<HashMap<String, serde_json::Value>>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> InMemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            _entity: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl<T> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Repository<T> for InMemoryRepository<T>
where
    T: Entity + Serialize + DeserializeOwned,
{
    fn save(&self, entity: &T) -> Result<()> {
        let value = serde_json::to_value(entity)?;
        self.records.write().insert(entity.id().to_string(), value);
        Ok(())
    }

    fn find_by_id(&self, id: &str) -> Result<Option<T>> {
        let records = self.records.read();
        match records.get(id) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    fn find_all(&self, filter: Option<&Filter>) -> Result<Vec<T>> {
        let records = self.records.read();
        let mut ids: Vec<&String> = records
            .iter()
            .filter(|(_, value)| matches_filter(value, filter))
            .map(|(id, _)| id)
            .collect();
        ids.sort();

        ids.into_iter()
            .map(|id| Ok(serde_json::from_value(records[id].clone())?))
            .collect()
    }

    fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.records.write().remove(id).is_some())
    }
}

/// Event sink that records everything it receives, in order.
#[derive(Default)]
pub struct InMemoryEventLog {
    events: Mutex<Vec<DomainEvent>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().clone()
    }

    pub fn events_for(&self, stream_id: &str) -> Vec<DomainEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.stream_id == stream_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for InMemoryEventLog {
    fn publish(&self, event: DomainEvent) {
        self.events.lock().push(event);
    }
}
