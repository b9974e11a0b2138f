#[cfg(test)]
mod tests {
    use crate::infrastructure::{DomainEvent, EventSink, EventType, Filter, Repository};
    use crate::infrastructure_in_memory::{InMemoryEventLog, InMemoryRepository};
    use crate::types::{Room, Section};
    use serde_json::json;

    fn lab(id: &str, capacity: u32) -> Room {
        Room::new(id, id, "ENG", "lab", capacity).with_equipment(["projector"])
    }

    fn exercise_repository(repo: &dyn Repository<Room>) {
        repo.save(&lab("R-101", 30)).unwrap();
        repo.save(&lab("R-102", 40)).unwrap();

        // Save on an existing id updates in place
        repo.save(&lab("R-101", 35)).unwrap();
        let found = repo.find_by_id("R-101").unwrap().expect("saved room");
        assert_eq!(found.capacity, 35);
        assert_eq!(repo.find_all(None).unwrap().len(), 2);

        let mut filter = Filter::new();
        filter.insert("capacity".into(), json!(40));
        let hits = repo.find_all(Some(&filter)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "R-102");

        assert!(repo.delete("R-102").unwrap());
        assert!(!repo.delete("R-102").unwrap());
        assert!(repo.find_by_id("R-102").unwrap().is_none());
    }

    #[test]
    fn in_memory_repository_crud() {
        let repo = InMemoryRepository::<Room>::new();
        exercise_repository(&repo);
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn in_memory_repository_returns_deep_copies() {
        let repo = InMemoryRepository::<Section>::new();
        repo.save(&Section::new("S1", "CS101", "A", 30).unwrap()).unwrap();

        let mut copy = repo.find_by_id("S1").unwrap().unwrap();
        copy.capacity = 1;

        assert_eq!(repo.find_by_id("S1").unwrap().unwrap().capacity, 30);
    }

    #[test]
    fn event_log_records_in_order_and_by_stream() {
        let log = InMemoryEventLog::new();
        log.publish(DomainEvent::new(EventType::Enrollment, "enrollment:S1", json!({"n": 1})));
        log.publish(DomainEvent::new(EventType::Scheduling, "scheduling:S2", json!({"n": 2})));
        log.publish(DomainEvent::new(EventType::Enrollment, "enrollment:S1", json!({"n": 3})));

        assert_eq!(log.len(), 3);
        let s1 = log.events_for("enrollment:S1");
        assert_eq!(s1.len(), 2);
        assert_eq!(s1[1].payload["n"], 3);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn sqlite_repository_crud() {
        use crate::infrastructure_sqlite::SqliteRepository;
        let repo = SqliteRepository::<Room>::open_in_memory().unwrap();
        exercise_repository(&repo);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn sqlite_repository_survives_reopen() {
        use crate::infrastructure_sqlite::SqliteRepository;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registrar.db");
        let path = path.to_str().unwrap();

        {
            let repo = SqliteRepository::<Section>::open(path).unwrap();
            repo.save(&Section::new("S1", "CS101", "A", 25).unwrap()).unwrap();
        }

        let repo = SqliteRepository::<Section>::open(path).unwrap();
        assert_eq!(repo.find_by_id("S1").unwrap().unwrap().capacity, 25);
    }
}
