#[cfg(test)]
mod tests {
    use crate::client::Registrar;
    use crate::config::RegistrarConfig;
    use crate::enrollment::EnrollmentOutcome;
    use crate::error::RegistrarError;
    use crate::infrastructure::EventSink;
    use crate::infrastructure_in_memory::InMemoryEventLog;
    use crate::scheduler::{RoomRequirements, ScheduleRequest};
    use crate::types::{GradeLevel, LockType, Person, Room, Section, TimeSlot};
    use chrono::Weekday;
    use std::sync::Arc;
    use std::time::Duration;

    fn seeded() -> Registrar {
        let registrar = Registrar::new();
        for id in ["A", "B", "C"] {
            registrar
                .register_person(&Person::student(id, id, "Doe", GradeLevel::Sophomore, Some(3.0)).unwrap())
                .unwrap();
        }
        registrar
            .register_section(&Section::new("CS101-A", "CS101", "A", 2).unwrap())
            .unwrap();
        registrar
            .register_room(Room::new("R-1", "101", "ENG", "lecture", 30))
            .unwrap();
        registrar
    }

    #[test]
    fn enrollment_by_id() {
        let registrar = seeded();
        assert_eq!(registrar.enroll("A", "CS101-A").unwrap().outcome, EnrollmentOutcome::Enrolled);
        registrar.enroll("B", "CS101-A").unwrap();
        let c = registrar.enroll("C", "CS101-A").unwrap();
        assert_eq!(c.waitlist_position, Some(1));

        registrar.drop("A", "CS101-A").unwrap();
        assert_eq!(registrar.get_enrollments("C"), vec!["CS101-A".to_string()]);
        assert!(registrar.waitlist("CS101-A").unwrap().is_empty());
        assert_eq!(registrar.statistics().enrollment.total_enrollments, 2);
    }

    #[test]
    fn large_section_waitlists_past_capacity() {
        let registrar = Registrar::new();
        registrar
            .register_section(&Section::new("HIST100-A", "HIST100", "A", 40).unwrap())
            .unwrap();

        let mut outcomes = Vec::new();
        for i in 0..45 {
            let id = format!("st-{:02}", i);
            registrar
                .register_person(&Person::student(id.as_str(), "S", "Doe", GradeLevel::Junior, Some(3.0)).unwrap())
                .unwrap();
            outcomes.push(registrar.enroll(&id, "HIST100-A").unwrap().outcome);
        }

        let enrolled = outcomes.iter().filter(|o| **o == EnrollmentOutcome::Enrolled).count();
        let waitlisted = outcomes.iter().filter(|o| **o == EnrollmentOutcome::Waitlisted).count();
        assert_eq!((enrolled, waitlisted), (40, 5));
        assert_eq!(outcomes[30], EnrollmentOutcome::Enrolled);
        assert_eq!(registrar.waitlist("HIST100-A").unwrap().first().map(String::as_str), Some("st-40"));
        assert_eq!(registrar.statistics().enrollment.total_rejected, 0);
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let registrar = seeded();
        assert_eq!(
            registrar.enroll("Z", "CS101-A").unwrap_err(),
            RegistrarError::not_found("person", "Z")
        );
        assert!(matches!(
            registrar.enroll("A", "NOPE"),
            Err(RegistrarError::NotFound { kind: "section", .. })
        ));
        assert!(matches!(
            registrar.get_schedule("missing"),
            Err(RegistrarError::NotFound { kind: "schedule", .. })
        ));
        let request = ScheduleRequest::new("NOPE", Vec::new());
        assert!(registrar.schedule(&request).is_err());
    }

    #[test]
    fn scheduling_through_the_facade() {
        let registrar = seeded();
        let request = ScheduleRequest::new(
            "CS101-A",
            vec![TimeSlot::parse(Weekday::Tue, "14:00", "15:30").unwrap()],
        )
        .with_requirements(RoomRequirements::min_capacity(25));

        let result = registrar.schedule(&request).unwrap();
        assert!(result.success);
        let id = result.schedule_id.unwrap();
        assert_eq!(registrar.get_schedule(&id).unwrap().room_id, "R-1");
        assert!(registrar.cancel_schedule(&id));
    }

    #[test]
    fn raw_locks_and_sweeper() {
        let mut config = RegistrarConfig::default();
        config.locks.sweep_interval = Duration::from_millis(20);
        let registrar = Registrar::in_memory(config, Arc::new(InMemoryEventLog::new()) as Arc<dyn EventSink>);

        let lock = registrar
            .acquire_lock("R1", LockType::Write, "X", Some(Duration::from_millis(50)))
            .unwrap();
        assert!(registrar.acquire_lock("R1", LockType::Read, "Y", None).unwrap_err().is_concurrency());
        assert_eq!(registrar.locks_on("R1").len(), 1);

        let sweeper = registrar.start_expiry_sweeper();
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(registrar.statistics().active_locks, 0);
        assert!(!registrar.release_lock(&lock));
        sweeper.shutdown();
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn sqlite_registrar_reloads_rooms() {
        use crate::infrastructure::NoopEventSink;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registrar.db");
        let path = path.to_str().unwrap();

        {
            let registrar = Registrar::with_sqlite(path, RegistrarConfig::default(), Arc::new(NoopEventSink)).unwrap();
            registrar.register_room(Room::new("R-9", "909", "SCI", "lab", 12)).unwrap();
            registrar
                .register_person(&Person::student("A", "A", "Doe", GradeLevel::Senior, None).unwrap())
                .unwrap();
        }

        let registrar = Registrar::with_sqlite(path, RegistrarConfig::default(), Arc::new(NoopEventSink)).unwrap();
        assert_eq!(registrar.scheduling().rooms().len(), 1);
        assert_eq!(registrar.person("A").unwrap().last_name, "Doe");
        assert_eq!(
            registrar.enroll("A", "missing").unwrap_err(),
            RegistrarError::not_found("section", "missing")
        );
    }
}
