#[cfg(test)]
mod tests {
    use crate::config::EngineLockConfig;
    use crate::constraint::{Constraint, ConstraintRule};
    use crate::infrastructure::EventSink;
    use crate::infrastructure_in_memory::InMemoryEventLog;
    use crate::lock_manager::LockManager;
    use crate::scheduler::{
        NO_SUITABLE_ROOMS, NO_TIME_SLOTS, OptimizationObjective, OptimizationReport, RoomRequirements,
        ScheduleRequest, ScheduleStatus, SchedulingEngine,
    };
    use crate::types::{LockType, Room, TimeSlot};
    use chrono::Weekday;
    use std::collections::BTreeSet;
    use std::sync::{Arc, Barrier};

    fn slot(day: Weekday, start: &str, end: &str) -> TimeSlot {
        TimeSlot::parse(day, start, end).unwrap()
    }

    fn engine_with(rooms: &[(&str, u32)]) -> SchedulingEngine {
        let engine = SchedulingEngine::new(Arc::new(LockManager::new()));
        for (number, capacity) in rooms {
            engine.add_room(Room::new(*number, *number, "ENG", "lecture", *capacity));
        }
        engine
    }

    fn request(section: &str, slots: Vec<TimeSlot>, min_capacity: u32) -> ScheduleRequest {
        ScheduleRequest::new(section, slots)
            .with_requirements(RoomRequirements::min_capacity(min_capacity))
    }

    #[test]
    fn too_large_a_request_finds_no_room() {
        let engine = engine_with(&[("R-100", 30), ("R-200", 20)]);
        let result = engine.schedule(&request("S1", vec![slot(Weekday::Mon, "09:00", "10:00")], 40));

        assert!(!result.success);
        assert_eq!(result.conflicts, vec![NO_SUITABLE_ROOMS.to_string()]);
        assert!(result.schedule_id.is_none());
    }

    #[test]
    fn picks_closest_capacity_then_room_number() {
        let engine = engine_with(&[("R-300", 50), ("R-200", 35), ("R-100", 29), ("R-150", 35)]);
        let result = engine.schedule(&request("S1", vec![slot(Weekday::Tue, "09:00", "10:00")], 32));

        assert!(result.success);
        assert_eq!(result.assigned_room.as_deref(), Some("R-150"));
        assert_eq!(result.soft_score, 1.0);
    }

    #[test]
    fn overlapping_booking_in_same_room_is_rejected() {
        let engine = engine_with(&[("R-100", 30)]);
        let first = engine.schedule(&request("S1", vec![slot(Weekday::Mon, "09:00", "10:30")], 20));
        assert!(first.success);

        let second = engine.schedule(&request("S2", vec![slot(Weekday::Mon, "10:00", "11:00")], 20));
        assert!(!second.success);
        assert!(!second.conflicts.is_empty());
        assert!(second.conflicts[0].contains("R-100"));

        // Touching intervals do not overlap
        let third = engine.schedule(&request("S3", vec![slot(Weekday::Mon, "10:30", "11:30")], 20));
        assert!(third.success);

        // Same times on another day are free
        let fourth = engine.schedule(&request("S4", vec![slot(Weekday::Wed, "09:00", "10:30")], 20));
        assert!(fourth.success);
    }

    #[test]
    fn inverted_slot_is_refused_on_the_wire() {
        let inverted = serde_json::json!({ "day": "Mon", "start": "10:00:00", "end": "09:00:00" });
        assert!(serde_json::from_value::<TimeSlot>(inverted).is_err());

        let zero_length = serde_json::json!({ "day": "Mon", "start": "09:00:00", "end": "09:00:00" });
        assert!(serde_json::from_value::<TimeSlot>(zero_length).is_err());

        let wire = serde_json::json!({
            "section_id": "S3",
            "time_slots": [{ "day": "Mon", "start": "10:00:00", "end": "09:00:00" }],
        });
        assert!(serde_json::from_value::<ScheduleRequest>(wire).is_err());

        let valid = serde_json::json!({ "day": "Mon", "start": "09:00:00", "end": "10:00:00" });
        assert_eq!(
            serde_json::from_value::<TimeSlot>(valid).unwrap(),
            slot(Weekday::Mon, "09:00", "10:00")
        );
    }

    #[test]
    fn request_without_slots_books_nothing() {
        let engine = engine_with(&[("R-100", 30)]);
        let result = engine.schedule(&request("S3", Vec::new(), 10));

        assert!(!result.success);
        assert_eq!(result.conflicts, vec![NO_TIME_SLOTS.to_string()]);
        assert_eq!(engine.statistics().total_schedules, 0);
        assert!(engine.room_schedule("R-100").is_empty());
    }

    #[test]
    fn cancel_frees_the_room() {
        let engine = engine_with(&[("R-100", 30)]);
        let mon = vec![slot(Weekday::Mon, "09:00", "10:00")];
        let first = engine.schedule(&request("S1", mon.clone(), 20));
        let id = first.schedule_id.unwrap();

        assert!(engine.cancel(&id));
        assert_eq!(engine.get_schedule(&id).unwrap().status, ScheduleStatus::Cancelled);
        assert!(engine.room_schedule("R-100").is_empty());
        assert!(!engine.cancel(&id));
        assert!(!engine.cancel("missing"));

        assert!(engine.schedule(&request("S2", mon, 20)).success);
    }

    #[test]
    fn room_filters_apply() {
        let engine = SchedulingEngine::new(Arc::new(LockManager::new()));
        engine.add_room(Room::new("plain", "A-1", "ENG", "lab", 30));
        engine.add_room(
            Room::new("secure", "A-2", "ENG", "lab", 30)
                .with_equipment(["projector", "fume_hood"])
                .with_access_control(true),
        );
        engine.add_room(Room::new("hall", "A-0", "ENG", "lecture", 30).with_equipment(["projector"]));

        let req = ScheduleRequest::new("S1", vec![slot(Weekday::Fri, "13:00", "14:00")]).with_requirements(
            RoomRequirements::min_capacity(10)
                .with_room_type("lab")
                .with_equipment(["projector"])
                .with_access_control(),
        );
        assert_eq!(engine.schedule(&req).assigned_room.as_deref(), Some("secure"));
    }

    #[test]
    fn hard_constraints_block_and_unknown_ids_conflict() {
        let engine = engine_with(&[("R-100", 30)]);
        engine.add_constraint(
            "prof-mornings",
            Constraint::hard(ConstraintRule::InstructorAvailability {
                instructor_id: "prof".into(),
                windows: vec![slot(Weekday::Mon, "08:00", "12:00")],
            }),
        );

        let afternoon = request("S1", vec![slot(Weekday::Mon, "13:00", "14:00")], 10)
            .with_constraint("prof-mornings")
            .with_constraint("nope");
        let result = engine.schedule(&afternoon);
        assert!(!result.success);
        assert!(result.conflicts.contains(&"Constraint violation: prof-mornings".to_string()));
        assert!(result.conflicts.contains(&"Unknown constraint: nope".to_string()));

        let morning = request("S1", vec![slot(Weekday::Mon, "09:00", "10:00")], 10)
            .with_constraint("prof-mornings");
        assert!(engine.schedule(&morning).success);
    }

    #[test]
    fn soft_constraints_only_score() {
        let engine = engine_with(&[("R-100", 30)]);
        engine.add_constraint(
            "prefer-labs",
            Constraint::soft(
                ConstraintRule::RoomPreference {
                    room_types: BTreeSet::from(["lab".to_string()]),
                    facilities: BTreeSet::new(),
                },
                0.5,
            ),
        );
        engine.add_constraint(
            "big-room",
            Constraint::soft(ConstraintRule::RoomCapacity { required: 25 }, 1.5),
        );

        let result = engine.schedule(
            &request("S1", vec![slot(Weekday::Thu, "09:00", "10:00")], 10)
                .with_constraint("prefer-labs")
                .with_constraint("big-room"),
        );
        assert!(result.success);
        assert!((result.soft_score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn removed_constraint_becomes_unknown() {
        let engine = engine_with(&[("R-100", 30)]);
        engine.add_constraint("any", Constraint::hard(ConstraintRule::custom("always", |_| true)));
        assert!(engine.remove_constraint("any"));
        assert!(!engine.remove_constraint("any"));

        let result = engine.schedule(&request("S1", vec![slot(Weekday::Mon, "09:00", "10:00")], 10).with_constraint("any"));
        assert!(!result.success);
    }

    #[test]
    fn held_section_lock_is_reported_as_concurrency_conflict() {
        let locks = Arc::new(LockManager::new());
        let engine = SchedulingEngine::new(locks.clone())
            .with_config(EngineLockConfig::default().with_retries(0));
        engine.add_room(Room::new("R-100", "R-100", "ENG", "lecture", 30));
        locks.acquire("scheduling:S1", LockType::Write, "registrar-admin", None).unwrap();

        let result = engine.schedule(&request("S1", vec![slot(Weekday::Mon, "09:00", "10:00")], 10));
        assert!(!result.success);
        assert!(result.conflicts[0].starts_with("Concurrency error"));
    }

    #[test]
    fn concurrent_requests_for_one_room_admit_exactly_one() {
        const SECTIONS: usize = 8;
        let engine = Arc::new(engine_with(&[("R-100", 30)]));
        let barrier = Arc::new(Barrier::new(SECTIONS));

        let handles: Vec<_> = (0..SECTIONS)
            .map(|i| {
                let engine = engine.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    engine.schedule(&request(
                        &format!("S{i}"),
                        vec![slot(Weekday::Mon, "09:00", "10:00")],
                        10,
                    ))
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| r.success)
            .count();
        assert_eq!(successes, 1);
        assert_eq!(engine.room_schedule("R-100").len(), 1);
    }

    #[test]
    fn optimize_reports_without_changing_state() {
        let engine = engine_with(&[("R-100", 30), ("R-200", 10)]);
        let s1 = engine
            .schedule(&request(
                "S1",
                vec![slot(Weekday::Mon, "09:00", "10:00"), slot(Weekday::Wed, "09:00", "10:00")],
                30,
            ))
            .schedule_id
            .unwrap();
        assert!(engine.activate(&s1));
        assert!(!engine.activate(&s1));

        match engine.optimize(OptimizationObjective::MaximizeRoomUtilization) {
            OptimizationReport::MaximizeRoomUtilization {
                total_capacity,
                utilized_capacity,
                utilization_rate,
            } => {
                assert_eq!(total_capacity, 40);
                assert_eq!(utilized_capacity, 60);
                assert!((utilization_rate - 1.5).abs() < 1e-9);
            }
            other => panic!("unexpected report {other:?}"),
        }

        match engine.optimize(OptimizationObjective::MinimizeConflicts) {
            OptimizationReport::MinimizeConflicts { total_conflicts, .. } => {
                assert_eq!(total_conflicts, 0)
            }
            other => panic!("unexpected report {other:?}"),
        }

        assert_eq!(engine.get_schedule(&s1).unwrap().status, ScheduleStatus::Active);
        assert_eq!(engine.statistics().active_schedules, 1);
    }

    #[test]
    fn objective_parses_from_wire_names() {
        assert_eq!(
            "maximize_room_utilization".parse::<OptimizationObjective>().unwrap(),
            OptimizationObjective::MaximizeRoomUtilization
        );
        assert!("fastest".parse::<OptimizationObjective>().is_err());
    }

    #[test]
    fn create_and_cancel_are_published() {
        let log = Arc::new(InMemoryEventLog::new());
        let engine = engine_with(&[("R-100", 30)]).with_event_sink(log.clone() as Arc<dyn EventSink>);
        let id = engine
            .schedule(&request("S1", vec![slot(Weekday::Mon, "09:00", "10:00")], 10))
            .schedule_id
            .unwrap();
        engine.cancel(&id);

        let kinds: Vec<String> = log
            .events_for("scheduling:S1")
            .iter()
            .map(|e| e.payload["type"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(kinds, vec!["schedule_created", "schedule_cancelled"]);
    }
}
