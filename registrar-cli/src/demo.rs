//! Walks the enrollment, scheduling, 2PC, lock and election scenarios
//! against a fresh in-memory kernel and prints each outcome as JSON.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use registrar_core::client::Registrar;
use registrar_core::config::RegistrarConfig;
use registrar_core::coordinator::{Participant, TransactionCoordinator};
use registrar_core::election::{LeaderElection, SilentTransport};
use registrar_core::infrastructure::EventSink;
use registrar_core::infrastructure_in_memory::InMemoryEventLog;
use registrar_core::scheduler::{RoomRequirements, ScheduleRequest};
use registrar_core::types::{GradeLevel, LockType, Person, Room, Section, TimeSlot};
use registrar_core::Result;

/// Votes as configured and counts the commits it receives.
struct ScriptedParticipant {
    vote: bool,
    commits: AtomicUsize,
}

impl ScriptedParticipant {
    fn new(vote: bool) -> Arc<Self> {
        Arc::new(Self {
            vote,
            commits: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Participant for ScriptedParticipant {
    async fn prepare(&self, _operation_id: &str, _data: &Value) -> bool {
        self.vote
    }

    async fn commit(&self, _operation_id: &str) -> bool {
        self.commits.fetch_add(1, Ordering::SeqCst);
        true
    }

    async fn abort(&self, _operation_id: &str) -> bool {
        true
    }
}

fn print_step(title: &str, body: Value) -> Result<()> {
    println!("== {}", title);
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

pub async fn run(config: RegistrarConfig) -> std::result::Result<(), String> {
    scenarios(config).await.map_err(|e| e.to_string())
}

async fn scenarios(config: RegistrarConfig) -> Result<()> {
    let events = Arc::new(InMemoryEventLog::new());
    let registrar = Registrar::in_memory(config.clone(), events.clone() as Arc<dyn EventSink>);

    for (id, first) in [("A", "Alice"), ("B", "Bob"), ("C", "Carol")] {
        registrar.register_person(&Person::student(id, first, "Demo", GradeLevel::Junior, Some(3.2))?)?;
    }
    registrar.register_section(&Section::new("CS101-A", "CS101", "A", 2)?)?;
    registrar.register_room(Room::new("R-101", "101", "ENG", "lecture", 30))?;

    let a = registrar.enroll("A", "CS101-A")?;
    let b = registrar.enroll("B", "CS101-A")?;
    let c = registrar.enroll("C", "CS101-A")?;
    print_step("enroll three students into a two-seat section", json!({ "A": a, "B": b, "C": c }))?;

    let dropped = registrar.drop("A", "CS101-A")?;
    print_step(
        "drop A and promote the waitlist head",
        json!({
            "drop": dropped,
            "C_enrollments": registrar.get_enrollments("C"),
            "waitlist": registrar.waitlist("CS101-A")?,
        }),
    )?;

    let request = ScheduleRequest::new("CS101-A", vec![TimeSlot::parse(chrono::Weekday::Mon, "09:00", "10:30")?])
        .with_requirements(RoomRequirements::min_capacity(40));
    print_step("request a 40-seat room when the largest holds 30", json!(registrar.schedule(&request)?))?;

    let coordinator = TransactionCoordinator::new("demo-coordinator")
        .with_config(config.coordination.clone())
        .with_event_sink(events.clone());
    let first = ScriptedParticipant::new(true);
    let second = ScriptedParticipant::new(false);
    coordinator.register_participant("p1", first.clone());
    coordinator.register_participant("p2", second);
    let outcome = coordinator
        .execute(
            &["p1".to_string(), "p2".to_string()],
            json!({ "action": "transfer", "section": "CS101-A" }),
            config.coordination.transaction_timeout,
        )
        .await;
    print_step(
        "two-phase commit where p2 refuses to prepare",
        json!({ "result": outcome, "p1_commit_calls": first.commits.load(Ordering::SeqCst) }),
    )?;

    let held = registrar.acquire_lock("R1", LockType::Write, "X", Some(Duration::from_secs(1)))?;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let taken = registrar.acquire_lock("R1", LockType::Write, "Y", None)?;
    print_step(
        "timed WRITE lock expires before a second writer arrives",
        json!({ "expired": held, "acquired": taken, "locks": registrar.locks_on("R1") }),
    )?;

    let election = LeaderElection::new(
        "node-b",
        ["node-a".to_string(), "node-c".to_string()],
        Arc::new(SilentTransport),
        config.election.clone(),
    );
    let leader = election.start_election().await?;
    print_step(
        "bully election on a network where nobody answers",
        json!({ "node": election.node_id(), "leader": leader, "is_leader": election.is_leader() }),
    )?;

    print_step(
        "summary",
        json!({ "statistics": registrar.statistics(), "events_published": events.len() }),
    )?;
    Ok(())
}
