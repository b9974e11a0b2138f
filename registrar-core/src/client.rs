//! High-level client wiring the engines to pluggable storage.
//! The HTTP server and the demo driver both delegate to this.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::RegistrarConfig;
use crate::enrollment::{EnrollmentEngine, EnrollmentResult, EnrollmentStatistics};
use crate::error::{RegistrarError, Result};
use crate::infrastructure::{EventSink, NoopEventSink, Repository};
use crate::infrastructure_in_memory::InMemoryRepository;
use crate::lock_manager::{ExpirySweeper, LockManager};
use crate::scheduler::{
    OptimizationObjective, OptimizationReport, ScheduleRecord, ScheduleRequest, ScheduleResult,
    SchedulingEngine, SchedulingStatistics,
};
use crate::types::{LockInfo, LockType, Person, Room, Section};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrarStatistics {
    pub enrollment: EnrollmentStatistics,
    pub scheduling: SchedulingStatistics,
    pub active_locks: usize,
}

/// The main entry point. Owns the lock manager, both engines and the
/// people/section/room repositories.
pub struct Registrar {
    config: RegistrarConfig,
    locks: Arc<LockManager>,
    people: Box<dyn Repository<Person>>,
    sections: Box<dyn Repository<Section>>,
    rooms: Box<dyn Repository<Room>>,
    enrollment: EnrollmentEngine,
    scheduling: SchedulingEngine,
}

impl Registrar {
    /// Default configuration, in-memory storage, events discarded.
    pub fn new() -> Self {
        Self::in_memory(RegistrarConfig::default(), Arc::new(NoopEventSink))
    }

    pub fn in_memory(config: RegistrarConfig, events: Arc<dyn EventSink>) -> Self {
        Self::assemble(
            config,
            events,
            Box::new(InMemoryRepository::<Person>::new()),
            Box::new(InMemoryRepository::<Section>::new()),
            Box::new(InMemoryRepository::<Room>::new()),
        )
    }

    /// Registrar whose people, sections and rooms persist in SQLite.
    /// Rooms already stored are loaded into the scheduling read model.
    #[cfg(feature = "sqlite")]
    pub fn with_sqlite(path: &str, config: RegistrarConfig, events: Arc<dyn EventSink>) -> Result<Self> {
        use crate::infrastructure_sqlite::SqliteRepository;

        let registrar = Self::assemble(
            config,
            events,
            Box::new(SqliteRepository::<Person>::open(path)?),
            Box::new(SqliteRepository::<Section>::open(path)?),
            Box::new(SqliteRepository::<Room>::open(path)?),
        );
        for room in registrar.rooms.find_all(None)? {
            registrar.scheduling.add_room(room);
        }
        Ok(registrar)
    }

    fn assemble(
        config: RegistrarConfig,
        events: Arc<dyn EventSink>,
        people: Box<dyn Repository<Person>>,
        sections: Box<dyn Repository<Section>>,
        rooms: Box<dyn Repository<Room>>,
    ) -> Self {
        let locks = Arc::new(LockManager::new());
        let enrollment = EnrollmentEngine::new(locks.clone())
            .with_config(config.enrollment.clone())
            .with_event_sink(events.clone());
        let scheduling = SchedulingEngine::new(locks.clone())
            .with_config(config.scheduling.clone())
            .with_event_sink(events);

        Self {
            config,
            locks,
            people,
            sections,
            rooms,
            enrollment,
            scheduling,
        }
    }

    pub fn config(&self) -> &RegistrarConfig {
        &self.config
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.locks
    }

    pub fn enrollment(&self) -> &EnrollmentEngine {
        &self.enrollment
    }

    pub fn scheduling(&self) -> &SchedulingEngine {
        &self.scheduling
    }

    // ─── Records ────────────────────────────────────────────────────────────

    pub fn register_person(&self, person: &Person) -> Result<()> {
        self.people.save(person)
    }

    pub fn register_section(&self, section: &Section) -> Result<()> {
        self.sections.save(section)
    }

    pub fn register_room(&self, room: Room) -> Result<()> {
        self.rooms.save(&room)?;
        self.scheduling.add_room(room);
        Ok(())
    }

    pub fn person(&self, person_id: &str) -> Result<Person> {
        self.people
            .find_by_id(person_id)?
            .ok_or_else(|| RegistrarError::not_found("person", person_id))
    }

    pub fn section(&self, section_id: &str) -> Result<Section> {
        self.sections
            .find_by_id(section_id)?
            .ok_or_else(|| RegistrarError::not_found("section", section_id))
    }

    pub fn people(&self) -> Result<Vec<Person>> {
        self.people.find_all(None)
    }

    pub fn sections(&self) -> Result<Vec<Section>> {
        self.sections.find_all(None)
    }

    pub fn rooms(&self) -> Result<Vec<Room>> {
        self.rooms.find_all(None)
    }

    // ─── Enrollment ─────────────────────────────────────────────────────────

    pub fn enroll(&self, student_id: &str, section_id: &str) -> Result<EnrollmentResult> {
        let person = self.person(student_id)?;
        let section = self.section(section_id)?;
        Ok(self.enrollment.enroll(&person, &section))
    }

    pub fn drop(&self, student_id: &str, section_id: &str) -> Result<EnrollmentResult> {
        self.section(section_id)?;
        Ok(self.enrollment.drop(student_id, section_id))
    }

    pub fn get_enrollments(&self, student_id: &str) -> Vec<String> {
        self.enrollment.get_enrollments(student_id)
    }

    pub fn waitlist(&self, section_id: &str) -> Result<Vec<String>> {
        self.section(section_id)?;
        Ok(self.enrollment.waitlist(section_id))
    }

    // ─── Scheduling ─────────────────────────────────────────────────────────

    pub fn schedule(&self, request: &ScheduleRequest) -> Result<ScheduleResult> {
        self.section(&request.section_id)?;
        Ok(self.scheduling.schedule(request))
    }

    pub fn cancel_schedule(&self, schedule_id: &str) -> bool {
        self.scheduling.cancel(schedule_id)
    }

    pub fn get_schedule(&self, schedule_id: &str) -> Result<ScheduleRecord> {
        self.scheduling
            .get_schedule(schedule_id)
            .ok_or_else(|| RegistrarError::not_found("schedule", schedule_id))
    }

    pub fn optimize(&self, objective: OptimizationObjective) -> OptimizationReport {
        self.scheduling.optimize(objective)
    }

    // ─── Locks ──────────────────────────────────────────────────────────────

    pub fn acquire_lock(
        &self,
        resource_id: &str,
        lock_type: LockType,
        holder_id: &str,
        timeout: Option<Duration>,
    ) -> Result<String> {
        self.locks.acquire(resource_id, lock_type, holder_id, timeout)
    }

    pub fn release_lock(&self, lock_id: &str) -> bool {
        self.locks.release(lock_id)
    }

    pub fn locks_on(&self, resource_id: &str) -> Vec<LockInfo> {
        self.locks.locks_on(resource_id)
    }

    /// Background expiry at the configured sweep interval.
    pub fn start_expiry_sweeper(&self) -> ExpirySweeper {
        self.locks
            .spawn_expiry_sweeper(self.config.locks.sweep_interval)
    }

    pub fn statistics(&self) -> RegistrarStatistics {
        RegistrarStatistics {
            enrollment: self.enrollment.statistics(),
            scheduling: self.scheduling.statistics(),
            active_locks: self.locks.active_lock_count(),
        }
    }
}

impl Default for Registrar {
    fn default() -> Self {
        Self::new()
    }
}
