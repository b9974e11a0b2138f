//! Scheduling engine: assigns sections to rooms and weekly time slots.
//!
//! Room choice is first-fit over the filtered candidates, ordered by how
//! closely capacity matches the request. The overlap check and the ledger
//! insert happen in one critical section, so two bookings of one room never
//! overlap.

use chrono::{DateTime, Utc};
use nanoid::nanoid;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::Arc;

use crate::config::EngineLockConfig;
use crate::constraint::{Candidate, Constraint};
use crate::error::{RegistrarError, Result};
use crate::infrastructure::{DomainEvent, EventSink, EventType, NoopEventSink};
use crate::lock_manager::LockManager;
use crate::types::{LockType, Room, TimeSlot};

pub const NO_SUITABLE_ROOMS: &str = "No suitable rooms available";
pub const NO_TIME_SLOTS: &str = "No time slots requested";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleStatus {
    Draft,
    Pending,
    Approved,
    Active,
    Cancelled,
}

/// Room filter. Unset fields match every room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomRequirements {
    pub min_capacity: u32,
    pub room_type: Option<String>,
    pub equipment: BTreeSet<String>,
    pub access_control: bool,
}

impl Default for RoomRequirements {
    fn default() -> Self {
        Self {
            min_capacity: 1,
            room_type: None,
            equipment: BTreeSet::new(),
            access_control: false,
        }
    }
}

impl RoomRequirements {
    pub fn min_capacity(capacity: u32) -> Self {
        Self {
            min_capacity: capacity,
            ..Self::default()
        }
    }

    pub fn with_room_type(mut self, room_type: impl Into<String>) -> Self {
        self.room_type = Some(room_type.into());
        self
    }

    pub fn with_equipment<I, S>(mut self, equipment: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.equipment.extend(equipment.into_iter().map(Into::into));
        self
    }

    pub fn with_access_control(mut self) -> Self {
        self.access_control = true;
        self
    }

    fn admits(&self, room: &Room) -> bool {
        room.capacity >= self.min_capacity
            && self.room_type.as_ref().is_none_or(|t| *t == room.room_type)
            && self.equipment.is_subset(&room.equipment)
            && (!self.access_control || room.access_control)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub section_id: String,
    pub time_slots: Vec<TimeSlot>,
    #[serde(default)]
    pub requirements: RoomRequirements,
    /// Ids of registered constraints to check
    #[serde(default)]
    pub constraints: Vec<String>,
}

impl ScheduleRequest {
    pub fn new(section_id: impl Into<String>, time_slots: Vec<TimeSlot>) -> Self {
        Self {
            section_id: section_id.into(),
            time_slots,
            requirements: RoomRequirements::default(),
            constraints: Vec::new(),
        }
    }

    pub fn with_requirements(mut self, requirements: RoomRequirements) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn with_constraint(mut self, constraint_id: impl Into<String>) -> Self {
        self.constraints.push(constraint_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleResult {
    pub success: bool,
    pub schedule_id: Option<String>,
    pub assigned_room: Option<String>,
    pub assigned_times: Vec<TimeSlot>,
    pub conflicts: Vec<String>,
    pub message: String,
    /// Satisfied soft weight over total soft weight; 1.0 with no soft constraints
    pub soft_score: f64,
}

impl ScheduleResult {
    fn rejected(conflicts: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            schedule_id: None,
            assigned_room: None,
            assigned_times: Vec::new(),
            conflicts,
            message: message.into(),
            soft_score: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub schedule_id: String,
    pub section_id: String,
    pub room_id: String,
    pub time_slots: Vec<TimeSlot>,
    pub status: ScheduleStatus,
    pub constraints: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationObjective {
    MinimizeConflicts,
    MaximizeRoomUtilization,
}

impl FromStr for OptimizationObjective {
    type Err = RegistrarError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "minimize_conflicts" => Ok(Self::MinimizeConflicts),
            "maximize_room_utilization" => Ok(Self::MaximizeRoomUtilization),
            other => Err(RegistrarError::Validation(format!(
                "Unknown optimization objective: {}",
                other
            ))),
        }
    }
}

/// Read-only scoring of the current timetable. Nothing is reassigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "objective", rename_all = "snake_case")]
pub enum OptimizationReport {
    MinimizeConflicts {
        total_conflicts: usize,
        conflicts_resolved: usize,
        optimization_score: f64,
    },
    MaximizeRoomUtilization {
        total_capacity: u64,
        utilized_capacity: u64,
        utilization_rate: f64,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingStatistics {
    pub total_schedules: usize,
    pub approved_schedules: usize,
    pub active_schedules: usize,
    pub cancelled_schedules: usize,
    pub total_rooms: usize,
    pub constraints: usize,
}

#[derive(Debug, Clone)]
struct Booking {
    schedule_id: String,
    slot: TimeSlot,
}

#[derive(Default)]
struct ScheduleTable {
    rooms: BTreeMap<String, Room>,
    constraints: HashMap<String, Constraint>,
    schedules: HashMap<String, ScheduleRecord>,
    // Map of Room ID -> bookings, in insertion order
    ledger: HashMap<String, Vec<Booking>>,
}

impl ScheduleTable {
    fn candidates(&self, requirements: &RoomRequirements) -> Vec<&Room> {
        let mut rooms: Vec<&Room> = self
            .rooms
            .values()
            .filter(|r| requirements.admits(r))
            .collect();
        rooms.sort_by(|a, b| {
            a.capacity
                .abs_diff(requirements.min_capacity)
                .cmp(&b.capacity.abs_diff(requirements.min_capacity))
                .then_with(|| a.room_number.cmp(&b.room_number))
        });
        rooms
    }

    /// Hard conflicts for placing `request` in `room`, plus the soft score.
    fn evaluate(&self, request: &ScheduleRequest, room: &Room) -> (Vec<String>, f64) {
        let mut conflicts = Vec::new();

        let booked = self.ledger.get(&room.id).map(Vec::as_slice).unwrap_or_default();
        for slot in &request.time_slots {
            for booking in booked.iter().filter(|b| b.slot.overlaps(slot)) {
                conflicts.push(format!(
                    "Room {} is already booked at {} (requested {})",
                    room.room_number, booking.slot, slot
                ));
            }
        }

        let candidate = Candidate {
            section_id: &request.section_id,
            room,
            time_slots: &request.time_slots,
        };
        let (mut soft_total, mut soft_met) = (0.0, 0.0);
        for id in &request.constraints {
            match self.constraints.get(id) {
                None => conflicts.push(format!("Unknown constraint: {}", id)),
                Some(c) if c.is_hard() => {
                    if !c.is_satisfied(&candidate) {
                        conflicts.push(format!("Constraint violation: {}", id));
                    }
                }
                Some(c) => {
                    soft_total += c.weight;
                    if c.is_satisfied(&candidate) {
                        soft_met += c.weight;
                    }
                }
            }
        }

        let soft_score = if soft_total > 0.0 { soft_met / soft_total } else { 1.0 };
        (conflicts, soft_score)
    }
}

pub struct SchedulingEngine {
    locks: Arc<LockManager>,
    table: Mutex<ScheduleTable>,
    events: Arc<dyn EventSink>,
    config: EngineLockConfig,
}

impl SchedulingEngine {
    pub fn new(locks: Arc<LockManager>) -> Self {
        Self {
            locks,
            table: Mutex::new(ScheduleTable::default()),
            events: Arc::new(NoopEventSink),
            config: EngineLockConfig::default(),
        }
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_config(mut self, config: EngineLockConfig) -> Self {
        self.config = config;
        self
    }

    /// Register or replace a room in the read model.
    pub fn add_room(&self, room: Room) {
        let mut table = self.table.lock();
        table.ledger.entry(room.id.clone()).or_default();
        table.rooms.insert(room.id.clone(), room);
    }

    pub fn rooms(&self) -> Vec<Room> {
        self.table.lock().rooms.values().cloned().collect()
    }

    pub fn add_constraint(&self, constraint_id: impl Into<String>, constraint: Constraint) {
        self.table
            .lock()
            .constraints
            .insert(constraint_id.into(), constraint);
    }

    pub fn remove_constraint(&self, constraint_id: &str) -> bool {
        self.table.lock().constraints.remove(constraint_id).is_some()
    }

    pub fn schedule(&self, request: &ScheduleRequest) -> ScheduleResult {
        if request.time_slots.is_empty() {
            return ScheduleResult::rejected(
                vec![NO_TIME_SLOTS.to_string()],
                "Scheduling request has no time slots",
            );
        }

        let resource = format!("scheduling:{}", request.section_id);
        let holder = format!("scheduling:{}", nanoid!());
        let _guard = match LockManager::execute_with_retry(
            || self.locks.scoped(&resource, LockType::Write, &holder, None),
            self.config.lock_retries,
            self.config.lock_backoff,
        ) {
            Ok(guard) => guard,
            Err(e) => {
                tracing::warn!(section_id = %request.section_id, error = %e, "Scheduling lock contention");
                return ScheduleResult::rejected(
                    vec![format!("Concurrency error: {}", e)],
                    "Scheduling failed due to concurrency error",
                );
            }
        };

        let (result, event) = {
            let mut table = self.table.lock();

            let room = match table.candidates(&request.requirements).first() {
                Some(room) => (*room).clone(),
                None => {
                    tracing::warn!(section_id = %request.section_id, min_capacity = request.requirements.min_capacity, "No suitable room");
                    return ScheduleResult::rejected(
                        vec![NO_SUITABLE_ROOMS.to_string()],
                        "No suitable rooms found for scheduling",
                    );
                }
            };

            let (conflicts, soft_score) = table.evaluate(request, &room);
            if !conflicts.is_empty() {
                tracing::warn!(section_id = %request.section_id, room_id = %room.id, conflicts = conflicts.len(), "Scheduling conflicts detected");
                return ScheduleResult::rejected(conflicts, "Scheduling conflicts detected");
            }

            let schedule_id = format!("sched_{}", nanoid!());
            let record = ScheduleRecord {
                schedule_id: schedule_id.clone(),
                section_id: request.section_id.clone(),
                room_id: room.id.clone(),
                time_slots: request.time_slots.clone(),
                status: ScheduleStatus::Approved,
                constraints: request.constraints.clone(),
                created_at: Utc::now(),
            };
            table.schedules.insert(schedule_id.clone(), record);
            table
                .ledger
                .entry(room.id.clone())
                .or_default()
                .extend(request.time_slots.iter().map(|slot| Booking {
                    schedule_id: schedule_id.clone(),
                    slot: *slot,
                }));

            tracing::info!(section_id = %request.section_id, room_id = %room.id, schedule_id = %schedule_id, "Section scheduled");
            let event = DomainEvent::new(
                EventType::Scheduling,
                resource.clone(),
                json!({
                    "type": "schedule_created",
                    "schedule_id": schedule_id,
                    "section_id": request.section_id,
                    "room_id": room.id,
                }),
            );
            let result = ScheduleResult {
                success: true,
                schedule_id: Some(schedule_id),
                assigned_room: Some(room.id),
                assigned_times: request.time_slots.clone(),
                conflicts: Vec::new(),
                message: "Section scheduled successfully".to_string(),
                soft_score,
            };
            (result, event)
        };

        self.events.publish(event);
        result
    }

    /// Free the schedule's slots. False when unknown or already cancelled.
    pub fn cancel(&self, schedule_id: &str) -> bool {
        let event = {
            let mut table = self.table.lock();
            let Some(record) = table.schedules.get_mut(schedule_id) else {
                return false;
            };
            if record.status == ScheduleStatus::Cancelled {
                return false;
            }
            record.status = ScheduleStatus::Cancelled;
            let room_id = record.room_id.clone();
            let section_id = record.section_id.clone();

            if let Some(bookings) = table.ledger.get_mut(&room_id) {
                bookings.retain(|b| b.schedule_id != schedule_id);
            }

            tracing::info!(schedule_id, room_id = %room_id, "Schedule cancelled");
            DomainEvent::new(
                EventType::Scheduling,
                format!("scheduling:{}", section_id),
                json!({
                    "type": "schedule_cancelled",
                    "schedule_id": schedule_id,
                    "section_id": section_id,
                }),
            )
        };

        self.events.publish(event);
        true
    }

    /// Move an approved schedule into the active timetable.
    pub fn activate(&self, schedule_id: &str) -> bool {
        let mut table = self.table.lock();
        match table.schedules.get_mut(schedule_id) {
            Some(record) if record.status == ScheduleStatus::Approved => {
                record.status = ScheduleStatus::Active;
                true
            }
            _ => false,
        }
    }

    pub fn get_schedule(&self, schedule_id: &str) -> Option<ScheduleRecord> {
        self.table.lock().schedules.get(schedule_id).cloned()
    }

    /// Slots currently booked in a room.
    pub fn room_schedule(&self, room_id: &str) -> Vec<TimeSlot> {
        self.table
            .lock()
            .ledger
            .get(room_id)
            .map(|b| b.iter().map(|b| b.slot).collect())
            .unwrap_or_default()
    }

    pub fn optimize(&self, objective: OptimizationObjective) -> OptimizationReport {
        let table = self.table.lock();
        match objective {
            OptimizationObjective::MinimizeConflicts => {
                let mut total_conflicts = 0;
                for record in table
                    .schedules
                    .values()
                    .filter(|r| r.status == ScheduleStatus::Active)
                {
                    let booked = table.ledger.get(&record.room_id).map(Vec::as_slice).unwrap_or_default();
                    for slot in &record.time_slots {
                        total_conflicts += booked
                            .iter()
                            .filter(|b| b.schedule_id != record.schedule_id && b.slot.overlaps(slot))
                            .count();
                    }
                }
                // Nothing is moved; every detected conflict is reported as resolvable
                let conflicts_resolved = total_conflicts;
                OptimizationReport::MinimizeConflicts {
                    total_conflicts,
                    conflicts_resolved,
                    optimization_score: conflicts_resolved as f64 / total_conflicts.max(1) as f64,
                }
            }
            OptimizationObjective::MaximizeRoomUtilization => {
                let total_capacity: u64 = table.rooms.values().map(|r| u64::from(r.capacity)).sum();
                let utilized_capacity: u64 = table
                    .ledger
                    .iter()
                    .filter_map(|(room_id, bookings)| {
                        table
                            .rooms
                            .get(room_id)
                            .map(|r| bookings.len() as u64 * u64::from(r.capacity))
                    })
                    .sum();
                OptimizationReport::MaximizeRoomUtilization {
                    total_capacity,
                    utilized_capacity,
                    utilization_rate: utilized_capacity as f64 / total_capacity.max(1) as f64,
                }
            }
        }
    }

    pub fn statistics(&self) -> SchedulingStatistics {
        let table = self.table.lock();
        let count = |status: ScheduleStatus| table.schedules.values().filter(|r| r.status == status).count();
        SchedulingStatistics {
            total_schedules: table.schedules.len(),
            approved_schedules: count(ScheduleStatus::Approved),
            active_schedules: count(ScheduleStatus::Active),
            cancelled_schedules: count(ScheduleStatus::Cancelled),
            total_rooms: table.rooms.len(),
            constraints: table.constraints.len(),
        }
    }
}
