//! Enrollment engine: seats, FIFO waitlists and promotion on drop.
//!
//! Every enroll/drop on a section runs under a WRITE lock on
//! `enrollment:{section_id}` taken from the shared [`LockManager`], with a
//! fresh holder id per call so concurrent callers serialize instead of
//! re-entering each other's lock. The engine's own tables sit behind a
//! separate mutex that only protects the data structures.

use nanoid::nanoid;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::config::EngineLockConfig;
use crate::infrastructure::{DomainEvent, EventSink, EventType, NoopEventSink};
use crate::lock_manager::LockManager;
use crate::policy::{PolicyChain, PolicyContext};
use crate::types::{LockType, Person, Section};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    Confirmed,
    Waitlisted,
    Dropped,
    Rejected,
}

impl EnrollmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EnrollmentStatus::Confirmed => "CONFIRMED",
            EnrollmentStatus::Waitlisted => "WAITLISTED",
            EnrollmentStatus::Dropped => "DROPPED",
            EnrollmentStatus::Rejected => "REJECTED",
        }
    }
}

/// What actually happened, so callers never have to guess from `success`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentOutcome {
    Enrolled,
    AlreadyEnrolled,
    Waitlisted,
    PolicyRejected,
    Dropped,
    NotEnrolled,
    /// The section lock could not be obtained within the retry budget
    Contention,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentResult {
    pub success: bool,
    /// State of the (student, section) pair after the call, if it has one
    pub status: Option<EnrollmentStatus>,
    pub outcome: EnrollmentOutcome,
    pub message: String,
    /// 1-based position on the waitlist
    pub waitlist_position: Option<usize>,
    /// Reported only; the waitlist is strictly first come, first served
    pub priority: i64,
}

impl EnrollmentResult {
    fn new(
        success: bool,
        status: Option<EnrollmentStatus>,
        outcome: EnrollmentOutcome,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success,
            status,
            outcome,
            message: message.into(),
            waitlist_position: None,
            priority: 0,
        }
    }

    fn at_position(mut self, position: usize) -> Self {
        self.waitlist_position = Some(position);
        self
    }

    fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentStatistics {
    pub total_enrollments: usize,
    pub total_waitlisted: usize,
    pub total_dropped: usize,
    pub total_rejected: usize,
    pub sections: usize,
    pub active_policies: usize,
}

#[derive(Default)]
struct EnrollmentTable {
    // Map of Student ID -> (Section ID -> latest status)
    statuses: HashMap<String, HashMap<String, EnrollmentStatus>>,
    // Map of Section ID -> confirmed seat count
    confirmed: HashMap<String, usize>,
    // Map of Section ID -> waiting students, oldest first
    waitlists: HashMap<String, VecDeque<String>>,
}

impl EnrollmentTable {
    fn status(&self, student_id: &str, section_id: &str) -> Option<EnrollmentStatus> {
        self.statuses
            .get(student_id)
            .and_then(|m| m.get(section_id))
            .copied()
    }

    fn set_status(&mut self, student_id: &str, section_id: &str, status: EnrollmentStatus) {
        self.statuses
            .entry(student_id.to_string())
            .or_default()
            .insert(section_id.to_string(), status);
    }

    fn confirmed_count(&self, section_id: &str) -> usize {
        self.confirmed.get(section_id).copied().unwrap_or(0)
    }

    fn position(&self, student_id: &str, section_id: &str) -> Option<usize> {
        self.waitlists
            .get(section_id)?
            .iter()
            .position(|s| s == student_id)
            .map(|i| i + 1)
    }

    fn confirm(&mut self, student_id: &str, section_id: &str) {
        *self.confirmed.entry(section_id.to_string()).or_insert(0) += 1;
        self.set_status(student_id, section_id, EnrollmentStatus::Confirmed);
    }

    fn release_seat(&mut self, section_id: &str) {
        if let Some(count) = self.confirmed.get_mut(section_id) {
            *count = count.saturating_sub(1);
        }
    }

    fn enqueue(&mut self, student_id: &str, section_id: &str) -> usize {
        self.set_status(student_id, section_id, EnrollmentStatus::Waitlisted);
        let queue = self.waitlists.entry(section_id.to_string()).or_default();
        queue.push_back(student_id.to_string());
        queue.len()
    }

    fn dequeue(&mut self, student_id: &str, section_id: &str) {
        if let Some(queue) = self.waitlists.get_mut(section_id) {
            queue.retain(|s| s != student_id);
        }
    }

    fn pop_head(&mut self, section_id: &str) -> Option<String> {
        self.waitlists.get_mut(section_id)?.pop_front()
    }
}

pub struct EnrollmentEngine {
    locks: Arc<LockManager>,
    table: Mutex<EnrollmentTable>,
    policies: PolicyChain,
    events: Arc<dyn EventSink>,
    config: EngineLockConfig,
}

impl EnrollmentEngine {
    /// Engine with the standard policy chain and no event sink.
    pub fn new(locks: Arc<LockManager>) -> Self {
        Self {
            locks,
            table: Mutex::new(EnrollmentTable::default()),
            policies: PolicyChain::standard(),
            events: Arc::new(NoopEventSink),
            config: EngineLockConfig::default(),
        }
    }

    pub fn with_policies(mut self, policies: PolicyChain) -> Self {
        self.policies = policies;
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_config(mut self, config: EngineLockConfig) -> Self {
        self.config = config;
        self
    }

    pub fn policies(&self) -> &PolicyChain {
        &self.policies
    }

    pub fn enroll(&self, person: &Person, section: &Section) -> EnrollmentResult {
        let Some(student) = person.as_student() else {
            return EnrollmentResult::new(
                false,
                None,
                EnrollmentOutcome::PolicyRejected,
                format!("Policy violation: {} is not a student", person.id),
            );
        };

        let resource = section_lock_key(&section.id);
        let holder = format!("enrollment:{}", nanoid!());
        let _guard = match LockManager::execute_with_retry(
            || self.locks.scoped(&resource, LockType::Write, &holder, None),
            self.config.lock_retries,
            self.config.lock_backoff,
        ) {
            Ok(guard) => guard,
            Err(e) => {
                tracing::warn!(student_id = %person.id, section_id = %section.id, error = %e, "Enrollment lock contention");
                return EnrollmentResult::new(
                    false,
                    None,
                    EnrollmentOutcome::Contention,
                    format!("Concurrency error: {}", e),
                );
            }
        };

        let mut pending = Vec::new();
        let result = {
            let mut table = self.table.lock();

            match table.status(&person.id, &section.id) {
                Some(EnrollmentStatus::Confirmed) => {
                    return EnrollmentResult::new(
                        true,
                        Some(EnrollmentStatus::Confirmed),
                        EnrollmentOutcome::AlreadyEnrolled,
                        "Student already enrolled",
                    );
                }
                Some(EnrollmentStatus::Waitlisted) => {
                    let position = table.position(&person.id, &section.id).unwrap_or(0);
                    return EnrollmentResult::new(
                        true,
                        Some(EnrollmentStatus::Waitlisted),
                        EnrollmentOutcome::Waitlisted,
                        format!("Student already on waitlist at position {}", position),
                    )
                    .at_position(position);
                }
                _ => {}
            }

            let confirmed = table.confirmed_count(&section.id);
            let verdict = self.policies.evaluate(&PolicyContext {
                person,
                student,
                section,
                confirmed,
            });

            if let Some(policy) = verdict.denied_by {
                table.set_status(&person.id, &section.id, EnrollmentStatus::Rejected);
                pending.push(self.event(&person.id, &section.id, EnrollmentStatus::Rejected, None));
                tracing::info!(student_id = %person.id, section_id = %section.id, policy = %policy, "Enrollment rejected");
                EnrollmentResult::new(
                    false,
                    Some(EnrollmentStatus::Rejected),
                    EnrollmentOutcome::PolicyRejected,
                    format!("Policy violation: {}", policy),
                )
                .with_priority(verdict.priority)
            } else if confirmed < section.capacity as usize {
                table.confirm(&person.id, &section.id);
                pending.push(self.event(&person.id, &section.id, EnrollmentStatus::Confirmed, None));
                tracing::info!(student_id = %person.id, section_id = %section.id, "Student enrolled");
                EnrollmentResult::new(
                    true,
                    Some(EnrollmentStatus::Confirmed),
                    EnrollmentOutcome::Enrolled,
                    "Student enrolled successfully",
                )
                .with_priority(verdict.priority)
            } else {
                let position = table.enqueue(&person.id, &section.id);
                pending.push(self.event(
                    &person.id,
                    &section.id,
                    EnrollmentStatus::Waitlisted,
                    Some(position),
                ));
                tracing::info!(student_id = %person.id, section_id = %section.id, position, "Student waitlisted");
                EnrollmentResult::new(
                    true,
                    Some(EnrollmentStatus::Waitlisted),
                    EnrollmentOutcome::Waitlisted,
                    format!("Student added to waitlist at position {}", position),
                )
                .at_position(position)
                .with_priority(verdict.priority)
            }
        };

        // Still under the section lock, so events of one section stay ordered
        self.publish_all(pending);
        result
    }

    pub fn drop(&self, student_id: &str, section_id: &str) -> EnrollmentResult {
        let resource = section_lock_key(section_id);
        let holder = format!("enrollment:{}", nanoid!());
        let _guard = match LockManager::execute_with_retry(
            || self.locks.scoped(&resource, LockType::Write, &holder, None),
            self.config.lock_retries,
            self.config.lock_backoff,
        ) {
            Ok(guard) => guard,
            Err(e) => {
                tracing::warn!(student_id, section_id, error = %e, "Drop lock contention");
                return EnrollmentResult::new(
                    false,
                    None,
                    EnrollmentOutcome::Contention,
                    format!("Concurrency error: {}", e),
                );
            }
        };

        let mut pending = Vec::new();
        {
            let mut table = self.table.lock();
            match table.status(student_id, section_id) {
                Some(EnrollmentStatus::Confirmed) => {
                    table.release_seat(section_id);
                    table.set_status(student_id, section_id, EnrollmentStatus::Dropped);
                    pending.push(self.event(student_id, section_id, EnrollmentStatus::Dropped, None));

                    // The freed seat goes to the waitlist head
                    if let Some(next) = table.pop_head(section_id) {
                        table.confirm(&next, section_id);
                        tracing::info!(student_id = %next, section_id, "Promoted from waitlist");
                        pending.push(self.event(&next, section_id, EnrollmentStatus::Confirmed, None));
                    }
                }
                Some(EnrollmentStatus::Waitlisted) => {
                    table.dequeue(student_id, section_id);
                    table.set_status(student_id, section_id, EnrollmentStatus::Dropped);
                    pending.push(self.event(student_id, section_id, EnrollmentStatus::Dropped, None));
                }
                _ => {
                    return EnrollmentResult::new(
                        false,
                        table.status(student_id, section_id),
                        EnrollmentOutcome::NotEnrolled,
                        "Student not enrolled in this section",
                    );
                }
            }
        }

        tracing::info!(student_id, section_id, "Student dropped");
        self.publish_all(pending);
        EnrollmentResult::new(
            true,
            Some(EnrollmentStatus::Dropped),
            EnrollmentOutcome::Dropped,
            "Student dropped successfully",
        )
    }

    /// Sections the student holds a confirmed seat in, sorted.
    pub fn get_enrollments(&self, student_id: &str) -> Vec<String> {
        let table = self.table.lock();
        let mut sections: Vec<String> = table
            .statuses
            .get(student_id)
            .map(|m| {
                m.iter()
                    .filter(|(_, s)| **s == EnrollmentStatus::Confirmed)
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default();
        sections.sort();
        sections
    }

    pub fn status_of(&self, student_id: &str, section_id: &str) -> Option<EnrollmentStatus> {
        self.table.lock().status(student_id, section_id)
    }

    pub fn waitlist_position(&self, student_id: &str, section_id: &str) -> Option<usize> {
        self.table.lock().position(student_id, section_id)
    }

    /// Waiting students, head first.
    pub fn waitlist(&self, section_id: &str) -> Vec<String> {
        self.table
            .lock()
            .waitlists
            .get(section_id)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn confirmed_count(&self, section_id: &str) -> usize {
        self.table.lock().confirmed_count(section_id)
    }

    pub fn waitlist_count(&self, section_id: &str) -> usize {
        self.table
            .lock()
            .waitlists
            .get(section_id)
            .map_or(0, VecDeque::len)
    }

    pub fn statistics(&self) -> EnrollmentStatistics {
        let table = self.table.lock();
        let mut stats = EnrollmentStatistics {
            active_policies: self.policies.len(),
            ..Default::default()
        };
        let mut sections = std::collections::HashSet::new();
        for per_student in table.statuses.values() {
            for (section_id, status) in per_student {
                sections.insert(section_id.as_str());
                match status {
                    EnrollmentStatus::Confirmed => stats.total_enrollments += 1,
                    EnrollmentStatus::Waitlisted => stats.total_waitlisted += 1,
                    EnrollmentStatus::Dropped => stats.total_dropped += 1,
                    EnrollmentStatus::Rejected => stats.total_rejected += 1,
                }
            }
        }
        stats.sections = sections.len();
        stats
    }

    fn event(
        &self,
        student_id: &str,
        section_id: &str,
        status: EnrollmentStatus,
        waitlist_position: Option<usize>,
    ) -> DomainEvent {
        DomainEvent::new(
            EventType::Enrollment,
            section_lock_key(section_id),
            json!({
                "student_id": student_id,
                "section_id": section_id,
                "status": status.as_str(),
                "waitlist_position": waitlist_position,
            }),
        )
    }

    fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in events {
            self.events.publish(event);
        }
    }
}

fn section_lock_key(section_id: &str) -> String {
    format!("enrollment:{}", section_id)
}
