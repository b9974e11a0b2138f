//! Scheduling constraints evaluated against a candidate room assignment.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{Room, TimeSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// Must hold for the assignment to be accepted
    Hard,
    /// Scored, never blocks
    Soft,
}

/// A proposed assignment of a section to a room at some times.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub section_id: &'a str,
    pub room: &'a Room,
    pub time_slots: &'a [TimeSlot],
}

pub type ConstraintCheck = Arc<dyn Fn(&Candidate<'_>) -> bool + Send + Sync>;

#[derive(Clone)]
pub enum ConstraintRule {
    RoomCapacity { required: u32 },
    /// Every slot must fit inside one of the instructor's windows
    InstructorAvailability {
        instructor_id: String,
        windows: Vec<TimeSlot>,
    },
    /// Room type or facility in the preferred sets. Empty sets match anything.
    RoomPreference {
        room_types: BTreeSet<String>,
        facilities: BTreeSet<String>,
    },
    Custom { name: String, check: ConstraintCheck },
}

impl ConstraintRule {
    pub fn custom(
        name: impl Into<String>,
        check: impl Fn(&Candidate<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        ConstraintRule::Custom {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ConstraintRule::RoomCapacity { .. } => "room_capacity",
            ConstraintRule::InstructorAvailability { .. } => "instructor_availability",
            ConstraintRule::RoomPreference { .. } => "room_preference",
            ConstraintRule::Custom { name, .. } => name,
        }
    }

    pub fn is_satisfied(&self, candidate: &Candidate<'_>) -> bool {
        match self {
            ConstraintRule::RoomCapacity { required } => candidate.room.capacity >= *required,
            ConstraintRule::InstructorAvailability { windows, .. } => candidate
                .time_slots
                .iter()
                .all(|slot| windows.iter().any(|w| slot.within(w))),
            ConstraintRule::RoomPreference {
                room_types,
                facilities,
            } => {
                (room_types.is_empty() || room_types.contains(&candidate.room.room_type))
                    && (facilities.is_empty() || facilities.contains(&candidate.room.facility_id))
            }
            ConstraintRule::Custom { check, .. } => check(candidate),
        }
    }
}

impl std::fmt::Debug for ConstraintRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstraintRule::RoomCapacity { required } => f
                .debug_struct("RoomCapacity")
                .field("required", required)
                .finish(),
            ConstraintRule::InstructorAvailability {
                instructor_id,
                windows,
            } => f
                .debug_struct("InstructorAvailability")
                .field("instructor_id", instructor_id)
                .field("windows", windows)
                .finish(),
            ConstraintRule::RoomPreference {
                room_types,
                facilities,
            } => f
                .debug_struct("RoomPreference")
                .field("room_types", room_types)
                .field("facilities", facilities)
                .finish(),
            ConstraintRule::Custom { name, .. } => {
                f.debug_struct("Custom").field("name", name).finish_non_exhaustive()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub weight: f64,
    pub rule: ConstraintRule,
}

impl Constraint {
    pub fn hard(rule: ConstraintRule) -> Self {
        Self {
            kind: ConstraintKind::Hard,
            weight: 1.0,
            rule,
        }
    }

    pub fn soft(rule: ConstraintRule, weight: f64) -> Self {
        Self {
            kind: ConstraintKind::Soft,
            weight,
            rule,
        }
    }

    pub fn is_hard(&self) -> bool {
        self.kind == ConstraintKind::Hard
    }

    pub fn is_satisfied(&self, candidate: &Candidate<'_>) -> bool {
        self.rule.is_satisfied(candidate)
    }
}
