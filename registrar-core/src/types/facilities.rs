use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::Entity;
use crate::error::{RegistrarError, Result};

/// A course section with a fixed number of seats
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub course_id: String,
    pub section_number: String,
    pub capacity: u32,
    pub instructor_id: Option<String>,
}

impl Section {
    pub fn new(
        id: impl Into<String>,
        course_id: impl Into<String>,
        section_number: impl Into<String>,
        capacity: u32,
    ) -> Result<Self> {
        let id = id.into();
        if capacity == 0 {
            return Err(RegistrarError::Validation(format!(
                "section '{}' must have a positive capacity",
                id
            )));
        }
        Ok(Self {
            id,
            course_id: course_id.into(),
            section_number: section_number.into(),
            capacity,
            instructor_id: None,
        })
    }

    pub fn with_instructor(mut self, instructor_id: impl Into<String>) -> Self {
        self.instructor_id = Some(instructor_id.into());
        self
    }
}

impl Entity for Section {
    const KIND: &'static str = "section";

    fn id(&self) -> &str {
        &self.id
    }
}

/// A bookable room, as supplied by the facilities read model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub room_number: String,
    pub facility_id: String,
    pub room_type: String,
    pub capacity: u32,
    #[serde(default)]
    pub equipment: BTreeSet<String>,
    #[serde(default)]
    pub access_control: bool,
}

impl Room {
    pub fn new(
        id: impl Into<String>,
        room_number: impl Into<String>,
        facility_id: impl Into<String>,
        room_type: impl Into<String>,
        capacity: u32,
    ) -> Self {
        Self {
            id: id.into(),
            room_number: room_number.into(),
            facility_id: facility_id.into(),
            room_type: room_type.into(),
            capacity,
            equipment: BTreeSet::new(),
            access_control: false,
        }
    }

    pub fn with_equipment<I, S>(mut self, equipment: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.equipment.extend(equipment.into_iter().map(Into::into));
        self
    }

    pub fn with_access_control(mut self, enabled: bool) -> Self {
        self.access_control = enabled;
        self
    }
}

impl Entity for Room {
    const KIND: &'static str = "room";

    fn id(&self) -> &str {
        &self.id
    }
}

/// A weekly recurring interval `[start, end)` on one day.
///
/// Deserialization goes through [`TimeSlot::new`], so an inverted or empty
/// interval never gets past the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTimeSlot")]
pub struct TimeSlot {
    pub day: Weekday,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

#[derive(Deserialize)]
struct RawTimeSlot {
    day: Weekday,
    start: NaiveTime,
    end: NaiveTime,
}

impl TryFrom<RawTimeSlot> for TimeSlot {
    type Error = RegistrarError;

    fn try_from(raw: RawTimeSlot) -> Result<Self> {
        TimeSlot::new(raw.day, raw.start, raw.end)
    }
}

impl TimeSlot {
    pub fn new(day: Weekday, start: NaiveTime, end: NaiveTime) -> Result<Self> {
        if end <= start {
            return Err(RegistrarError::Validation(format!(
                "time slot end {} must be after start {}",
                end, start
            )));
        }
        Ok(Self { day, start, end })
    }

    /// Builds a slot from `HH:MM` strings.
    pub fn parse(day: Weekday, start: &str, end: &str) -> Result<Self> {
        let parse = |s: &str| {
            NaiveTime::parse_from_str(s, "%H:%M").map_err(|e| {
                RegistrarError::Validation(format!("invalid time '{}': {}", s, e))
            })
        };
        Self::new(day, parse(start)?, parse(end)?)
    }

    /// Same day and intersecting half-open intervals
    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.day == other.day && self.start < other.end && self.end > other.start
    }

    /// Whether `self` lies entirely inside `window`
    pub fn within(&self, window: &TimeSlot) -> bool {
        self.day == window.day && self.start >= window.start && self.end <= window.end
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

impl std::fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}-{}",
            self.day,
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}
