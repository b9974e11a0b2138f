use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::Entity;
use crate::error::{RegistrarError, Result};

/// Academic standing of a student
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeLevel {
    Freshman,
    Sophomore,
    Junior,
    Senior,
    Graduate,
    Postgraduate,
}

impl GradeLevel {
    /// Key used by priority rule tables
    pub fn key(self) -> &'static str {
        match self {
            GradeLevel::Freshman => "freshman",
            GradeLevel::Sophomore => "sophomore",
            GradeLevel::Junior => "junior",
            GradeLevel::Senior => "senior",
            GradeLevel::Graduate => "graduate",
            GradeLevel::Postgraduate => "postgraduate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub student_number: String,
    pub grade_level: GradeLevel,
    /// 0.0 to 4.0 when known
    pub gpa: Option<f64>,
    /// Course ids already passed, checked against prerequisites
    #[serde(default)]
    pub completed_courses: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LecturerProfile {
    pub employee_id: String,
    pub department: String,
    #[serde(default)]
    pub courses: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffProfile {
    pub employee_id: String,
    pub department: String,
    pub position: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestProfile {
    pub sponsor_id: String,
    pub visit_purpose: String,
}

/// The kind-specific record attached to a person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PersonKind {
    Student(StudentProfile),
    Lecturer(LecturerProfile),
    Staff(StaffProfile),
    Guest(GuestProfile),
}

impl PersonKind {
    pub fn key(&self) -> &'static str {
        match self {
            PersonKind::Student(_) => "student",
            PersonKind::Lecturer(_) => "lecturer",
            PersonKind::Staff(_) => "staff",
            PersonKind::Guest(_) => "guest",
        }
    }
}

/// Canonical person record. Role-specific data lives in `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub kind: PersonKind,
}

impl Person {
    pub fn new(
        id: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
        kind: PersonKind,
    ) -> Result<Self> {
        if let PersonKind::Student(profile) = &kind {
            validate_gpa(profile.gpa)?;
        }
        Ok(Self {
            id: id.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            kind,
        })
    }

    /// Shorthand for a student with no completed courses.
    pub fn student(
        id: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        grade_level: GradeLevel,
        gpa: Option<f64>,
    ) -> Result<Self> {
        let id = id.into();
        let first_name = first_name.into();
        let last_name = last_name.into();
        let email = format!(
            "{}.{}@campus.edu",
            first_name.to_lowercase(),
            last_name.to_lowercase()
        );
        let profile = StudentProfile {
            student_number: id.clone(),
            grade_level,
            gpa,
            completed_courses: BTreeSet::new(),
        };
        Self::new(id, first_name, last_name, email, PersonKind::Student(profile))
    }

    pub fn with_completed_courses<I, S>(mut self, courses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let PersonKind::Student(profile) = &mut self.kind {
            profile.completed_courses.extend(courses.into_iter().map(Into::into));
        }
        self
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn as_student(&self) -> Option<&StudentProfile> {
        match &self.kind {
            PersonKind::Student(profile) => Some(profile),
            _ => None,
        }
    }

    pub fn update_gpa(&mut self, gpa: f64) -> Result<()> {
        validate_gpa(Some(gpa))?;
        match &mut self.kind {
            PersonKind::Student(profile) => {
                profile.gpa = Some(gpa);
                Ok(())
            }
            other => Err(RegistrarError::Validation(format!(
                "person '{}' is a {}, not a student",
                self.id,
                other.key()
            ))),
        }
    }
}

fn validate_gpa(gpa: Option<f64>) -> Result<()> {
    match gpa {
        Some(g) if !(0.0..=4.0).contains(&g) => Err(RegistrarError::Validation(format!(
            "GPA {} is outside 0.0-4.0",
            g
        ))),
        _ => Ok(()),
    }
}

impl Entity for Person {
    const KIND: &'static str = "person";

    fn id(&self) -> &str {
        &self.id
    }
}
