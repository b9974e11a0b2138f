//! Enrollment policies.
//!
//! Each policy is a tagged variant with a real predicate and a priority
//! score. A chain permits enrollment only when every policy permits it.
//! The summed priority is reported to callers but never reorders a waitlist.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::types::{Person, Section, StudentProfile};

/// Everything a policy may look at when deciding.
#[derive(Debug, Clone, Copy)]
pub struct PolicyContext<'a> {
    pub person: &'a Person,
    pub student: &'a StudentProfile,
    pub section: &'a Section,
    /// Confirmed seats in the section before this request
    pub confirmed: usize,
}

pub type PolicyCheck = Arc<dyn Fn(&PolicyContext<'_>) -> bool + Send + Sync>;

#[derive(Clone)]
pub enum EnrollmentPolicy {
    /// Course id -> courses that must already be completed
    Prerequisites {
        by_course: HashMap<String, BTreeSet<String>>,
    },
    /// Hard ceiling on confirmed seats, independent of section capacity.
    /// Requests past the ceiling are rejected, not waitlisted.
    Quota { max_enrollments: usize },
    /// Scores by person kind, grade level and GPA; never denies
    Priority { rules: HashMap<String, i64> },
    Custom { name: String, check: PolicyCheck },
}

impl EnrollmentPolicy {
    pub fn custom(
        name: impl Into<String>,
        check: impl Fn(&PolicyContext<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        EnrollmentPolicy::Custom {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            EnrollmentPolicy::Prerequisites { .. } => "PrerequisiteCheckPolicy",
            EnrollmentPolicy::Quota { .. } => "QuotaPolicy",
            EnrollmentPolicy::Priority { .. } => "PriorityPolicy",
            EnrollmentPolicy::Custom { name, .. } => name,
        }
    }

    pub fn permits(&self, ctx: &PolicyContext<'_>) -> bool {
        match self {
            EnrollmentPolicy::Prerequisites { by_course } => match by_course.get(&ctx.section.course_id) {
                Some(required) => required.is_subset(&ctx.student.completed_courses),
                None => true,
            },
            EnrollmentPolicy::Quota { max_enrollments } => ctx.confirmed < *max_enrollments,
            EnrollmentPolicy::Priority { .. } => true,
            EnrollmentPolicy::Custom { check, .. } => check(ctx),
        }
    }

    pub fn priority(&self, ctx: &PolicyContext<'_>) -> i64 {
        match self {
            EnrollmentPolicy::Quota { .. } => ctx
                .student
                .gpa
                .map(|gpa| (gpa * 100.0) as i64)
                .unwrap_or(0),
            EnrollmentPolicy::Priority { rules } => {
                let mut score = rules.get(ctx.person.kind.key()).copied().unwrap_or(0);
                score += rules
                    .get(ctx.student.grade_level.key())
                    .copied()
                    .unwrap_or(0);
                score += match ctx.student.gpa {
                    Some(gpa) if gpa >= 3.5 => 10,
                    Some(gpa) if gpa >= 3.0 => 5,
                    _ => 0,
                };
                score
            }
            EnrollmentPolicy::Prerequisites { .. } | EnrollmentPolicy::Custom { .. } => 0,
        }
    }
}

impl std::fmt::Debug for EnrollmentPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnrollmentPolicy::Prerequisites { by_course } => f
                .debug_struct("Prerequisites")
                .field("by_course", by_course)
                .finish(),
            EnrollmentPolicy::Quota { max_enrollments } => f
                .debug_struct("Quota")
                .field("max_enrollments", max_enrollments)
                .finish(),
            EnrollmentPolicy::Priority { rules } => {
                f.debug_struct("Priority").field("rules", rules).finish()
            }
            EnrollmentPolicy::Custom { name, .. } => {
                f.debug_struct("Custom").field("name", name).finish_non_exhaustive()
            }
        }
    }
}

/// Outcome of running the whole chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyVerdict {
    pub permitted: bool,
    /// Name of the first policy that denied
    pub denied_by: Option<String>,
    pub priority: i64,
}

/// Ordered list of policies, combined with logical AND.
#[derive(Debug, Clone, Default)]
pub struct PolicyChain {
    policies: Vec<EnrollmentPolicy>,
}

impl PolicyChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default catalogue prerequisites plus the standard priority table.
    ///
    /// No quota: a full section always waitlists. Add
    /// [`EnrollmentPolicy::Quota`] explicitly to cap confirmations below
    /// capacity.
    pub fn standard() -> Self {
        let by_course = [
            ("CS301", &["CS201", "CS202"][..]),
            ("CS401", &["CS301"][..]),
            ("MATH301", &["MATH201", "MATH202"][..]),
        ]
        .into_iter()
        .map(|(course, required)| {
            (
                course.to_string(),
                required.iter().map(|c| c.to_string()).collect(),
            )
        })
        .collect();

        let rules = [
            ("graduate", 20),
            ("senior", 15),
            ("junior", 10),
            ("sophomore", 5),
            ("freshman", 0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self::new()
            .with(EnrollmentPolicy::Prerequisites { by_course })
            .with(EnrollmentPolicy::Priority { rules })
    }

    pub fn with(mut self, policy: EnrollmentPolicy) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn push(&mut self, policy: EnrollmentPolicy) {
        self.policies.push(policy);
    }

    /// Remove every policy with this name. Returns how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.policies.len();
        self.policies.retain(|p| p.name() != name);
        before - self.policies.len()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn evaluate(&self, ctx: &PolicyContext<'_>) -> PolicyVerdict {
        let denied_by = self
            .policies
            .iter()
            .find(|p| !p.permits(ctx))
            .map(|p| p.name().to_string());

        PolicyVerdict {
            permitted: denied_by.is_none(),
            denied_by,
            priority: self.policies.iter().map(|p| p.priority(ctx)).sum(),
        }
    }
}
