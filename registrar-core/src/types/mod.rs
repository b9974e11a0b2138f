mod facilities;
mod lock;
mod people;
mod primitives;

pub use facilities::{Room, Section, TimeSlot};
pub use lock::LockInfo;
pub use people::{
    GradeLevel, GuestProfile, LecturerProfile, Person, PersonKind, StaffProfile, StudentProfile,
};
pub use primitives::{Entity, LockType};
