use crate::types::{LockInfo, LockType};

/// Represents the outcome of a compatibility check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictResult {
    /// No conflict found
    Ok,
    /// A conflicting lock is held by someone else
    Conflict { reason: String, held_by: String },
}

/// A pure engine for O(1) lock compatibility checks using a precomputed matrix.
pub struct CompatibilityMatrix;

impl CompatibilityMatrix {
    /// Rows: held lock type. Cols: requested lock type.
    /// True = compatible across different holders.
    ///
    /// Order: Read(0), Write(1), Exclusive(2)
    #[rustfmt::skip]
    const MATRIX: [[bool; 3]; 3] = [
        //          Read   Write  Excl
        /* Read  */ [true,  false, false],
        /* Write */ [false, false, false],
        /* Excl  */ [false, false, false],
    ];

    /// O(1) check whether two lock types held by different holders conflict
    pub fn check_pair(held: LockType, requesting: LockType) -> bool {
        !Self::MATRIX[held.to_index()][requesting.to_index()]
    }

    /// Checks a request against the locks currently held on one resource.
    ///
    /// A holder that already owns any lock on the resource is always granted.
    pub fn check_against_locks(
        requesting_holder: &str,
        requesting: LockType,
        held_locks: &[&LockInfo],
    ) -> ConflictResult {
        if held_locks.iter().any(|l| l.holder_id == requesting_holder) {
            return ConflictResult::Ok;
        }

        for lock in held_locks {
            if Self::check_pair(lock.lock_type, requesting) {
                return ConflictResult::Conflict {
                    reason: format!(
                        "Cannot acquire {} lock on {}: {} holds {}",
                        requesting, lock.resource_id, lock.holder_id, lock.lock_type
                    ),
                    held_by: lock.holder_id.clone(),
                };
            }
        }

        ConflictResult::Ok
    }
}
