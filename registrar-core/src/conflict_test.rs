#[cfg(test)]
mod tests {
    use crate::conflict::{CompatibilityMatrix, ConflictResult};
    use crate::types::{LockInfo, LockType};
    use std::time::Instant;

    // =========================================================================
    // Helper
    // =========================================================================
    fn make_lock(holder: &str, lock_type: LockType) -> LockInfo {
        LockInfo::new(
            format!("l_{}", holder),
            "section:CS101-A".to_string(),
            lock_type,
            holder.to_string(),
            None,
            Instant::now(),
        )
    }

    // =========================================================================
    // O(1) Matrix — Pair-level tests
    // =========================================================================

    #[test]
    fn read_read_compatible() {
        assert!(!CompatibilityMatrix::check_pair(LockType::Read, LockType::Read));
    }

    #[test]
    fn read_write_conflicts_both_ways() {
        assert!(CompatibilityMatrix::check_pair(LockType::Read, LockType::Write));
        assert!(CompatibilityMatrix::check_pair(LockType::Write, LockType::Read));
    }

    #[test]
    fn exclusive_conflicts_with_everything() {
        for lt in [LockType::Read, LockType::Write, LockType::Exclusive] {
            assert!(
                CompatibilityMatrix::check_pair(LockType::Exclusive, lt),
                "Exclusive should conflict with {:?}",
                lt
            );
            assert!(
                CompatibilityMatrix::check_pair(lt, LockType::Exclusive),
                "{:?} should conflict with Exclusive",
                lt
            );
        }
    }

    #[test]
    fn write_write_conflicts() {
        assert!(CompatibilityMatrix::check_pair(LockType::Write, LockType::Write));
    }

    // =========================================================================
    // Held-lock checks
    // =========================================================================

    #[test]
    fn no_held_locks_is_ok() {
        assert_eq!(
            CompatibilityMatrix::check_against_locks("x", LockType::Exclusive, &[]),
            ConflictResult::Ok
        );
    }

    #[test]
    fn same_holder_is_reentrant_for_any_type() {
        let held = make_lock("x", LockType::Exclusive);
        assert_eq!(
            CompatibilityMatrix::check_against_locks("x", LockType::Write, &[&held]),
            ConflictResult::Ok
        );
    }

    #[test]
    fn shared_readers_admit_another_reader() {
        let a = make_lock("a", LockType::Read);
        let b = make_lock("b", LockType::Read);
        assert_eq!(
            CompatibilityMatrix::check_against_locks("c", LockType::Read, &[&a, &b]),
            ConflictResult::Ok
        );
    }

    #[test]
    fn writer_blocked_by_foreign_reader_names_holder() {
        let a = make_lock("a", LockType::Read);
        match CompatibilityMatrix::check_against_locks("b", LockType::Write, &[&a]) {
            ConflictResult::Conflict { held_by, reason } => {
                assert_eq!(held_by, "a");
                assert!(reason.contains("WRITE"));
            }
            ConflictResult::Ok => panic!("expected conflict"),
        }
    }
}
