//! # Bulk Assignment
//!
//! Assigns many students to one class. Each student is an independent
//! `assign`; one failure never aborts the batch, and students already
//! processed stay committed.

use crate::ledger::{AssignRequest, EnrollmentLedger};
use crate::primitives::{MAX_BULK_ASSIGN, validate_text};
use crate::{AssignmentType, ClassId, EnrollmentRecord, RombelError, StudentId};
use serde::{Deserialize, Serialize};

/// A single failed item of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkAssignError {
    pub student_id: StudentId,
    /// Stable error code (see `RombelError::kind`).
    pub code: String,
    pub reason: String,
}

/// Per-item results of a batch, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkAssignOutcome {
    pub success_count: usize,
    pub failure_count: usize,
    pub assignments: Vec<EnrollmentRecord>,
    pub errors: Vec<BulkAssignError>,
}

impl BulkAssignOutcome {
    fn record(&mut self, student_id: StudentId, result: Result<EnrollmentRecord, RombelError>) {
        match result {
            Ok(record) => {
                self.success_count += 1;
                self.assignments.push(record);
            }
            Err(err) => {
                self.failure_count += 1;
                self.errors.push(BulkAssignError {
                    student_id,
                    code: err.kind().to_string(),
                    reason: err.to_string(),
                });
            }
        }
    }
}

/// Runs batches of `initial` assignments through the ledger.
#[derive(Debug, Clone)]
pub struct BulkAssigner {
    ledger: EnrollmentLedger,
}

impl BulkAssigner {
    #[must_use]
    pub fn new(ledger: EnrollmentLedger) -> Self {
        Self { ledger }
    }

    /// Assign every student in `students` to `class_id`.
    ///
    /// Only a malformed batch fails as a whole (`InvalidRequest` for more
    /// than `MAX_BULK_ASSIGN` ids or oversized notes). Per-student failures
    /// are collected in the outcome.
    pub fn bulk_assign(
        &self,
        students: &[StudentId],
        class_id: ClassId,
        notes: &str,
    ) -> Result<BulkAssignOutcome, RombelError> {
        self.bulk_assign_each(students, class_id, notes, |_, _| {})
    }

    /// Like [`bulk_assign`](Self::bulk_assign), calling `on_item` after each
    /// student is processed so callers can report progress.
    pub fn bulk_assign_each(
        &self,
        students: &[StudentId],
        class_id: ClassId,
        notes: &str,
        mut on_item: impl FnMut(StudentId, Result<&EnrollmentRecord, &RombelError>),
    ) -> Result<BulkAssignOutcome, RombelError> {
        if students.len() > MAX_BULK_ASSIGN {
            return Err(RombelError::InvalidRequest(format!(
                "Batch of {} students exceeds maximum {}",
                students.len(),
                MAX_BULK_ASSIGN
            )));
        }
        validate_text("notes", notes)?;

        let mut outcome = BulkAssignOutcome::default();
        for &student_id in students {
            let request = AssignRequest::new(student_id, class_id)
                .with_type(AssignmentType::Initial)
                .with_notes(notes);
            let result = self.ledger.assign(&request);
            on_item(student_id, result.as_ref());
            outcome.record(student_id, result);
        }

        tracing::info!(
            event = "bulk_assign",
            class = %class_id,
            succeeded = outcome.success_count,
            failed = outcome.failure_count,
            "bulk assignment finished"
        );
        Ok(outcome)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_directory::ClassDirectory;
    use crate::test_support::{new_class, registry};
    use std::sync::Arc;

    #[test]
    fn batch_continues_past_failures() {
        let registry = registry();
        let classes = ClassDirectory::new(Arc::clone(&registry));
        let bulk = BulkAssigner::new(EnrollmentLedger::new(registry));
        let class = classes.create(new_class("X-1", 2)).expect("create");

        let ids = [StudentId(1), StudentId(2), StudentId(3)];
        let outcome = bulk.bulk_assign(&ids, class.id, "PPDB 2024").expect("bulk");

        assert_eq!(outcome.success_count, 2);
        assert_eq!(outcome.failure_count, 1);
        assert_eq!(outcome.errors[0].student_id, StudentId(3));
        assert_eq!(outcome.errors[0].code, "class_full");
        assert_eq!(classes.get(class.id).expect("get").current_occupancy, 2);
    }

    #[test]
    fn duplicate_ids_in_one_batch_fail_individually() {
        let registry = registry();
        let classes = ClassDirectory::new(Arc::clone(&registry));
        let bulk = BulkAssigner::new(EnrollmentLedger::new(registry));
        let class = classes.create(new_class("X-1", 10)).expect("create");

        let ids = [StudentId(1), StudentId(1)];
        let outcome = bulk.bulk_assign(&ids, class.id, "").expect("bulk");
        assert_eq!(outcome.success_count, 1);
        assert_eq!(outcome.errors[0].code, "already_enrolled");
    }

    #[test]
    fn oversized_batch_rejected_up_front() {
        let registry = registry();
        let classes = ClassDirectory::new(Arc::clone(&registry));
        let bulk = BulkAssigner::new(EnrollmentLedger::new(registry));
        let class = classes.create(new_class("X-1", 10)).expect("create");

        let ids: Vec<StudentId> = (0..=MAX_BULK_ASSIGN as u64).map(StudentId).collect();
        assert!(matches!(
            bulk.bulk_assign(&ids, class.id, ""),
            Err(RombelError::InvalidRequest(_))
        ));
        assert_eq!(classes.get(class.id).expect("get").current_occupancy, 0);
    }

    #[test]
    fn progress_callback_sees_every_item_in_order() {
        let registry = registry();
        let classes = ClassDirectory::new(Arc::clone(&registry));
        let bulk = BulkAssigner::new(EnrollmentLedger::new(registry));
        let class = classes.create(new_class("X-1", 1)).expect("create");

        let mut seen = Vec::new();
        bulk.bulk_assign_each(
            &[StudentId(5), StudentId(6)],
            class.id,
            "",
            |student, result| seen.push((student, result.is_ok())),
        )
        .expect("bulk");
        assert_eq!(seen, vec![(StudentId(5), true), (StudentId(6), false)]);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let bulk = BulkAssigner::new(EnrollmentLedger::new(registry()));
        let outcome = bulk.bulk_assign(&[], ClassId(1), "").expect("bulk");
        assert_eq!(outcome, BulkAssignOutcome::default());
    }
}
