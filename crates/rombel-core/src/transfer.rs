//! # Transfer Workflow
//!
//! Moves a student from one class to another.
//!
//! The seat in the destination is reserved before the source seat is
//! released, and every write of the transfer (both occupancy changes, the
//! closed source record, the new destination record and the audit record)
//! is staged into one changeset. A failure at any point before the commit
//! discards the staged changeset, which is the compensating action: the
//! source placement and both counters stay exactly as they were.

use crate::class_directory::plan_occupancy;
use crate::concurrency::retry_on_conflict;
use crate::primitives::validate_text;
use crate::registry::Registry;
use crate::store::{Changeset, EnrollmentStore};
use crate::{
    AssignmentType, ClassId, EnrollmentRecord, EnrollmentStatus, RombelError, StudentId,
    TransferRecord,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Parameters of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub student_id: StudentId,
    pub from_class_id: ClassId,
    pub to_class_id: ClassId,
    pub reason: String,
    pub approved_by: String,
    #[serde(default)]
    pub notes: String,
}

/// Everything a committed transfer wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub transfer: TransferRecord,
    /// The source record, now `Transferred`.
    pub closed: EnrollmentRecord,
    /// The new `Active` record in the destination.
    pub opened: EnrollmentRecord,
}

#[derive(Debug, Clone)]
pub struct TransferWorkflow {
    registry: Arc<Registry>,
}

impl TransferWorkflow {
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Transfer a student between classes.
    ///
    /// Errors: `InvalidRequest` (same class or oversized text), `NotFound`,
    /// `NotEnrolledInSourceClass`, `ClassInactive` (destination),
    /// `ClassFull` (destination).
    pub fn transfer(&self, request: &TransferRequest) -> Result<TransferOutcome, RombelError> {
        let result = self.transfer_checked(request);
        match &result {
            Ok(outcome) => tracing::info!(
                event = "transfer",
                student = %request.student_id,
                from = %request.from_class_id,
                to = %request.to_class_id,
                transfer = %outcome.transfer.id,
                "student transferred"
            ),
            Err(err) => tracing::warn!(
                event = "transfer",
                student = %request.student_id,
                from = %request.from_class_id,
                to = %request.to_class_id,
                error = %err,
                "transfer rejected"
            ),
        }
        result
    }

    fn transfer_checked(&self, request: &TransferRequest) -> Result<TransferOutcome, RombelError> {
        validate_text("reason", &request.reason)?;
        validate_text("approved_by", &request.approved_by)?;
        validate_text("notes", &request.notes)?;
        if request.from_class_id == request.to_class_id {
            return Err(RombelError::InvalidRequest(format!(
                "Transfer source and destination are both class {}",
                request.from_class_id
            )));
        }
        if !self.registry.students().contains(request.student_id) {
            return Err(RombelError::student_not_found(request.student_id));
        }

        let classes = [request.from_class_id, request.to_class_id];
        self.registry.locks().with_classes(&classes, || {
            retry_on_conflict("transfer", |_| self.try_transfer(request))
        })
    }

    fn try_transfer(&self, request: &TransferRequest) -> Result<TransferOutcome, RombelError> {
        let (active, from, to) = self.registry.read(|store| {
            Ok((
                store.active_enrollment(request.student_id)?,
                store.class(request.from_class_id)?,
                store.class(request.to_class_id)?,
            ))
        })?;

        let active = active
            .filter(|record| record.class_id == request.from_class_id)
            .ok_or(RombelError::NotEnrolledInSourceClass {
                student: request.student_id,
                class: request.from_class_id,
            })?;
        let from = from.ok_or(RombelError::class_not_found(request.from_class_id))?;
        let to = to.ok_or(RombelError::class_not_found(request.to_class_id))?;
        if !to.is_active() {
            return Err(RombelError::ClassInactive(to.id));
        }

        // Reserve first, then release.
        let to_after = plan_occupancy(&to, 1)?;
        let from_after = plan_occupancy(&from, -1)?;

        let today = self.registry.today();
        let mut closed = active.clone();
        closed.status = EnrollmentStatus::Transferred;
        let opened = EnrollmentRecord {
            id: self.registry.next_enrollment_id(),
            student_id: request.student_id,
            class_id: to.id,
            academic_year: active.academic_year,
            assignment_type: AssignmentType::TransferIn,
            assigned_date: today,
            status: EnrollmentStatus::Active,
            notes: request.notes.clone(),
        };
        let transfer = TransferRecord {
            id: self.registry.next_transfer_id(),
            student_id: request.student_id,
            from_class_id: from.id,
            to_class_id: to.id,
            opened_enrollment_id: opened.id,
            transfer_date: today,
            reason: request.reason.clone(),
            approved_by: request.approved_by.clone(),
            approved_date: today,
            notes: request.notes.clone(),
        };

        let mut changeset = Changeset::new();
        changeset
            .update_class(&to, to_after)
            .update_class(&from, from_after)
            .expect_active(request.student_id, Some(active.id))
            .put_enrollment(closed.clone())
            .put_enrollment(opened.clone())
            .append_transfer(transfer.clone());
        self.registry.commit(&changeset)?;

        Ok(TransferOutcome {
            transfer,
            closed,
            opened,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_directory::{ClassDirectory, ClassPatch};
    use crate::ledger::{AssignRequest, EnrollmentLedger};
    use crate::test_support::{new_class, registry};
    use crate::ClassStatus;

    struct Fixture {
        classes: ClassDirectory,
        ledger: EnrollmentLedger,
        workflow: TransferWorkflow,
    }

    fn fixture() -> Fixture {
        let registry = registry();
        Fixture {
            classes: ClassDirectory::new(Arc::clone(&registry)),
            ledger: EnrollmentLedger::new(Arc::clone(&registry)),
            workflow: TransferWorkflow::new(registry),
        }
    }

    fn request(student: u64, from: ClassId, to: ClassId) -> TransferRequest {
        TransferRequest {
            student_id: StudentId(student),
            from_class_id: from,
            to_class_id: to,
            reason: "Pindah peminatan".to_string(),
            approved_by: "Wakasek Kesiswaan".to_string(),
            notes: String::new(),
        }
    }

    #[test]
    fn transfer_moves_student_and_counters() {
        let f = fixture();
        let a = f.classes.create(new_class("X-1", 30)).expect("create");
        let b = f.classes.create(new_class("X-2", 30)).expect("create");
        let original = f
            .ledger
            .assign(&AssignRequest::new(StudentId(7), a.id))
            .expect("assign");

        let outcome = f.workflow.transfer(&request(7, a.id, b.id)).expect("transfer");

        assert_eq!(outcome.closed.id, original.id);
        assert_eq!(outcome.closed.status, EnrollmentStatus::Transferred);
        assert_eq!(outcome.opened.class_id, b.id);
        assert_eq!(outcome.opened.assignment_type, AssignmentType::TransferIn);
        assert_eq!(outcome.opened.academic_year, original.academic_year);
        assert_eq!(outcome.transfer.from_class_id, a.id);
        assert_eq!(outcome.transfer.to_class_id, b.id);

        assert_eq!(f.classes.get(a.id).expect("get").current_occupancy, 0);
        assert_eq!(f.classes.get(b.id).expect("get").current_occupancy, 1);
        let active = f.ledger.active_enrollment(StudentId(7)).expect("active");
        assert_eq!(active, Some(outcome.opened));
        assert_eq!(f.ledger.history(StudentId(7)).expect("history").len(), 2);
    }

    #[test]
    fn full_destination_leaves_source_untouched() {
        let f = fixture();
        let a = f.classes.create(new_class("X-1", 30)).expect("create");
        let b = f.classes.create(new_class("X-2", 1)).expect("create");
        let original = f
            .ledger
            .assign(&AssignRequest::new(StudentId(1), a.id))
            .expect("assign");
        f.ledger
            .assign(&AssignRequest::new(StudentId(2), b.id))
            .expect("assign");

        assert!(matches!(
            f.workflow.transfer(&request(1, a.id, b.id)),
            Err(RombelError::ClassFull { capacity: 1, .. })
        ));
        assert_eq!(
            f.ledger.active_enrollment(StudentId(1)).expect("active"),
            Some(original)
        );
        assert_eq!(f.classes.get(a.id).expect("get").current_occupancy, 1);
        assert_eq!(f.classes.get(b.id).expect("get").current_occupancy, 1);
    }

    #[test]
    fn wrong_source_class_is_rejected() {
        let f = fixture();
        let a = f.classes.create(new_class("X-1", 30)).expect("create");
        let b = f.classes.create(new_class("X-2", 30)).expect("create");
        let c = f.classes.create(new_class("X-3", 30)).expect("create");
        f.ledger
            .assign(&AssignRequest::new(StudentId(1), a.id))
            .expect("assign");

        assert_eq!(
            f.workflow.transfer(&request(1, b.id, c.id)),
            Err(RombelError::NotEnrolledInSourceClass {
                student: StudentId(1),
                class: b.id
            })
        );
        // A student with no placement at all gets the same answer.
        assert!(matches!(
            f.workflow.transfer(&request(2, a.id, c.id)),
            Err(RombelError::NotEnrolledInSourceClass { .. })
        ));
    }

    #[test]
    fn same_class_transfer_is_invalid() {
        let f = fixture();
        let a = f.classes.create(new_class("X-1", 30)).expect("create");
        assert!(matches!(
            f.workflow.transfer(&request(1, a.id, a.id)),
            Err(RombelError::InvalidRequest(_))
        ));
    }

    #[test]
    fn inactive_destination_is_rejected() {
        let f = fixture();
        let a = f.classes.create(new_class("X-1", 30)).expect("create");
        let b = f.classes.create(new_class("X-2", 30)).expect("create");
        f.ledger
            .assign(&AssignRequest::new(StudentId(1), a.id))
            .expect("assign");
        f.classes
            .update(
                b.id,
                ClassPatch {
                    status: Some(ClassStatus::Inactive),
                    ..ClassPatch::default()
                },
            )
            .expect("deactivate");

        assert_eq!(
            f.workflow.transfer(&request(1, a.id, b.id)),
            Err(RombelError::ClassInactive(b.id))
        );
    }

    #[test]
    fn transfer_out_of_inactive_class_is_allowed() {
        let f = fixture();
        let a = f.classes.create(new_class("X-1", 30)).expect("create");
        let b = f.classes.create(new_class("X-2", 30)).expect("create");
        f.ledger
            .assign(&AssignRequest::new(StudentId(1), a.id))
            .expect("assign");
        f.classes
            .update(
                a.id,
                ClassPatch {
                    status: Some(ClassStatus::Inactive),
                    ..ClassPatch::default()
                },
            )
            .expect("deactivate");

        f.workflow.transfer(&request(1, a.id, b.id)).expect("transfer");
        assert_eq!(f.classes.get(a.id).expect("get").current_occupancy, 0);
    }
}
