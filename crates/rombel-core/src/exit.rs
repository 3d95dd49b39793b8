//! # Exit Workflow
//!
//! Records a student leaving the school: graduation, moving away, dropping
//! out. Closes the active record, frees the seat and appends an exit record
//! in one commit.

use crate::class_directory::plan_occupancy;
use crate::concurrency::retry_on_conflict;
use crate::primitives::validate_text;
use crate::registry::Registry;
use crate::store::{Changeset, EnrollmentStore};
use crate::{EnrollmentRecord, EnrollmentStatus, ExitRecord, ExitType, RombelError, StudentId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Parameters of an exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitRequest {
    pub student_id: StudentId,
    pub exit_type: ExitType,
    #[serde(default)]
    pub destination: Option<String>,
    pub reason: String,
    pub approved_by: String,
    #[serde(default)]
    pub notes: String,
}

/// Everything a committed exit wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitOutcome {
    pub exit: ExitRecord,
    /// The student's former active record, now `Exited`.
    pub closed: EnrollmentRecord,
}

#[derive(Debug, Clone)]
pub struct ExitWorkflow {
    registry: Arc<Registry>,
}

impl ExitWorkflow {
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Record an exit for a student's active placement.
    ///
    /// Fails with `NoActiveEnrollment` if the student is not placed anywhere.
    pub fn exit(&self, request: &ExitRequest) -> Result<ExitOutcome, RombelError> {
        let result = self.exit_checked(request);
        match &result {
            Ok(outcome) => tracing::info!(
                event = "exit",
                student = %request.student_id,
                class = %outcome.exit.last_class_id,
                exit_type = %outcome.exit.exit_type,
                "student exited"
            ),
            Err(err) => tracing::warn!(
                event = "exit",
                student = %request.student_id,
                error = %err,
                "exit rejected"
            ),
        }
        result
    }

    fn exit_checked(&self, request: &ExitRequest) -> Result<ExitOutcome, RombelError> {
        validate_text("reason", &request.reason)?;
        validate_text("approved_by", &request.approved_by)?;
        validate_text("notes", &request.notes)?;
        if let Some(destination) = &request.destination {
            validate_text("destination", destination)?;
        }
        if let ExitType::Other(label) = &request.exit_type {
            if label.trim().is_empty() {
                return Err(RombelError::InvalidRequest(
                    "Exit type label must not be empty".to_string(),
                ));
            }
        }
        if !self.registry.students().contains(request.student_id) {
            return Err(RombelError::student_not_found(request.student_id));
        }

        // The class to lock is only known after reading the active record;
        // a placement that moves before the lock is taken fails the
        // expectation check and is retried.
        retry_on_conflict("exit", |_| {
            let active = self
                .registry
                .read(|store| store.active_enrollment(request.student_id))?
                .ok_or(RombelError::NoActiveEnrollment(request.student_id))?;

            self.registry
                .locks()
                .with_classes(&[active.class_id], || self.try_exit(request, active))
        })
    }

    fn try_exit(
        &self,
        request: &ExitRequest,
        active: EnrollmentRecord,
    ) -> Result<ExitOutcome, RombelError> {
        let class = self
            .registry
            .read(|store| store.class(active.class_id))?
            .ok_or(RombelError::class_not_found(active.class_id))?;
        let after = plan_occupancy(&class, -1)?;

        let today = self.registry.today();
        let mut closed = active;
        closed.status = EnrollmentStatus::Exited;
        let exit = ExitRecord {
            id: self.registry.next_exit_id(),
            student_id: request.student_id,
            closed_enrollment_id: closed.id,
            exit_date: today,
            exit_type: request.exit_type.clone(),
            destination: request.destination.clone(),
            reason: request.reason.clone(),
            approved_by: request.approved_by.clone(),
            approved_date: today,
            notes: request.notes.clone(),
            last_class_id: class.id,
        };

        let mut changeset = Changeset::new();
        changeset
            .update_class(&class, after)
            .expect_active(request.student_id, Some(closed.id))
            .put_enrollment(closed.clone())
            .append_exit(exit.clone());
        self.registry.commit(&changeset)?;

        Ok(ExitOutcome { exit, closed })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_directory::ClassDirectory;
    use crate::ledger::{AssignRequest, EnrollmentLedger};
    use crate::test_support::{date, new_class, registry};

    fn graduate(student: u64) -> ExitRequest {
        ExitRequest {
            student_id: StudentId(student),
            exit_type: ExitType::Graduated,
            destination: Some("Universitas Indonesia".to_string()),
            reason: "Lulus".to_string(),
            approved_by: "Kepala Sekolah".to_string(),
            notes: String::new(),
        }
    }

    #[test]
    fn exit_closes_record_and_frees_seat() {
        let registry = registry();
        let classes = ClassDirectory::new(Arc::clone(&registry));
        let ledger = EnrollmentLedger::new(Arc::clone(&registry));
        let workflow = ExitWorkflow::new(registry);
        let class = classes.create(new_class("XII-1", 30)).expect("create");
        let placed = ledger
            .assign(&AssignRequest::new(StudentId(3), class.id))
            .expect("assign");

        let outcome = workflow.exit(&graduate(3)).expect("exit");

        assert_eq!(outcome.closed.id, placed.id);
        assert_eq!(outcome.closed.status, EnrollmentStatus::Exited);
        assert_eq!(outcome.exit.last_class_id, class.id);
        assert_eq!(outcome.exit.exit_date, date(2024, 7, 15));
        assert_eq!(outcome.exit.exit_type, ExitType::Graduated);
        assert_eq!(classes.get(class.id).expect("get").current_occupancy, 0);
        assert!(ledger.active_enrollment(StudentId(3)).expect("get").is_none());
    }

    #[test]
    fn exit_without_placement_fails() {
        let workflow = ExitWorkflow::new(registry());
        assert_eq!(
            workflow.exit(&graduate(9)),
            Err(RombelError::NoActiveEnrollment(StudentId(9)))
        );
    }

    #[test]
    fn second_exit_fails_and_student_can_reenroll() {
        let registry = registry();
        let classes = ClassDirectory::new(Arc::clone(&registry));
        let ledger = EnrollmentLedger::new(Arc::clone(&registry));
        let workflow = ExitWorkflow::new(registry);
        let class = classes.create(new_class("X-1", 30)).expect("create");
        ledger
            .assign(&AssignRequest::new(StudentId(3), class.id))
            .expect("assign");

        let mut moved = graduate(3);
        moved.exit_type = ExitType::MovedOut;
        workflow.exit(&moved).expect("exit");
        assert!(matches!(
            workflow.exit(&moved),
            Err(RombelError::NoActiveEnrollment(_))
        ));

        ledger
            .assign(&AssignRequest::new(StudentId(3), class.id).with_notes("returning"))
            .expect("re-enroll");
        assert_eq!(ledger.history(StudentId(3)).expect("history").len(), 2);
    }

    #[test]
    fn blank_custom_exit_type_is_invalid() {
        let workflow = ExitWorkflow::new(registry());
        let mut request = graduate(1);
        request.exit_type = ExitType::Other(" ".to_string());
        assert!(matches!(
            workflow.exit(&request),
            Err(RombelError::InvalidRequest(_))
        ));
    }
}
