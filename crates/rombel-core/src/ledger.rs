//! # Enrollment Ledger
//!
//! Binds students to classes. Every successful assignment commits the new
//! `Active` record and the class occupancy increment as one changeset, so
//! the occupancy counter and the set of active records never diverge.

use crate::class_directory::plan_occupancy;
use crate::concurrency::retry_on_conflict;
use crate::primitives::validate_text;
use crate::registry::Registry;
use crate::store::{Changeset, EnrollmentStore};
use crate::{
    AcademicYear, AssignmentType, ClassId, EnrollmentRecord, EnrollmentStatus, RombelError,
    StudentId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Parameters of a single assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignRequest {
    pub student_id: StudentId,
    pub class_id: ClassId,
    #[serde(default)]
    pub assignment_type: AssignmentType,
    #[serde(default)]
    pub notes: String,
    /// Defaults to the academic year opened by today's date.
    #[serde(default)]
    pub academic_year: Option<AcademicYear>,
}

impl AssignRequest {
    /// An `initial` assignment with no notes.
    #[must_use]
    pub fn new(student_id: StudentId, class_id: ClassId) -> Self {
        Self {
            student_id,
            class_id,
            assignment_type: AssignmentType::Initial,
            notes: String::new(),
            academic_year: None,
        }
    }

    #[must_use]
    pub fn with_type(mut self, assignment_type: AssignmentType) -> Self {
        self.assignment_type = assignment_type;
        self
    }

    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    #[must_use]
    pub fn in_year(mut self, academic_year: AcademicYear) -> Self {
        self.academic_year = Some(academic_year);
        self
    }
}

/// Assignment and lookup of enrollment records.
#[derive(Debug, Clone)]
pub struct EnrollmentLedger {
    registry: Arc<Registry>,
}

impl EnrollmentLedger {
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Place a student into a class.
    ///
    /// Errors, in check order: `NotFound` (student, then class),
    /// `ClassInactive`, `AlreadyEnrolled`, `ClassFull`.
    pub fn assign(&self, request: &AssignRequest) -> Result<EnrollmentRecord, RombelError> {
        let result = self.assign_checked(request);
        match &result {
            Ok(record) => tracing::info!(
                event = "assign",
                student = %record.student_id,
                class = %record.class_id,
                enrollment = %record.id,
                "student assigned"
            ),
            Err(err) => tracing::warn!(
                event = "assign",
                student = %request.student_id,
                class = %request.class_id,
                error = %err,
                "assignment rejected"
            ),
        }
        result
    }

    fn assign_checked(&self, request: &AssignRequest) -> Result<EnrollmentRecord, RombelError> {
        validate_text("notes", &request.notes)?;
        if !self.registry.students().contains(request.student_id) {
            return Err(RombelError::student_not_found(request.student_id));
        }

        self.registry.locks().with_classes(&[request.class_id], || {
            retry_on_conflict("assign", |_| self.try_assign(request))
        })
    }

    fn try_assign(&self, request: &AssignRequest) -> Result<EnrollmentRecord, RombelError> {
        let (class, active) = self.registry.read(|store| {
            Ok((
                store.class(request.class_id)?,
                store.active_enrollment(request.student_id)?,
            ))
        })?;

        let class = class.ok_or(RombelError::class_not_found(request.class_id))?;
        if !class.is_active() {
            return Err(RombelError::ClassInactive(class.id));
        }
        if let Some(active) = active {
            return Err(RombelError::AlreadyEnrolled {
                student: request.student_id,
                class: active.class_id,
            });
        }
        let after = plan_occupancy(&class, 1)?;

        let academic_year = match request.academic_year {
            Some(year) => year,
            None => self.registry.current_academic_year()?,
        };
        let record = EnrollmentRecord {
            id: self.registry.next_enrollment_id(),
            student_id: request.student_id,
            class_id: class.id,
            academic_year,
            assignment_type: request.assignment_type,
            assigned_date: self.registry.today(),
            status: EnrollmentStatus::Active,
            notes: request.notes.clone(),
        };

        let mut changeset = Changeset::new();
        changeset
            .update_class(&class, after)
            .expect_active(request.student_id, None)
            .put_enrollment(record.clone());
        self.registry.commit(&changeset)?;
        Ok(record)
    }

    /// The student's current placement, if any.
    pub fn active_enrollment(
        &self,
        student: StudentId,
    ) -> Result<Option<EnrollmentRecord>, RombelError> {
        self.require_student(student)?;
        self.registry.read(|store| store.active_enrollment(student))
    }

    /// Every enrollment record of the student, in creation order.
    pub fn history(&self, student: StudentId) -> Result<Vec<EnrollmentRecord>, RombelError> {
        self.require_student(student)?;
        let mut records = self
            .registry
            .read(|store| store.enrollments_for_student(student))?;
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    fn require_student(&self, student: StudentId) -> Result<(), RombelError> {
        if self.registry.students().contains(student) {
            Ok(())
        } else {
            Err(RombelError::student_not_found(student))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_directory::{ClassDirectory, ClassPatch};
    use crate::registry::FixedClock;
    use crate::students::StudentRoster;
    use crate::test_support::{date, new_class, registry};
    use crate::ClassStatus;

    #[test]
    fn assign_creates_active_record_and_bumps_occupancy() {
        let registry = registry();
        let classes = ClassDirectory::new(Arc::clone(&registry));
        let ledger = EnrollmentLedger::new(registry);
        let class = classes.create(new_class("X-1", 30)).expect("create");

        let record = ledger
            .assign(&AssignRequest::new(StudentId(7), class.id).with_notes("PPDB jalur zonasi"))
            .expect("assign");

        assert_eq!(record.status, EnrollmentStatus::Active);
        assert_eq!(record.assignment_type, AssignmentType::Initial);
        assert_eq!(record.assigned_date, date(2024, 7, 15));
        assert_eq!(record.academic_year.to_string(), "2024/2025");
        assert_eq!(classes.get(class.id).expect("get").current_occupancy, 1);
        assert_eq!(
            ledger.active_enrollment(StudentId(7)).expect("active"),
            Some(record)
        );
    }

    #[test]
    fn explicit_academic_year_wins() {
        let registry = registry();
        let classes = ClassDirectory::new(Arc::clone(&registry));
        let ledger = EnrollmentLedger::new(registry);
        let class = classes.create(new_class("X-1", 30)).expect("create");

        let year = AcademicYear::new(2023).expect("year");
        let record = ledger
            .assign(&AssignRequest::new(StudentId(1), class.id).in_year(year))
            .expect("assign");
        assert_eq!(record.academic_year, year);
    }

    #[test]
    fn second_assignment_is_already_enrolled() {
        let registry = registry();
        let classes = ClassDirectory::new(Arc::clone(&registry));
        let ledger = EnrollmentLedger::new(registry);
        let a = classes.create(new_class("X-1", 30)).expect("create");
        let b = classes.create(new_class("X-2", 30)).expect("create");

        ledger
            .assign(&AssignRequest::new(StudentId(7), a.id))
            .expect("assign");
        let err = ledger
            .assign(&AssignRequest::new(StudentId(7), b.id))
            .expect_err("second");
        assert_eq!(
            err,
            RombelError::AlreadyEnrolled {
                student: StudentId(7),
                class: a.id
            }
        );
        assert_eq!(classes.get(b.id).expect("get").current_occupancy, 0);
    }

    #[test]
    fn full_class_rejects_without_side_effects() {
        let registry = registry();
        let classes = ClassDirectory::new(Arc::clone(&registry));
        let ledger = EnrollmentLedger::new(Arc::clone(&registry));
        let class = classes.create(new_class("X-1", 1)).expect("create");

        ledger
            .assign(&AssignRequest::new(StudentId(1), class.id))
            .expect("assign");
        assert!(matches!(
            ledger.assign(&AssignRequest::new(StudentId(2), class.id)),
            Err(RombelError::ClassFull { capacity: 1, .. })
        ));
        assert!(ledger.history(StudentId(2)).expect("history").is_empty());
        assert_eq!(classes.get(class.id).expect("get").current_occupancy, 1);
    }

    #[test]
    fn inactive_class_rejects_assignment() {
        let registry = registry();
        let classes = ClassDirectory::new(Arc::clone(&registry));
        let ledger = EnrollmentLedger::new(registry);
        let class = classes.create(new_class("X-1", 30)).expect("create");
        classes
            .update(
                class.id,
                ClassPatch {
                    status: Some(ClassStatus::Inactive),
                    ..ClassPatch::default()
                },
            )
            .expect("deactivate");

        assert_eq!(
            ledger.assign(&AssignRequest::new(StudentId(1), class.id)),
            Err(RombelError::ClassInactive(class.id))
        );
    }

    #[test]
    fn unknown_student_or_class_is_not_found() {
        let registry = Arc::new(
            Registry::in_memory()
                .with_clock(FixedClock::new(date(2024, 7, 15)))
                .with_students([StudentId(1)].into_iter().collect::<StudentRoster>()),
        );
        let classes = ClassDirectory::new(Arc::clone(&registry));
        let ledger = EnrollmentLedger::new(registry);
        let class = classes.create(new_class("X-1", 30)).expect("create");

        assert_eq!(
            ledger.assign(&AssignRequest::new(StudentId(2), class.id)),
            Err(RombelError::student_not_found(StudentId(2)))
        );
        assert_eq!(
            ledger.assign(&AssignRequest::new(StudentId(1), ClassId(99))),
            Err(RombelError::class_not_found(ClassId(99)))
        );
        assert!(ledger.history(StudentId(2)).is_err());
    }

    #[test]
    fn oversized_notes_are_invalid() {
        let registry = registry();
        let classes = ClassDirectory::new(Arc::clone(&registry));
        let ledger = EnrollmentLedger::new(registry);
        let class = classes.create(new_class("X-1", 30)).expect("create");

        let notes = "x".repeat(crate::primitives::MAX_TEXT_LENGTH + 1);
        assert!(matches!(
            ledger.assign(&AssignRequest::new(StudentId(1), class.id).with_notes(notes)),
            Err(RombelError::InvalidRequest(_))
        ));
    }
}
