//! Units of work applied by [`EnrollmentStore::commit`](super::EnrollmentStore::commit).
//!
//! A changeset carries its own preconditions: the expected version of every
//! class it writes and the expected active enrollment of every student whose
//! live state it changes. Backends validate them with [`check_changeset`]
//! inside the same critical section or transaction that applies the writes.

use crate::{
    ClassId, ClassRecord, EnrollmentId, EnrollmentRecord, ExitId, ExitRecord, RombelError,
    StudentId, TransferId, TransferRecord,
};
use std::collections::BTreeMap;

/// A class-table write with its compare-and-swap guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassWrite {
    /// Insert or replace a class. `expected_version: None` means the class
    /// must not exist yet.
    Put {
        record: ClassRecord,
        expected_version: Option<u64>,
    },
    /// Remove a class that must still be at `expected_version`.
    Remove { id: ClassId, expected_version: u64 },
}

/// The active enrollment a command observed for a student.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveExpectation {
    pub student_id: StudentId,
    pub active: Option<EnrollmentId>,
}

/// A batch of writes that lands all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeset {
    pub classes: Vec<ClassWrite>,
    pub expectations: Vec<ActiveExpectation>,
    /// Inserted or status-updated enrollment records.
    pub enrollments: Vec<EnrollmentRecord>,
    pub transfers: Vec<TransferRecord>,
    pub exits: Vec<ExitRecord>,
}

impl Changeset {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
            && self.enrollments.is_empty()
            && self.transfers.is_empty()
            && self.exits.is_empty()
    }

    /// Insert a class that must not exist yet.
    pub fn create_class(&mut self, record: ClassRecord) -> &mut Self {
        self.classes.push(ClassWrite::Put {
            record,
            expected_version: None,
        });
        self
    }

    /// Replace `before` with `after`, bumping the version.
    pub fn update_class(&mut self, before: &ClassRecord, mut after: ClassRecord) -> &mut Self {
        after.version = before.version.saturating_add(1);
        self.classes.push(ClassWrite::Put {
            record: after,
            expected_version: Some(before.version),
        });
        self
    }

    pub fn remove_class(&mut self, before: &ClassRecord) -> &mut Self {
        self.classes.push(ClassWrite::Remove {
            id: before.id,
            expected_version: before.version,
        });
        self
    }

    /// Require that `student` still has exactly `active` as live enrollment.
    pub fn expect_active(
        &mut self,
        student_id: StudentId,
        active: Option<EnrollmentId>,
    ) -> &mut Self {
        self.expectations
            .push(ActiveExpectation { student_id, active });
        self
    }

    pub fn put_enrollment(&mut self, record: EnrollmentRecord) -> &mut Self {
        self.enrollments.push(record);
        self
    }

    pub fn append_transfer(&mut self, record: TransferRecord) -> &mut Self {
        self.transfers.push(record);
        self
    }

    pub fn append_exit(&mut self, record: ExitRecord) -> &mut Self {
        self.exits.push(record);
        self
    }
}

// =============================================================================
// PRECONDITION CHECKS
// =============================================================================

/// Read access a backend offers while validating a changeset.
pub(crate) trait CommitView {
    fn class_version(&self, id: ClassId) -> Result<Option<u64>, RombelError>;
    fn enrollment_record(&self, id: EnrollmentId)
    -> Result<Option<EnrollmentRecord>, RombelError>;
    fn active_of(&self, student: StudentId) -> Result<Option<EnrollmentId>, RombelError>;
    fn has_transfer(&self, id: TransferId) -> Result<bool, RombelError>;
    fn has_exit(&self, id: ExitId) -> Result<bool, RombelError>;
}

/// Validate every precondition of `changeset` against `view`.
///
/// Checks, in order:
/// - class versions match the expected versions
/// - student expectations match the live active enrollment
/// - existing enrollment records are still active and only change status
/// - no student ends up with two active enrollments
/// - audit records are not overwritten
pub(crate) fn check_changeset(
    view: &impl CommitView,
    changeset: &Changeset,
) -> Result<(), RombelError> {
    for write in &changeset.classes {
        let (id, expected) = match write {
            ClassWrite::Put {
                record,
                expected_version,
            } => (record.id, *expected_version),
            ClassWrite::Remove {
                id,
                expected_version,
            } => (*id, Some(*expected_version)),
        };
        let current = view.class_version(id)?;
        if current != expected {
            return Err(RombelError::Conflict(format!(
                "class {} version changed (expected {:?}, found {:?})",
                id, expected, current
            )));
        }
    }

    let mut active_after: BTreeMap<StudentId, Option<EnrollmentId>> = BTreeMap::new();
    for expectation in &changeset.expectations {
        let current = view.active_of(expectation.student_id)?;
        if current != expectation.active {
            return Err(RombelError::Conflict(format!(
                "student {} active enrollment changed (expected {:?}, found {:?})",
                expectation.student_id,
                expectation.active.map(EnrollmentId::value),
                current.map(EnrollmentId::value)
            )));
        }
        active_after.insert(expectation.student_id, current);
    }

    for record in &changeset.enrollments {
        if let Some(existing) = view.enrollment_record(record.id)? {
            if !existing.is_active() {
                return Err(RombelError::Conflict(format!(
                    "enrollment {} is already {}",
                    record.id,
                    existing.status.as_str()
                )));
            }
            let mut status_only = existing;
            status_only.status = record.status;
            if status_only != *record {
                return Err(RombelError::InvalidRequest(format!(
                    "enrollment {} may only change status",
                    record.id
                )));
            }
        }

        let current = match active_after.get(&record.student_id) {
            Some(active) => *active,
            None => view.active_of(record.student_id)?,
        };
        let next = if record.is_active() {
            match current {
                Some(other) if other != record.id => {
                    return Err(RombelError::Conflict(format!(
                        "student {} already holds active enrollment {}",
                        record.student_id, other
                    )));
                }
                _ => Some(record.id),
            }
        } else if current == Some(record.id) {
            None
        } else {
            current
        };
        active_after.insert(record.student_id, next);
    }

    for transfer in &changeset.transfers {
        if view.has_transfer(transfer.id)? {
            return Err(RombelError::Conflict(format!(
                "transfer record {} already exists",
                transfer.id
            )));
        }
    }
    for exit in &changeset.exits {
        if view.has_exit(exit.id)? {
            return Err(RombelError::Conflict(format!(
                "exit record {} already exists",
                exit.id
            )));
        }
    }

    Ok(())
}
